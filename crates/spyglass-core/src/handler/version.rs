// ── Version handler ──

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use spyglass_bus::BeanRegistry;

use crate::config::BridgeConfig;
use crate::detector::ServerHandle;
use crate::error::ProtocolError;
use crate::handler::{HandlerOutcome, VerbHandler};
use crate::request::{Request, Verb};

/// Wire protocol version. A compatibility contract with clients:
/// bumped only when the envelope or the request grammar changes.
pub const PROTOCOL_VERSION: &str = "7.2";

pub struct VersionHandler {
    server_handle: Arc<ServerHandle>,
    config: Arc<BridgeConfig>,
}

impl VersionHandler {
    pub fn new(server_handle: Arc<ServerHandle>, config: Arc<BridgeConfig>) -> Self {
        Self {
            server_handle,
            config,
        }
    }
}

impl VerbHandler for VersionHandler {
    fn verb(&self) -> Verb {
        Verb::Version
    }

    fn handle_all_at_once(&self, _request: &Request) -> bool {
        true
    }

    fn handle_merged(
        &self,
        _registries: &[Arc<BeanRegistry>],
        _request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let mut value = serde_json::Map::new();
        value.insert("protocol".to_owned(), json!(PROTOCOL_VERSION));
        value.insert("agent".to_owned(), json!(env!("CARGO_PKG_VERSION")));
        if let Some(id) = &self.config.agent_id {
            value.insert("id".to_owned(), json!(id));
        }
        if let Some(description) = &self.config.agent_description {
            value.insert("description".to_owned(), json!(description));
        }
        value.insert("info".to_owned(), self.server_handle.to_json());
        Ok(HandlerOutcome::Ready(JsonValue::Object(value)))
    }
}
