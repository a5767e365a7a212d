// ── Verb handlers ──
//
// One handler per protocol verb, resolved from a static table by the
// local dispatcher. A handler either works against a single registry
// (the dispatcher iterates the merged set for it, skipping "instance
// not found") or asks for the whole set at once: pattern reads,
// multi-attribute fan-out, list and search need the union view.

pub mod exec;
pub mod list;
pub mod notification;
pub mod read;
pub mod search;
pub mod version;
pub mod write;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use spyglass_bus::{BeanRegistry, BusValue};

use crate::error::ProtocolError;
use crate::request::{Request, Verb};

/// What a handler returns to the dispatcher.
pub enum HandlerOutcome {
    /// A dynamic value: the backend applies the request path and the
    /// serialization limits.
    Value(BusValue),
    /// Wire-ready JSON: the handler already consumed the path (list)
    /// or the result has no dynamic form (search, version,
    /// notification).
    Ready(JsonValue),
}

pub trait VerbHandler: Send + Sync {
    fn verb(&self) -> Verb;

    /// Whether this request needs the merged registry set at once.
    fn handle_all_at_once(&self, request: &Request) -> bool {
        let _ = request;
        false
    }

    /// Handle against one registry. The dispatcher iterates registries
    /// and treats "instance not found" as "try the next one".
    fn handle_single(
        &self,
        registry: &BeanRegistry,
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let _ = (registry, request);
        Err(ProtocolError::Internal(format!(
            "{} handler cannot run in single-registry mode",
            self.verb()
        )))
    }

    /// Handle with the full merged set.
    fn handle_merged(
        &self,
        registries: &[Arc<BeanRegistry>],
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let _ = (registries, request);
        Err(ProtocolError::Internal(format!(
            "{} handler cannot run in merged mode",
            self.verb()
        )))
    }
}

/// The static verb table the local dispatcher resolves handlers from.
pub fn handler_table(
    restrictor: Arc<dyn crate::restrictor::Restrictor>,
    server_handle: Arc<crate::detector::ServerHandle>,
    config: Arc<crate::config::BridgeConfig>,
) -> HashMap<Verb, Arc<dyn VerbHandler>> {
    let mut table: HashMap<Verb, Arc<dyn VerbHandler>> = HashMap::new();
    table.insert(
        Verb::Read,
        Arc::new(read::ReadHandler::new(Arc::clone(&restrictor))),
    );
    table.insert(
        Verb::Write,
        Arc::new(write::WriteHandler::new(Arc::clone(&restrictor))),
    );
    table.insert(
        Verb::Exec,
        Arc::new(exec::ExecHandler::new(Arc::clone(&restrictor))),
    );
    table.insert(Verb::List, Arc::new(list::ListHandler));
    table.insert(Verb::Search, Arc::new(search::SearchHandler));
    table.insert(
        Verb::Version,
        Arc::new(version::VersionHandler::new(server_handle, config)),
    );
    table.insert(
        Verb::Notification,
        Arc::new(notification::NotificationHandler::new()),
    );
    table
}

/// Resolve bean metadata from the merged set, skipping registries that
/// do not know the name.
pub(crate) fn bean_info_from(
    registries: &[Arc<BeanRegistry>],
    name: &spyglass_bus::ObjectName,
) -> Result<spyglass_bus::BeanInfo, ProtocolError> {
    for registry in registries {
        match registry.bean_info(name) {
            Ok(info) => return Ok(info),
            Err(e) if e.is_instance_not_found() => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ProtocolError::instance_not_found(format!(
        "no bean {name} in any registry"
    )))
}
