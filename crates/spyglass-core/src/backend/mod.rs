// ── Backend manager ──
//
// The single entry point of the core: a typed request goes in, a
// complete JSON envelope (or a typed error for the facade to render)
// comes out. Construction wires the whole pipeline: restrictor,
// detector chain, merged registry set, dispatcher list, verb handlers,
// history and debug stores, and the bridge's own beans.

pub mod dispatcher;
pub mod registries;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error};

use crate::beans;
use crate::config::BridgeConfig;
use crate::converter::{serialize_value, SerializeLimits};
use crate::detector::{all_detectors, run_detectors, ServerHandle};
use crate::debug::DebugStore;
use crate::error::ProtocolError;
use crate::handler::{handler_table, HandlerOutcome};
use crate::history::HistoryStore;
use crate::request::{Request, Verb};
use crate::restrictor::{restrictor_for, Restrictor};
use self::dispatcher::{build_dispatchers, DispatcherContext, LocalDispatcher, RequestDispatcher};
use self::registries::RegistrySetHandler;

pub struct BackendManager {
    config: Arc<BridgeConfig>,
    restrictor: Arc<dyn Restrictor>,
    dispatchers: Vec<Arc<dyn RequestDispatcher>>,
    history: Arc<HistoryStore>,
    debug_store: Arc<DebugStore>,
    server_handle: Arc<ServerHandle>,
    registry_set: Arc<RegistrySetHandler>,
}

impl BackendManager {
    /// Build against the process-wide registry discovery.
    pub fn new(config: BridgeConfig) -> Result<Self, ProtocolError> {
        Self::with_parts(config, None, Arc::new(RegistrySetHandler::new()))
    }

    /// Build with an explicit restrictor and registry set (embeddings,
    /// tests).
    pub fn with_parts(
        config: BridgeConfig,
        restrictor: Option<Arc<dyn Restrictor>>,
        registry_set: Arc<RegistrySetHandler>,
    ) -> Result<Self, ProtocolError> {
        let config = Arc::new(config);
        let restrictor = match restrictor {
            Some(r) => r,
            None => restrictor_for(&config)?,
        };

        // Detector chain: contribution, detection, post-detect. The
        // chain may grow the registry list; anything new joins the
        // merged set.
        let snapshot = registry_set.snapshot();
        let mut registries: Vec<_> = snapshot.iter().cloned().collect();
        let known = registries.len();
        let handle = run_detectors(&all_detectors(), &mut registries, &config);
        if registries.len() > known {
            registry_set.add_contributed(registries.split_off(known));
        }
        let server_handle = Arc::new(handle);

        let history = Arc::new(HistoryStore::new(config.history_max_entries));
        let debug_store = Arc::new(DebugStore::new(config.debug_max_entries, config.debug));

        let handlers = handler_table(
            Arc::clone(&restrictor),
            Arc::clone(&server_handle),
            Arc::clone(&config),
        );
        let local = Arc::new(LocalDispatcher::new(
            handlers,
            Arc::clone(&registry_set),
            Arc::clone(&server_handle),
        ));

        // Configured extras are consulted before the local dispatcher.
        let context = DispatcherContext {
            registry_set: Arc::clone(&registry_set),
            server_handle: Arc::clone(&server_handle),
        };
        let mut dispatchers = build_dispatchers(&config.dispatcher_classes, &context)?;
        dispatchers.push(local as Arc<dyn RequestDispatcher>);

        let manager = Self {
            config,
            restrictor,
            dispatchers,
            history,
            debug_store,
            server_handle,
            registry_set,
        };
        manager.register_own_beans()?;
        Ok(manager)
    }

    fn register_own_beans(&self) -> Result<(), ProtocolError> {
        beans::register_bridge_beans(
            &self.registry_set,
            &self.config,
            &self.history,
            &self.debug_store,
            &self.server_handle,
        )
    }

    /// Handle one request to a success envelope; failures surface as
    /// typed errors for the facade's error envelope.
    pub fn handle(&self, request: &Request) -> Result<JsonValue, ProtocolError> {
        if !self.restrictor.is_verb_allowed(request.verb()) {
            return Err(ProtocolError::Forbidden(format!(
                "{} requests are not allowed",
                request.verb()
            )));
        }

        let dispatcher = self
            .dispatchers
            .iter()
            .find(|d| d.can_handle(request))
            .ok_or_else(|| {
                ProtocolError::Internal(format!(
                    "no dispatcher claims the request {}",
                    request.to_json()
                ))
            })?;

        let started = std::time::Instant::now();
        let outcome = dispatcher.dispatch(request)?;

        let value = match outcome {
            HandlerOutcome::Value(value) => serialize_value(
                &value,
                request.path_segments(),
                &SerializeLimits::effective(&request.options, &self.config),
                &request.options.fault,
            )?,
            HandlerOutcome::Ready(json) => json,
        };

        let mut envelope = serde_json::Map::new();
        envelope.insert("request".to_owned(), request.to_json());
        envelope.insert("value".to_owned(), value);

        if matches!(request.verb(), Verb::Read | Verb::Write | Verb::Exec) {
            self.history.update_and_add(request, &mut envelope);
        }

        envelope.insert("status".to_owned(), json!(200));
        envelope.insert("timestamp".to_owned(), json!(Utc::now().timestamp()));

        if self.is_debug() {
            self.debug_log(format!(
                "{} handled in {:?}",
                request.verb(),
                started.elapsed()
            ));
        }
        Ok(JsonValue::Object(envelope))
    }

    /// Shut down: unregister the bridge's own beans, best effort with
    /// aggregated failure reporting.
    pub fn destroy(&self) -> Result<(), ProtocolError> {
        self.registry_set.unregister_own_beans()
    }

    pub fn is_debug(&self) -> bool {
        self.debug_store.is_debug()
    }

    /// Debug-level log line, mirrored into the debug store.
    pub fn debug_log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{message}");
        self.debug_store.log("debug", message, None);
    }

    /// Error-level log line, mirrored into the debug store.
    pub fn error_log(&self, message: impl Into<String>, detail: Option<String>) {
        let message = message.into();
        error!("{message}");
        self.debug_store.log("error", message, detail);
    }

    /// Remote-origin gate for the transport.
    pub fn is_remote_access_allowed(&self, host: Option<&str>, addr: Option<&str>) -> bool {
        self.restrictor.is_remote_access_allowed(host, addr)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn debug_store(&self) -> &Arc<DebugStore> {
        &self.debug_store
    }

    pub fn server_handle(&self) -> &Arc<ServerHandle> {
        &self.server_handle
    }

    pub fn registry_set(&self) -> &Arc<RegistrySetHandler> {
        &self.registry_set
    }
}
