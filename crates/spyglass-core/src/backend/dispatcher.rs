// ── Request dispatchers ──
//
// The backend manager consults an ordered dispatcher list: configured
// extras first (registered by name, the redesigned form of the
// original load-by-class-name), then the local dispatcher, which
// resolves the verb handler and routes single-registry requests
// through the merged-set iteration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::detector::ServerHandle;
use crate::error::ProtocolError;
use crate::handler::{HandlerOutcome, VerbHandler};
use crate::request::{Request, Verb};
use crate::backend::registries::RegistrySetHandler;

pub trait RequestDispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this dispatcher claims the request. The first claimant
    /// in the list wins.
    fn can_handle(&self, request: &Request) -> bool;

    /// Run the request. A `Value` outcome gets the request path and
    /// serialization limits applied by the backend; `Ready` JSON is
    /// passed through untouched.
    fn dispatch(&self, request: &Request) -> Result<HandlerOutcome, ProtocolError>;
}

/// Dispatches against the local merged registry set.
pub struct LocalDispatcher {
    handlers: HashMap<Verb, Arc<dyn VerbHandler>>,
    registry_set: Arc<RegistrySetHandler>,
    server_handle: Arc<ServerHandle>,
}

impl LocalDispatcher {
    pub fn new(
        handlers: HashMap<Verb, Arc<dyn VerbHandler>>,
        registry_set: Arc<RegistrySetHandler>,
        server_handle: Arc<ServerHandle>,
    ) -> Self {
        Self {
            handlers,
            registry_set,
            server_handle,
        }
    }
}

impl RequestDispatcher for LocalDispatcher {
    fn name(&self) -> &'static str {
        "local"
    }

    /// The local dispatcher takes everything without a proxy target.
    fn can_handle(&self, request: &Request) -> bool {
        request.target.is_none()
    }

    fn dispatch(&self, request: &Request) -> Result<HandlerOutcome, ProtocolError> {
        let handler = self.handlers.get(&request.verb()).ok_or_else(|| {
            ProtocolError::Internal(format!("no handler for verb {}", request.verb()))
        })?;

        let snapshot = self.registry_set.snapshot();
        self.server_handle.run_pre_dispatch(&snapshot, request)?;

        if handler.handle_all_at_once(request) {
            handler.handle_merged(&snapshot, request)
        } else {
            let describe = request
                .object_name()
                .map(|n| n.to_string())
                .unwrap_or_else(|| request.verb().to_string());
            self.registry_set
                .dispatch(&describe, |registry| handler.handle_single(registry, request))
        }
    }
}

// ── Registration table ──────────────────────────────────────────────

/// Context handed to dispatcher constructors.
pub struct DispatcherContext {
    pub registry_set: Arc<RegistrySetHandler>,
    pub server_handle: Arc<ServerHandle>,
}

type DispatcherCtor = fn(&DispatcherContext) -> Result<Arc<dyn RequestDispatcher>, ProtocolError>;

static REGISTRY: OnceLock<Mutex<HashMap<&'static str, DispatcherCtor>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<&'static str, DispatcherCtor>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a dispatcher constructor under a name usable from the
/// `dispatcherClasses` config key.
pub fn register_dispatcher(name: &'static str, ctor: DispatcherCtor) {
    registry()
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .insert(name, ctor);
}

/// Build the configured extra dispatchers, in the configured order.
/// An unknown name is a startup error, not a silent skip.
pub fn build_dispatchers(
    names: &[String],
    context: &DispatcherContext,
) -> Result<Vec<Arc<dyn RequestDispatcher>>, ProtocolError> {
    names
        .iter()
        .map(|name| {
            let ctor = registry()
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(name.as_str())
                .copied()
                .ok_or_else(|| {
                    ProtocolError::Internal(format!("no dispatcher registered as '{name}'"))
                })?;
            ctor(context)
        })
        .collect()
}
