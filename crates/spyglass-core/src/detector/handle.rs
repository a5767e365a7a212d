// ── Server handle ──

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tracing::error;
use url::Url;

use spyglass_bus::BeanRegistry;

use crate::config::BridgeConfig;
use crate::error::ProtocolError;
use crate::request::Request;

/// Middleware run before every dispatch; may touch registry state to
/// work around product quirks.
pub type PreDispatchHook =
    Arc<dyn Fn(&[Arc<BeanRegistry>], &Request) -> Result<(), ProtocolError> + Send + Sync>;

/// Hook run once after detection, with the runtime configuration;
/// products boot side registries here.
pub type PostDetectHook =
    Arc<dyn Fn(&[Arc<BeanRegistry>], &BridgeConfig) -> Result<(), ProtocolError> + Send + Sync>;

/// Describes the product hosting the bridge: vendor, product, version,
/// optional agent URL and extra info, plus the hooks the detector
/// composed at build time.
///
/// Created once per process by the detector chain; immutable afterward.
#[derive(Clone)]
pub struct ServerHandle {
    pub vendor: String,
    pub product: String,
    pub version: String,
    pub agent_url: Option<Url>,
    pub extra_info: HashMap<String, String>,
    pre_dispatch: Vec<PreDispatchHook>,
    post_detect: Vec<PostDetectHook>,
}

impl ServerHandle {
    pub fn new(
        vendor: impl Into<String>,
        product: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            product: product.into(),
            version: version.into(),
            agent_url: None,
            extra_info: HashMap::new(),
            pre_dispatch: Vec::new(),
            post_detect: Vec::new(),
        }
    }

    /// The handle used when no detector recognizes the host.
    pub fn generic() -> Self {
        Self::new("", "", "")
    }

    pub fn with_agent_url(mut self, url: Url) -> Self {
        self.agent_url = Some(url);
        self
    }

    pub fn with_extra_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_info.insert(key.into(), value.into());
        self
    }

    pub fn with_pre_dispatch(mut self, hook: PreDispatchHook) -> Self {
        self.pre_dispatch.push(hook);
        self
    }

    pub fn with_post_detect(mut self, hook: PostDetectHook) -> Self {
        self.post_detect.push(hook);
        self
    }

    /// Run the composed pre-dispatch middleware. A failing hook fails
    /// the request (internal error) since the workaround it implements
    /// was deemed load-bearing by its detector.
    pub fn run_pre_dispatch(
        &self,
        registries: &[Arc<BeanRegistry>],
        request: &Request,
    ) -> Result<(), ProtocolError> {
        for hook in &self.pre_dispatch {
            hook(registries, request)?;
        }
        Ok(())
    }

    /// Run the post-detect hooks. Errors are logged at error level and
    /// swallowed: startup never aborts on a detector.
    pub fn run_post_detect(&self, registries: &[Arc<BeanRegistry>], config: &BridgeConfig) {
        for hook in &self.post_detect {
            if let Err(e) = hook(registries, config) {
                error!(error = %e, product = %self.product, "post-detect hook failed");
            }
        }
    }

    /// The `info` block of the version response.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        obj.insert("vendor".to_owned(), json!(self.vendor));
        obj.insert("product".to_owned(), json!(self.product));
        obj.insert("version".to_owned(), json!(self.version));
        if let Some(url) = &self.agent_url {
            obj.insert("agent-url".to_owned(), json!(url.as_str()));
        }
        if !self.extra_info.is_empty() {
            obj.insert("extraInfo".to_owned(), json!(self.extra_info));
        }
        JsonValue::Object(obj)
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("vendor", &self.vendor)
            .field("product", &self.product)
            .field("version", &self.version)
            .field("pre_dispatch", &self.pre_dispatch.len())
            .finish()
    }
}
