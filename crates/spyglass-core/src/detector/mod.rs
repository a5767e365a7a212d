// ── Detector chain ──
//
// At startup an ordered chain of detectors inspects the live registry
// set to work out which product is hosting the bridge. Each detector
// may also contribute registries the generic scan cannot see. The
// first detector returning a handle wins; none matching yields the
// generic handle. A detector is never allowed to break startup:
// contribution failures are logged and swallowed.

pub mod handle;

pub use handle::{PostDetectHook, PreDispatchHook, ServerHandle};

use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, error};

use spyglass_bus::{BeanRegistry, BusValue, Notification, ObjectName};

use crate::config::BridgeConfig;
use crate::error::ProtocolError;

pub trait ServerDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect the registries and return a handle when the hosting
    /// product is recognized.
    fn detect(&self, registries: &[Arc<BeanRegistry>]) -> Option<ServerHandle>;

    /// Contribute additional registries to the merged set.
    fn contribute_registries(
        &self,
        registries: &mut Vec<Arc<BeanRegistry>>,
    ) -> Result<(), ProtocolError> {
        let _ = registries;
        Ok(())
    }
}

/// Run the chain: contribution, detection, post-detect.
pub fn run_detectors(
    detectors: &[Box<dyn ServerDetector>],
    registries: &mut Vec<Arc<BeanRegistry>>,
    config: &BridgeConfig,
) -> ServerHandle {
    for detector in detectors {
        if let Err(e) = detector.contribute_registries(registries) {
            error!(detector = detector.name(), error = %e, "registry contribution failed");
        }
    }

    let handle = detectors
        .iter()
        .find_map(|d| {
            let found = d.detect(registries);
            if found.is_some() {
                debug!(detector = d.name(), "detector matched");
            }
            found
        })
        .unwrap_or_else(ServerHandle::generic);

    handle.run_post_detect(registries, config);
    handle
}

/// Bundled detectors plus any registered extras, in order.
pub fn all_detectors() -> Vec<Box<dyn ServerDetector>> {
    let mut detectors: Vec<Box<dyn ServerDetector>> = vec![Box::new(PlatformMarkerDetector)];
    for ctor in extra_registry().lock().unwrap_or_else(|p| p.into_inner()).iter() {
        detectors.push(ctor());
    }
    detectors
}

type DetectorCtor = fn() -> Box<dyn ServerDetector>;

static EXTRA_DETECTORS: OnceLock<Mutex<Vec<DetectorCtor>>> = OnceLock::new();

fn extra_registry() -> &'static Mutex<Vec<DetectorCtor>> {
    EXTRA_DETECTORS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a product-specific detector; it runs after the bundled
/// ones in registration order.
pub fn register_detector(ctor: DetectorCtor) {
    extra_registry()
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .push(ctor);
}

// ── Bundled: platform marker detector ───────────────────────────────

/// Recognizes hosts that register a `platform:type=Server` marker bean
/// carrying `Vendor`/`Product`/`Version` attributes.
///
/// Two optional marker attributes tune the handle:
/// - `RefreshDomains` (sequence of domain strings): registries of this
///   product serve stale metadata for those domains until `bean_info`
///   is touched, so a pre-dispatch workaround touches it before every
///   matching request.
/// - the `detectorOptions` config `{"platform": {"boot": true}}` makes
///   post-detect invoke the marker's `boot` operation, which products
///   use to bring side registries online.
pub struct PlatformMarkerDetector;

impl PlatformMarkerDetector {
    fn marker_name() -> ObjectName {
        ObjectName::parse("platform:type=Server").expect("static marker name")
    }
}

impl ServerDetector for PlatformMarkerDetector {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn detect(&self, registries: &[Arc<BeanRegistry>]) -> Option<ServerHandle> {
        let marker = Self::marker_name();
        let registry = registries.iter().find(|r| r.is_registered(&marker))?;

        let read = |attr: &str| -> Option<String> {
            registry
                .get_attribute(&marker, attr)
                .ok()
                .map(|v| v.string_form())
        };

        let vendor = read("Vendor")?;
        let product = read("Product")?;
        let version = read("Version").unwrap_or_default();

        let mut handle = ServerHandle::new(vendor, product, version);
        if let Some(url) = read("AgentUrl").and_then(|raw| url::Url::parse(&raw).ok()) {
            handle = handle.with_agent_url(url);
        }

        // Stale-metadata workaround, composed as middleware.
        if let Ok(BusValue::Seq(domains)) = registry.get_attribute(&marker, "RefreshDomains") {
            let domains: Vec<String> = domains.iter().map(BusValue::string_form).collect();
            if !domains.is_empty() {
                let hook: PreDispatchHook = Arc::new(move |registries, request| {
                    let Some(name) = request.object_name() else {
                        return Ok(());
                    };
                    if name.is_pattern() || !domains.iter().any(|d| d == name.domain()) {
                        return Ok(());
                    }
                    for registry in registries {
                        if registry.bean_info(name).is_ok() {
                            return Ok(());
                        }
                    }
                    // Not found anywhere is the dispatcher's problem,
                    // not the workaround's.
                    Ok(())
                });
                handle = handle.with_pre_dispatch(hook);
            }
        }

        let boot_registry = Arc::clone(registry);
        let post: PostDetectHook = Arc::new(move |_registries, config| {
            let boot_requested = config
                .detector_options
                .as_ref()
                .and_then(|o| o.get("platform"))
                .and_then(|p| p.get("boot"))
                .and_then(|b| b.as_bool())
                .unwrap_or(false);
            if boot_requested {
                boot_registry
                    .invoke(&Self::marker_name(), "boot", Vec::new())
                    .map_err(ProtocolError::from)?;
                boot_registry.emit(
                    &Self::marker_name(),
                    Notification::new("platform.boot", "management subsystem booted", BusValue::Null),
                );
            }
            Ok(())
        });
        Some(handle.with_post_detect(post))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spyglass_bus::{
        no_such_attribute, no_such_operation, AttributeInfo, BeanInfo, BusType, ManagedBean,
        RegistryError,
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MarkerBean {
        booted: AtomicBool,
    }

    impl ManagedBean for MarkerBean {
        fn info(&self) -> BeanInfo {
            BeanInfo::new("PlatformServer", "platform marker").with_attributes(vec![
                AttributeInfo::readonly("Vendor", BusType::Text, ""),
                AttributeInfo::readonly("Product", BusType::Text, ""),
                AttributeInfo::readonly("Version", BusType::Text, ""),
            ])
        }

        fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
            match attribute {
                "Vendor" => Ok(BusValue::from("ferrous")),
                "Product" => Ok(BusValue::from("hearth")),
                "Version" => Ok(BusValue::from("3.1.4")),
                "Booted" => Ok(BusValue::Bool(self.booted.load(Ordering::Relaxed))),
                other => Err(no_such_attribute("PlatformServer", other)),
            }
        }

        fn invoke(&self, operation: &str, _args: Vec<BusValue>) -> Result<BusValue, RegistryError> {
            match operation {
                "boot" => {
                    self.booted.store(true, Ordering::Relaxed);
                    Ok(BusValue::Null)
                }
                other => Err(no_such_operation("PlatformServer", other)),
            }
        }
    }

    fn marker_registry() -> Arc<BeanRegistry> {
        let registry = Arc::new(BeanRegistry::new("host"));
        registry
            .register(
                ObjectName::parse("platform:type=Server").unwrap(),
                Arc::new(MarkerBean {
                    booted: AtomicBool::new(false),
                }),
            )
            .unwrap();
        registry
    }

    #[test]
    fn marker_bean_yields_product_handle() {
        let registries = vec![marker_registry()];
        let handle = PlatformMarkerDetector.detect(&registries).unwrap();
        assert_eq!(handle.vendor, "ferrous");
        assert_eq!(handle.product, "hearth");
        assert_eq!(handle.version, "3.1.4");
    }

    #[test]
    fn no_marker_means_no_match_and_generic_handle() {
        let mut registries = vec![Arc::new(BeanRegistry::new("bare"))];
        let handle = run_detectors(
            &all_detectors(),
            &mut registries,
            &BridgeConfig::default(),
        );
        assert_eq!(handle.product, "");
    }

    #[test]
    fn contribution_failure_is_swallowed() {
        struct Faulty;
        impl ServerDetector for Faulty {
            fn name(&self) -> &'static str {
                "faulty"
            }
            fn detect(&self, _registries: &[Arc<BeanRegistry>]) -> Option<ServerHandle> {
                None
            }
            fn contribute_registries(
                &self,
                _registries: &mut Vec<Arc<BeanRegistry>>,
            ) -> Result<(), ProtocolError> {
                Err(ProtocolError::Internal("locator blew up".into()))
            }
        }

        let detectors: Vec<Box<dyn ServerDetector>> = vec![Box::new(Faulty)];
        let mut registries = Vec::new();
        // Startup survives; the generic handle comes back.
        let handle = run_detectors(&detectors, &mut registries, &BridgeConfig::default());
        assert_eq!(handle.product, "");
    }

    #[test]
    fn contributed_registries_join_the_set() {
        struct Contributor(Arc<BeanRegistry>);
        impl ServerDetector for Contributor {
            fn name(&self) -> &'static str {
                "contributor"
            }
            fn detect(&self, _registries: &[Arc<BeanRegistry>]) -> Option<ServerHandle> {
                None
            }
            fn contribute_registries(
                &self,
                registries: &mut Vec<Arc<BeanRegistry>>,
            ) -> Result<(), ProtocolError> {
                registries.push(Arc::clone(&self.0));
                Ok(())
            }
        }

        let side = Arc::new(BeanRegistry::new("side"));
        let detectors: Vec<Box<dyn ServerDetector>> =
            vec![Box::new(Contributor(Arc::clone(&side)))];
        let mut registries = Vec::new();
        run_detectors(&detectors, &mut registries, &BridgeConfig::default());
        assert_eq!(registries.len(), 1);
        assert!(Arc::ptr_eq(&registries[0], &side));
    }

    #[test]
    fn post_detect_boot_invokes_marker_operation() {
        let registry = marker_registry();
        let mut registries = vec![Arc::clone(&registry)];
        let config = BridgeConfig {
            detector_options: Some(serde_json::json!({"platform": {"boot": true}})),
            ..Default::default()
        };
        let detectors: Vec<Box<dyn ServerDetector>> = vec![Box::new(PlatformMarkerDetector)];
        let handle = run_detectors(&detectors, &mut registries, &config);
        assert_eq!(handle.product, "hearth");
        // The boot operation ran on the marker bean.
        let marker = ObjectName::parse("platform:type=Server").unwrap();
        assert_eq!(
            registry.get_attribute(&marker, "Booted").unwrap(),
            BusValue::Bool(true)
        );
    }
}
