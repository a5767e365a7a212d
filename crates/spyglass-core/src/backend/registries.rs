// ── Registry-set handler ──
//
// Merges every discoverable bean registry into one insertion-ordered
// set: the platform registry, process-global extras, and whatever the
// detectors contributed. Readers clone an `Arc` snapshot and never
// lock; an explicit rescan rebuilds the set and swaps the snapshot
// atomically. The bridge's own beans are registered on the first
// (platform) registry and unregistered symmetrically at shutdown.

use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use spyglass_bus::{BeanRegistry, ManagedBean, ObjectName};

use crate::error::ProtocolError;

/// Discovery callback producing the base registry list; rescan runs it
/// again. Defaults to platform + announced extras.
pub type DiscoverFn = Box<dyn Fn() -> Vec<Arc<BeanRegistry>> + Send + Sync>;

pub struct RegistrySetHandler {
    discover: DiscoverFn,
    /// Registries contributed by detectors; survive rescans.
    contributed: Mutex<Vec<Arc<BeanRegistry>>>,
    snapshot: RwLock<Arc<Vec<Arc<BeanRegistry>>>>,
    /// (registry, name) pairs of the bridge's own beans, in
    /// registration order.
    own_beans: Mutex<Vec<(Arc<BeanRegistry>, ObjectName)>>,
}

impl RegistrySetHandler {
    /// Build from the default process-wide discovery.
    pub fn new() -> Self {
        Self::with_discovery(Box::new(|| {
            let mut registries = vec![spyglass_bus::platform()];
            registries.extend(spyglass_bus::extra_registries());
            registries
        }))
    }

    /// Build with an explicit discovery callback (embeddings, tests).
    pub fn with_discovery(discover: DiscoverFn) -> Self {
        let initial = Arc::new(dedup(discover()));
        Self {
            discover,
            contributed: Mutex::new(Vec::new()),
            snapshot: RwLock::new(initial),
            own_beans: Mutex::new(Vec::new()),
        }
    }

    /// Append detector-contributed registries and refresh the snapshot.
    pub fn add_contributed(&self, registries: Vec<Arc<BeanRegistry>>) {
        {
            let mut contributed = self.lock_contributed();
            contributed.extend(registries);
        }
        self.rescan();
    }

    /// Current snapshot; cheap to clone, safe to iterate lock-free.
    pub fn snapshot(&self) -> Arc<Vec<Arc<BeanRegistry>>> {
        self.snapshot
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Re-run discovery and swap the snapshot atomically.
    pub fn rescan(&self) {
        let mut registries = (self.discover)();
        registries.extend(self.lock_contributed().iter().cloned());
        let merged = Arc::new(dedup(registries));
        debug!(count = merged.len(), "registry set rescanned");
        *self.snapshot.write().unwrap_or_else(|p| p.into_inner()) = merged;
    }

    /// Register one of the bridge's own beans on the platform (first)
    /// registry and remember where, for symmetric unregistration.
    pub fn register_own_bean(
        &self,
        name: ObjectName,
        bean: Arc<dyn ManagedBean>,
    ) -> Result<(), ProtocolError> {
        let snapshot = self.snapshot();
        let registry = snapshot
            .first()
            .ok_or_else(|| ProtocolError::Internal("no registry to host bridge beans".into()))?;
        registry.register(name.clone(), bean)?;
        self.lock_own().push((Arc::clone(registry), name));
        Ok(())
    }

    /// Unregister every own bean, reverse order, best effort. Failures
    /// are collected and surfaced as a single aggregate error after
    /// all beans have been attempted.
    pub fn unregister_own_beans(&self) -> Result<(), ProtocolError> {
        let mut failures = Vec::new();
        let mut own = self.lock_own();
        while let Some((registry, name)) = own.pop() {
            if let Err(e) = registry.unregister(&name) {
                warn!(bean = %name, error = %e, "failed to unregister bridge bean");
                failures.push(format!("{name}: {e}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::Internal(format!(
                "failed to unregister {} bridge bean(s): {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }

    /// Run `f` against each registry in order until one succeeds.
    /// "Instance not found" moves on to the next registry; any other
    /// failure propagates. Misses everywhere raise the definitive 404.
    pub fn dispatch<T>(
        &self,
        describe: &dyn std::fmt::Display,
        f: impl Fn(&BeanRegistry) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        for registry in self.snapshot().iter() {
            match f(registry) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_instance_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ProtocolError::instance_not_found(format!(
            "{describe} not found in any registry"
        )))
    }

    fn lock_contributed(&self) -> std::sync::MutexGuard<'_, Vec<Arc<BeanRegistry>>> {
        self.contributed.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_own(&self) -> std::sync::MutexGuard<'_, Vec<(Arc<BeanRegistry>, ObjectName)>> {
        self.own_beans.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Insertion-ordered dedup by registry identity.
fn dedup(registries: Vec<Arc<BeanRegistry>>) -> Vec<Arc<BeanRegistry>> {
    let mut seen: Vec<Arc<BeanRegistry>> = Vec::with_capacity(registries.len());
    for registry in registries {
        if !seen.iter().any(|r| Arc::ptr_eq(r, &registry)) {
            seen.push(registry);
        }
    }
    seen
}
