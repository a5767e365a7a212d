// ── Bean registry ──
//
// The in-process catalog the bridge dispatches against. Storage is a
// `DashMap` so bean lookups never block behind unrelated mutations;
// the registry itself is shared as `Arc<BeanRegistry>` and deduplicated
// by pointer identity when several discovery paths surface the same
// instance.

use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use tracing::debug;

use crate::bean::ManagedBean;
use crate::error::RegistryError;
use crate::info::BeanInfo;
use crate::name::ObjectName;
use crate::notify::{Notification, NotificationHub};
use crate::value::BusValue;

/// An in-process catalog of managed beans addressable by object name.
pub struct BeanRegistry {
    label: String,
    beans: DashMap<ObjectName, Arc<dyn ManagedBean>>,
    hub: NotificationHub,
}

impl BeanRegistry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            beans: DashMap::new(),
            hub: NotificationHub::new(),
        }
    }

    /// Human-readable registry label used in logs and diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Register a bean. Patterns are not registrable.
    pub fn register(
        &self,
        name: ObjectName,
        bean: Arc<dyn ManagedBean>,
    ) -> Result<(), RegistryError> {
        if name.is_pattern() {
            return Err(RegistryError::MalformedName {
                name: name.to_string(),
                reason: "cannot register a pattern".to_owned(),
            });
        }
        if self.beans.contains_key(&name) {
            return Err(RegistryError::InstanceAlreadyExists {
                name: name.to_string(),
            });
        }
        debug!(registry = %self.label, bean = %name, "registering bean");
        self.beans.insert(name, bean);
        Ok(())
    }

    /// Unregister a bean.
    pub fn unregister(&self, name: &ObjectName) -> Result<(), RegistryError> {
        debug!(registry = %self.label, bean = %name, "unregistering bean");
        self.beans
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::InstanceNotFound {
                name: name.to_string(),
            })
    }

    pub fn is_registered(&self, name: &ObjectName) -> bool {
        self.beans.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }

    /// All registered names, unordered.
    pub fn names(&self) -> Vec<ObjectName> {
        self.beans.iter().map(|e| e.key().clone()).collect()
    }

    /// Names matching the given pattern (or the name itself when it is
    /// concrete and registered).
    pub fn query_names(&self, pattern: &ObjectName) -> Vec<ObjectName> {
        if !pattern.is_pattern() {
            return if self.is_registered(pattern) {
                vec![pattern.clone()]
            } else {
                Vec::new()
            };
        }
        self.beans
            .iter()
            .filter(|e| pattern.matches(e.key()))
            .map(|e| e.key().clone())
            .collect()
    }

    fn bean(&self, name: &ObjectName) -> Result<Arc<dyn ManagedBean>, RegistryError> {
        self.beans
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| RegistryError::InstanceNotFound {
                name: name.to_string(),
            })
    }

    pub fn bean_info(&self, name: &ObjectName) -> Result<BeanInfo, RegistryError> {
        Ok(self.bean(name)?.info())
    }

    pub fn get_attribute(
        &self,
        name: &ObjectName,
        attribute: &str,
    ) -> Result<BusValue, RegistryError> {
        self.bean(name)?.read(attribute)
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attribute(
        &self,
        name: &ObjectName,
        attribute: &str,
        value: BusValue,
    ) -> Result<BusValue, RegistryError> {
        self.bean(name)?.write(attribute, value)
    }

    pub fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        args: Vec<BusValue>,
    ) -> Result<BusValue, RegistryError> {
        self.bean(name)?.invoke(operation, args)
    }

    /// The registry's notification hub.
    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Emit a notification on behalf of a registered bean.
    pub fn emit(&self, source: &ObjectName, notification: Notification) {
        self.hub.publish(source, notification);
    }
}

// ── Process-wide discovery ──────────────────────────────────────────
//
// The platform registry is the process singleton every embedding gets
// for free; side registries announce themselves through
// `register_extra` and are picked up by the bridge's registry scan.

static PLATFORM: OnceLock<Arc<BeanRegistry>> = OnceLock::new();
static EXTRAS: Mutex<Vec<Arc<BeanRegistry>>> = Mutex::new(Vec::new());

/// The process-wide platform registry.
pub fn platform() -> Arc<BeanRegistry> {
    Arc::clone(PLATFORM.get_or_init(|| Arc::new(BeanRegistry::new("platform"))))
}

/// Announce an additional registry to the process-wide discovery list.
pub fn register_extra(registry: Arc<BeanRegistry>) {
    let mut extras = EXTRAS.lock().unwrap_or_else(|p| p.into_inner());
    if !extras.iter().any(|r| Arc::ptr_eq(r, &registry)) {
        extras.push(registry);
    }
}

/// Snapshot of all announced extra registries.
pub fn extra_registries() -> Vec<Arc<BeanRegistry>> {
    EXTRAS
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .clone()
}
