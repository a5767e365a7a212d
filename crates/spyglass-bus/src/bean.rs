// ── The managed-bean seam ──

use crate::error::RegistryError;
use crate::info::BeanInfo;
use crate::value::BusValue;

/// A named, self-describing object registered in a bean registry.
///
/// Implementations must be internally synchronized: the bridge serves
/// concurrent requests and calls beans from multiple worker threads.
pub trait ManagedBean: Send + Sync {
    /// Self-description driving metadata-based verbs.
    fn info(&self) -> BeanInfo;

    /// Read one attribute.
    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError>;

    /// Write one attribute, returning the previous value.
    fn write(&self, attribute: &str, value: BusValue) -> Result<BusValue, RegistryError> {
        let _ = value;
        Err(RegistryError::NotWritable {
            name: self.info().type_name,
            attribute: attribute.to_owned(),
        })
    }

    /// Invoke one operation.
    fn invoke(&self, operation: &str, args: Vec<BusValue>) -> Result<BusValue, RegistryError> {
        let _ = args;
        Err(RegistryError::OperationNotFound {
            name: self.info().type_name,
            operation: operation.to_owned(),
        })
    }
}

/// Shorthand for the "no such attribute" error beans raise from
/// `read`/`write` fallthrough arms.
pub fn no_such_attribute(bean: &str, attribute: &str) -> RegistryError {
    RegistryError::AttributeNotFound {
        name: bean.to_owned(),
        attribute: attribute.to_owned(),
    }
}

/// Shorthand for the "no such operation" error beans raise from
/// `invoke` fallthrough arms.
pub fn no_such_operation(bean: &str, operation: &str) -> RegistryError {
    RegistryError::OperationNotFound {
        name: bean.to_owned(),
        operation: operation.to_owned(),
    }
}
