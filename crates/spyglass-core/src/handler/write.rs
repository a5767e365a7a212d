// ── Write handler ──

use std::sync::Arc;

use spyglass_bus::{BeanRegistry, RegistryError};

use crate::converter::deserialize_value;
use crate::error::ProtocolError;
use crate::handler::{HandlerOutcome, VerbHandler};
use crate::request::{Request, RequestKind, Verb};
use crate::restrictor::Restrictor;

pub struct WriteHandler {
    restrictor: Arc<dyn Restrictor>,
}

impl WriteHandler {
    pub fn new(restrictor: Arc<dyn Restrictor>) -> Self {
        Self { restrictor }
    }
}

impl VerbHandler for WriteHandler {
    fn verb(&self) -> Verb {
        Verb::Write
    }

    fn handle_single(
        &self,
        registry: &BeanRegistry,
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let RequestKind::Write {
            name,
            attribute,
            value,
        } = &request.kind
        else {
            return Err(ProtocolError::Internal("write handler got a non-write".into()));
        };

        if !self.restrictor.is_attribute_write_allowed(name, attribute) {
            return Err(ProtocolError::Forbidden(format!(
                "writing attribute {attribute} of {} is not allowed",
                name.canonical_name()
            )));
        }

        // The attribute's declared type drives the JSON conversion.
        let info = registry.bean_info(name)?;
        let attr_info = info.attribute(attribute).ok_or_else(|| {
            ProtocolError::from(RegistryError::AttributeNotFound {
                name: name.to_string(),
                attribute: attribute.clone(),
            })
        })?;
        if !attr_info.writable {
            return Err(RegistryError::NotWritable {
                name: name.to_string(),
                attribute: attribute.clone(),
            }
            .into());
        }

        let native = deserialize_value(&attr_info.ty, value)?;
        let previous = registry.set_attribute(name, attribute, native)?;
        Ok(HandlerOutcome::Value(previous))
    }
}
