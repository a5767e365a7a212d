// ── Exec handler ──

use std::sync::Arc;

use spyglass_bus::{BeanRegistry, RegistryError};

use crate::converter::deserialize_value;
use crate::error::ProtocolError;
use crate::handler::{HandlerOutcome, VerbHandler};
use crate::request::{Request, RequestKind, Verb};
use crate::restrictor::Restrictor;

pub struct ExecHandler {
    restrictor: Arc<dyn Restrictor>,
}

impl ExecHandler {
    pub fn new(restrictor: Arc<dyn Restrictor>) -> Self {
        Self { restrictor }
    }
}

impl VerbHandler for ExecHandler {
    fn verb(&self) -> Verb {
        Verb::Exec
    }

    fn handle_single(
        &self,
        registry: &BeanRegistry,
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let RequestKind::Exec {
            name,
            operation,
            arguments,
        } = &request.kind
        else {
            return Err(ProtocolError::Internal("exec handler got a non-exec".into()));
        };

        if !self.restrictor.is_operation_allowed(name, operation) {
            return Err(ProtocolError::Forbidden(format!(
                "invoking operation {operation} on {} is not allowed",
                name.canonical_name()
            )));
        }

        // Resolve the signature by name + arity; the explicit
        // `op(type,type)` form disambiguates overloads.
        let info = registry.bean_info(name)?;
        let candidates = info.operations_named(operation, arguments.len());
        let resolved = match candidates.as_slice() {
            [] => {
                return Err(RegistryError::OperationNotFound {
                    name: name.to_string(),
                    operation: operation.clone(),
                }
                .into())
            }
            [single] => *single,
            multiple => {
                let signatures: Vec<String> =
                    multiple.iter().map(|op| op.signature()).collect();
                return Err(ProtocolError::InvalidRequest(format!(
                    "operation {operation} on {name} is ambiguous, use one of: {}",
                    signatures.join(", ")
                )));
            }
        };

        let args = resolved
            .params
            .iter()
            .zip(arguments)
            .map(|(param, raw)| deserialize_value(&param.ty, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let result = registry.invoke(name, &resolved.name, args)?;
        Ok(HandlerOutcome::Value(result))
    }
}
