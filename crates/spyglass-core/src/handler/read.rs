// ── Read handler ──
//
// The deepest verb. Simple reads (one bean, one attribute) are routed
// per registry by the dispatcher; pattern reads, multi-attribute reads
// and "all attributes" reads take the merged set and fan out, with
// per-attribute fault tolerance governed by the request's value-fault
// policy.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use spyglass_bus::{BeanRegistry, BusValue, ObjectName};

use crate::error::ProtocolError;
use crate::handler::{bean_info_from, HandlerOutcome, VerbHandler};
use crate::request::{AttributeSpec, Request, RequestKind, ValueFaultPolicy, Verb};
use crate::restrictor::Restrictor;

pub struct ReadHandler {
    restrictor: Arc<dyn Restrictor>,
}

impl ReadHandler {
    pub fn new(restrictor: Arc<dyn Restrictor>) -> Self {
        Self { restrictor }
    }

    fn check_read(&self, name: &ObjectName, attribute: &str) -> Result<(), ProtocolError> {
        if self.restrictor.is_attribute_read_allowed(name, attribute) {
            Ok(())
        } else {
            Err(ProtocolError::Forbidden(format!(
                "reading attribute {attribute} of {} is not allowed",
                name.canonical_name()
            )))
        }
    }

    /// Union of pattern matches across every registry.
    fn search_beans(registries: &[Arc<BeanRegistry>], pattern: &ObjectName) -> Vec<ObjectName> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for registry in registries {
            for name in registry.query_names(pattern) {
                if seen.insert(name.canonical_name()) {
                    names.push(name);
                }
            }
        }
        names.sort_by_key(ObjectName::canonical_name);
        names
    }

    /// Fetch one attribute, trying each registry until one knows the
    /// bean.
    fn get_attribute(
        registries: &[Arc<BeanRegistry>],
        name: &ObjectName,
        attribute: &str,
    ) -> Result<BusValue, ProtocolError> {
        for registry in registries {
            match registry.get_attribute(name, attribute) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_instance_not_found() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ProtocolError::instance_not_found(format!(
            "no bean {name} in any registry"
        )))
    }

    /// Fetch a set of attributes as a map, routing per-attribute
    /// failures through the fault policy.
    fn fetch_attributes(
        &self,
        registries: &[Arc<BeanRegistry>],
        name: &ObjectName,
        attributes: Option<Vec<&str>>,
        fault: &ValueFaultPolicy,
    ) -> Result<BusValue, ProtocolError> {
        let attribute_names: Vec<String> = match attributes {
            Some(requested) => requested.into_iter().map(str::to_owned).collect(),
            None => bean_info_from(registries, name)?.readable_attributes(),
        };

        let mut values = IndexMap::new();
        for attribute in attribute_names {
            let fetched = self
                .check_read(name, &attribute)
                .and_then(|()| Self::get_attribute(registries, name, &attribute));
            match fetched {
                Ok(value) => {
                    values.insert(attribute, value);
                }
                Err(e) => match fault {
                    ValueFaultPolicy::Strict => return Err(e),
                    ValueFaultPolicy::Ignore => {
                        values.insert(attribute, BusValue::Text(format!("ERROR: {e}")));
                    }
                    ValueFaultPolicy::Custom(f) => {
                        values.insert(attribute, BusValue::Text(f(&e).to_string()));
                    }
                },
            }
        }
        Ok(BusValue::map(values))
    }

    fn fetch_for_pattern(
        &self,
        registries: &[Arc<BeanRegistry>],
        pattern: &ObjectName,
        attributes: &AttributeSpec,
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let names = Self::search_beans(registries, pattern);
        let fault = &request.options.fault;
        let mut result = IndexMap::new();

        for name in names {
            let requested = attributes.names();
            let values = match requested {
                None => {
                    // All readable attributes; beans denied entirely or
                    // empty are elided.
                    let info = bean_info_from(registries, &name)?;
                    let readable: Vec<String> = info
                        .readable_attributes()
                        .into_iter()
                        .filter(|a| self.restrictor.is_attribute_read_allowed(&name, a))
                        .collect();
                    if readable.is_empty() {
                        continue;
                    }
                    self.fetch_attributes(
                        registries,
                        &name,
                        Some(readable.iter().map(String::as_str).collect()),
                        fault,
                    )?
                }
                Some(requested) => {
                    // Intersect with the bean's actual attributes and
                    // the restrictor; non-applicable pairs are elided,
                    // not errored.
                    let info = bean_info_from(registries, &name)?;
                    let applicable: Vec<&str> = requested
                        .into_iter()
                        .filter(|a| info.attribute(a).is_some_and(|i| i.readable))
                        .filter(|a| self.restrictor.is_attribute_read_allowed(&name, a))
                        .collect();
                    if applicable.is_empty() {
                        continue;
                    }
                    self.fetch_attributes(registries, &name, Some(applicable), fault)?
                }
            };

            if let BusValue::Map(values_map) = &values {
                if values_map.is_empty() {
                    continue;
                }
            }
            let key = if request.options.canonical_naming {
                name.canonical_name()
            } else {
                name.literal_name()
            };
            result.insert(key, values);
        }

        if result.is_empty() && attributes.names().is_some() {
            return Err(ProtocolError::InvalidRequest(format!(
                "no matching attributes found for pattern {}",
                pattern.literal_name()
            )));
        }
        Ok(HandlerOutcome::Value(BusValue::map(result)))
    }
}

impl VerbHandler for ReadHandler {
    fn verb(&self) -> Verb {
        Verb::Read
    }

    /// Patterns, multi-attribute and "all attributes" reads fan out
    /// over the merged set; only the simple one-bean-one-attribute
    /// case iterates per registry.
    fn handle_all_at_once(&self, request: &Request) -> bool {
        match &request.kind {
            RequestKind::Read { name, attributes } => {
                name.is_pattern() || attributes.is_multi()
            }
            _ => false,
        }
    }

    fn handle_single(
        &self,
        registry: &BeanRegistry,
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let RequestKind::Read { name, attributes } = &request.kind else {
            return Err(ProtocolError::Internal("read handler got a non-read".into()));
        };
        let AttributeSpec::One(attribute) = attributes else {
            return Err(ProtocolError::Internal(
                "multi-attribute read routed to single mode".into(),
            ));
        };
        self.check_read(name, attribute)?;
        Ok(HandlerOutcome::Value(
            registry.get_attribute(name, attribute)?,
        ))
    }

    fn handle_merged(
        &self,
        registries: &[Arc<BeanRegistry>],
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let RequestKind::Read { name, attributes } = &request.kind else {
            return Err(ProtocolError::Internal("read handler got a non-read".into()));
        };
        if name.is_pattern() {
            return self.fetch_for_pattern(registries, name, attributes, request);
        }
        // Concrete name, multiple (or all) attributes. A denial here is
        // a per-attribute fault, subject to the policy.
        let values =
            self.fetch_attributes(registries, name, attributes.names(), &request.options.fault)?;
        Ok(HandlerOutcome::Value(values))
    }
}
