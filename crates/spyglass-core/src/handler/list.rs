// ── List handler ──
//
// Builds the metadata tree `{domain: {properties: {desc, attr, op,
// not}}}` across every registry and applies the request path to it
// directly; the converter never sees list results.

use std::sync::Arc;

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use spyglass_bus::{BeanInfo, BeanRegistry};

use crate::error::ProtocolError;
use crate::handler::{HandlerOutcome, VerbHandler};
use crate::request::{Request, Verb};

pub struct ListHandler;

impl ListHandler {
    fn bean_entry(info: &BeanInfo) -> JsonValue {
        let mut entry = JsonMap::new();
        entry.insert("desc".to_owned(), json!(info.description));

        let mut attrs = JsonMap::new();
        for attribute in &info.attributes {
            attrs.insert(
                attribute.name.clone(),
                json!({
                    "type": attribute.ty.to_string(),
                    "rw": attribute.writable,
                    "desc": attribute.description,
                }),
            );
        }
        entry.insert("attr".to_owned(), JsonValue::Object(attrs));

        let mut ops = JsonMap::new();
        for operation in &info.operations {
            let desc = json!({
                "args": operation
                    .params
                    .iter()
                    .map(|p| json!({"name": p.name, "type": p.ty.to_string()}))
                    .collect::<Vec<_>>(),
                "ret": operation.ret.to_string(),
                "desc": operation.description,
            });
            // Overloads collect into an array under the shared name.
            match ops.entry(operation.name.clone()) {
                serde_json::map::Entry::Vacant(slot) => {
                    slot.insert(desc);
                }
                serde_json::map::Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    if let JsonValue::Array(overloads) = existing {
                        overloads.push(desc);
                    } else {
                        let first = existing.take();
                        *existing = JsonValue::Array(vec![first, desc]);
                    }
                }
            }
        }
        entry.insert("op".to_owned(), JsonValue::Object(ops));

        if !info.notifications.is_empty() {
            let mut nots = JsonMap::new();
            for notification in &info.notifications {
                nots.insert(
                    notification.kind.clone(),
                    json!(notification.description),
                );
            }
            entry.insert("not".to_owned(), JsonValue::Object(nots));
        }
        JsonValue::Object(entry)
    }

    fn full_tree(registries: &[Arc<BeanRegistry>]) -> JsonValue {
        let mut root = JsonMap::new();
        for registry in registries {
            for name in registry.names() {
                let Ok(info) = registry.bean_info(&name) else {
                    continue;
                };
                let literal = name.literal_name();
                let properties = literal
                    .split_once(':')
                    .map(|(_, p)| p.to_owned())
                    .unwrap_or(literal);

                let domain_entry = root
                    .entry(name.domain().to_owned())
                    .or_insert_with(|| JsonValue::Object(JsonMap::new()));
                if let Some(domain_map) = domain_entry.as_object_mut() {
                    // First registry to describe a bean wins.
                    domain_map
                        .entry(properties)
                        .or_insert_with(|| Self::bean_entry(&info));
                }
            }
        }
        JsonValue::Object(root)
    }

    fn descend<'v>(tree: &'v JsonValue, path: &[String]) -> Result<&'v JsonValue, ProtocolError> {
        let mut cursor = tree;
        for segment in path {
            cursor = cursor
                .as_object()
                .and_then(|map| map.get(segment))
                .ok_or_else(|| {
                    ProtocolError::path_not_found(format!(
                        "no '{segment}' in the metadata tree"
                    ))
                })?;
        }
        Ok(cursor)
    }
}

impl VerbHandler for ListHandler {
    fn verb(&self) -> Verb {
        Verb::List
    }

    fn handle_all_at_once(&self, _request: &Request) -> bool {
        true
    }

    fn handle_merged(
        &self,
        registries: &[Arc<BeanRegistry>],
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let tree = Self::full_tree(registries);
        let located = Self::descend(&tree, request.path_segments())?;
        Ok(HandlerOutcome::Ready(located.clone()))
    }
}
