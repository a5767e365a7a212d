// ── Search handler ──

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use spyglass_bus::BeanRegistry;

use crate::error::ProtocolError;
use crate::handler::{HandlerOutcome, VerbHandler};
use crate::request::{Request, RequestKind, Verb};

pub struct SearchHandler;

impl VerbHandler for SearchHandler {
    fn verb(&self) -> Verb {
        Verb::Search
    }

    fn handle_all_at_once(&self, _request: &Request) -> bool {
        true
    }

    /// Union of matches across every registry; no match is an empty
    /// array, not an error.
    fn handle_merged(
        &self,
        registries: &[Arc<BeanRegistry>],
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let RequestKind::Search { pattern } = &request.kind else {
            return Err(ProtocolError::Internal("search handler got a non-search".into()));
        };

        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for registry in registries {
            for name in registry.query_names(pattern) {
                if seen.insert(name.canonical_name()) {
                    names.push(if request.options.canonical_naming {
                        name.canonical_name()
                    } else {
                        name.literal_name()
                    });
                }
            }
        }
        names.sort();
        Ok(HandlerOutcome::Ready(json!(names)))
    }
}
