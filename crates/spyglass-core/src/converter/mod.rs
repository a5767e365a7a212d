// ── Value conversion ──
//
// Two directions. `to_json` renders a dynamic `BusValue` (possibly a
// whole object graph) into JSON, guided by an inner path and bounded
// by depth, collection-size and object-budget limits. `from_json`
// parses a JSON value into a `BusValue` against a declared `BusType`;
// write and exec use it for attribute values and operation arguments.

pub mod from_json;
pub mod to_json;

pub use from_json::deserialize_value;
pub use to_json::{serialize_value, SerializeLimits};

use crate::config::BridgeConfig;
use crate::request::ProcessingOptions;

impl SerializeLimits {
    /// Effective limits: the request's options clamped by the
    /// configured hard caps.
    pub fn effective(options: &ProcessingOptions, config: &BridgeConfig) -> Self {
        Self {
            max_depth: clamp(options.max_depth, config.max_depth),
            max_collection_size: clamp(options.max_collection_size, config.max_collection_size),
            max_objects: clamp(options.max_objects, config.max_objects),
        }
    }
}

fn clamp(requested: Option<usize>, cap: Option<usize>) -> Option<usize> {
    match (requested, cap) {
        (Some(r), Some(c)) => Some(r.min(c)),
        (Some(r), None) => Some(r),
        (None, cap) => cap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_options_are_clamped_by_config_caps() {
        let config = BridgeConfig {
            max_depth: Some(5),
            ..Default::default()
        };
        let mut options = ProcessingOptions::default();

        let limits = SerializeLimits::effective(&options, &config);
        assert_eq!(limits.max_depth, Some(5));

        options.max_depth = Some(9);
        let limits = SerializeLimits::effective(&options, &config);
        assert_eq!(limits.max_depth, Some(5));

        options.max_depth = Some(2);
        let limits = SerializeLimits::effective(&options, &config);
        assert_eq!(limits.max_depth, Some(2));
    }
}
