// ── Runtime configuration ──
//
// The bridge is configured through a flat string-keyed map: transports
// collect the keys from wherever they live (TOML profile, env vars,
// servlet-style init parameters) and hand the map over. `ConfigKey`
// names every recognized key with its default; `BridgeConfig` is the
// parsed result the rest of the core consumes.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

/// Every configuration key the bridge recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Hard cap on serialization depth requests may use.
    MaxDepth,
    /// Hard cap on elements serialized per collection.
    MaxCollectionSize,
    /// Hard cap on the global object budget per conversion.
    MaxObjects,
    /// Upper bound for any per-key history limit.
    HistoryMaxEntries,
    /// Size of the debug ring buffer.
    DebugMaxEntries,
    /// Whether debugging (and the debug store) is switched on.
    Debug,
    /// Comma-separated registered names of extra request dispatchers.
    DispatcherClasses,
    /// Extra property added to the bridge's own bean names.
    MbeanQualifier,
    /// Opaque JSON handed to detectors' post-detect hooks.
    DetectorOptions,
    /// Registered name of the restrictor to install.
    RestrictorClass,
    /// Filesystem location of the restrictor policy document.
    PolicyLocation,
    /// URL context under which the agent is reachable.
    AgentContext,
    /// Stable identifier of this agent instance.
    AgentId,
    /// Free-form description of this agent instance.
    AgentDescription,
}

impl ConfigKey {
    /// The wire-level key string.
    pub fn key(self) -> &'static str {
        match self {
            Self::MaxDepth => "maxDepth",
            Self::MaxCollectionSize => "maxCollectionSize",
            Self::MaxObjects => "maxObjects",
            Self::HistoryMaxEntries => "historyMaxEntries",
            Self::DebugMaxEntries => "debugMaxEntries",
            Self::Debug => "debug",
            Self::DispatcherClasses => "dispatcherClasses",
            Self::MbeanQualifier => "mbeanQualifier",
            Self::DetectorOptions => "detectorOptions",
            Self::RestrictorClass => "restrictorClass",
            Self::PolicyLocation => "policyLocation",
            Self::AgentContext => "agentContext",
            Self::AgentId => "agentId",
            Self::AgentDescription => "agentDescription",
        }
    }

    /// Built-in default, if the key has one.
    pub fn default_value(self) -> Option<&'static str> {
        match self {
            Self::HistoryMaxEntries => Some("10"),
            Self::DebugMaxEntries => Some("100"),
            Self::Debug => Some("false"),
            Self::AgentContext => Some("/spyglass"),
            _ => None,
        }
    }

    fn lookup<'a>(self, map: &'a HashMap<String, String>) -> Option<&'a str> {
        map.get(self.key())
            .map(String::as_str)
            .or_else(|| self.default_value())
    }
}

/// Parsed runtime configuration.
///
/// Immutable after construction except through the config bean, which
/// mutates the stores it fronts rather than this struct.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub max_depth: Option<usize>,
    pub max_collection_size: Option<usize>,
    pub max_objects: Option<usize>,
    pub history_max_entries: usize,
    pub debug_max_entries: usize,
    pub debug: bool,
    pub dispatcher_classes: Vec<String>,
    pub mbean_qualifier: Option<String>,
    pub detector_options: Option<serde_json::Value>,
    pub restrictor_class: Option<String>,
    pub policy_location: Option<PathBuf>,
    pub agent_context: String,
    pub agent_id: Option<String>,
    pub agent_description: Option<String>,
}

impl BridgeConfig {
    /// Parse from a flat key map. Unparseable numeric values fall back
    /// to the key's default with a warning; unknown keys are ignored
    /// (transports routinely pass through their own settings).
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            max_depth: parse_opt_usize(map, ConfigKey::MaxDepth),
            max_collection_size: parse_opt_usize(map, ConfigKey::MaxCollectionSize),
            max_objects: parse_opt_usize(map, ConfigKey::MaxObjects),
            history_max_entries: parse_usize(map, ConfigKey::HistoryMaxEntries, 10),
            debug_max_entries: parse_usize(map, ConfigKey::DebugMaxEntries, 100),
            debug: ConfigKey::Debug.lookup(map).is_some_and(|v| v == "true"),
            dispatcher_classes: ConfigKey::DispatcherClasses
                .lookup(map)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            mbean_qualifier: ConfigKey::MbeanQualifier.lookup(map).map(str::to_owned),
            detector_options: ConfigKey::DetectorOptions.lookup(map).and_then(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| {
                        warn!(error = %e, "ignoring unparseable detectorOptions");
                    })
                    .ok()
            }),
            restrictor_class: ConfigKey::RestrictorClass.lookup(map).map(str::to_owned),
            policy_location: ConfigKey::PolicyLocation.lookup(map).map(PathBuf::from),
            agent_context: ConfigKey::AgentContext
                .lookup(map)
                .unwrap_or("/spyglass")
                .to_owned(),
            agent_id: ConfigKey::AgentId.lookup(map).map(str::to_owned),
            agent_description: ConfigKey::AgentDescription.lookup(map).map(str::to_owned),
        }
    }
}

fn parse_opt_usize(map: &HashMap<String, String>, key: ConfigKey) -> Option<usize> {
    let raw = key.lookup(map)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = key.key(), value = raw, "ignoring unparseable config value");
            None
        }
    }
}

fn parse_usize(map: &HashMap<String, String>, key: ConfigKey, fallback: usize) -> usize {
    parse_opt_usize(map, key).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn defaults_apply_on_empty_map() {
        let config = BridgeConfig::from_map(&HashMap::new());
        assert_eq!(config.history_max_entries, 10);
        assert_eq!(config.debug_max_entries, 100);
        assert!(!config.debug);
        assert_eq!(config.agent_context, "/spyglass");
        assert!(config.max_depth.is_none());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = BridgeConfig::from_map(&map(&[
            ("maxDepth", "4"),
            ("debug", "true"),
            ("historyMaxEntries", "25"),
            ("dispatcherClasses", "proxy, audit"),
        ]));
        assert_eq!(config.max_depth, Some(4));
        assert!(config.debug);
        assert_eq!(config.history_max_entries, 25);
        assert_eq!(config.dispatcher_classes, vec!["proxy", "audit"]);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = BridgeConfig::from_map(&map(&[
            ("maxDepth", "not-a-number"),
            ("historyMaxEntries", "NaN"),
        ]));
        assert!(config.max_depth.is_none());
        assert_eq!(config.history_max_entries, 10);
    }

    #[test]
    fn detector_options_parse_as_json() {
        let config =
            BridgeConfig::from_map(&map(&[("detectorOptions", r#"{"platform":{"boot":true}}"#)]));
        let opts = config.detector_options.unwrap();
        assert_eq!(opts["platform"]["boot"], serde_json::json!(true));
    }
}
