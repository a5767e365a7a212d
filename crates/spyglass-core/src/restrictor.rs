// ── Restrictor ──
//
// The policy oracle consulted before anything touches a bean: per-verb
// gate, per-attribute read/write gates, per-operation gate and the
// remote host/address gate the transport calls before parsing.
// Denials surface as 403 envelopes with the stacktrace wiped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use serde::Deserialize;

use spyglass_bus::ObjectName;

use crate::config::BridgeConfig;
use crate::error::ProtocolError;
use crate::request::Verb;

pub trait Restrictor: Send + Sync {
    fn is_verb_allowed(&self, verb: Verb) -> bool;
    fn is_attribute_read_allowed(&self, name: &ObjectName, attribute: &str) -> bool;
    fn is_attribute_write_allowed(&self, name: &ObjectName, attribute: &str) -> bool;
    fn is_operation_allowed(&self, name: &ObjectName, operation: &str) -> bool;
    fn is_remote_access_allowed(&self, host: Option<&str>, addr: Option<&str>) -> bool;
}

/// Permits everything. The default when no policy is configured.
pub struct AllowAllRestrictor;

impl Restrictor for AllowAllRestrictor {
    fn is_verb_allowed(&self, _verb: Verb) -> bool {
        true
    }
    fn is_attribute_read_allowed(&self, _name: &ObjectName, _attribute: &str) -> bool {
        true
    }
    fn is_attribute_write_allowed(&self, _name: &ObjectName, _attribute: &str) -> bool {
        true
    }
    fn is_operation_allowed(&self, _name: &ObjectName, _operation: &str) -> bool {
        true
    }
    fn is_remote_access_allowed(&self, _host: Option<&str>, _addr: Option<&str>) -> bool {
        true
    }
}

/// Denies everything. Useful as a panic switch.
pub struct DenyAllRestrictor;

impl Restrictor for DenyAllRestrictor {
    fn is_verb_allowed(&self, _verb: Verb) -> bool {
        false
    }
    fn is_attribute_read_allowed(&self, _name: &ObjectName, _attribute: &str) -> bool {
        false
    }
    fn is_attribute_write_allowed(&self, _name: &ObjectName, _attribute: &str) -> bool {
        false
    }
    fn is_operation_allowed(&self, _name: &ObjectName, _operation: &str) -> bool {
        false
    }
    fn is_remote_access_allowed(&self, _host: Option<&str>, _addr: Option<&str>) -> bool {
        false
    }
}

// ── Policy document ─────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    /// Permitted verbs; absent means all.
    verbs: Option<Vec<String>>,
    #[serde(default)]
    remote: RemoteSection,
    #[serde(default, rename = "allow")]
    allow_rules: Vec<BeanRule>,
    #[serde(default, rename = "deny")]
    deny_rules: Vec<BeanRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteSection {
    /// Host/address globs; absent means any origin.
    allow: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BeanRule {
    /// Object-name pattern the rule applies to.
    name: String,
    /// Attribute globs readable under this rule; absent means all.
    read: Option<Vec<String>>,
    /// Attribute globs writable under this rule; absent means all.
    write: Option<Vec<String>>,
    /// Operation globs invocable under this rule; absent means all.
    operations: Option<Vec<String>>,
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
    Operation,
}

/// Restrictor driven by a TOML policy document (`policyLocation`).
///
/// Deny rules are checked first; when any allow rules exist, one of
/// them must match, otherwise the default is allow.
pub struct PolicyRestrictor {
    verbs: Option<Vec<Verb>>,
    remote_allow: Option<Vec<String>>,
    allow: Vec<CompiledRule>,
    deny: Vec<CompiledRule>,
}

struct CompiledRule {
    name: ObjectName,
    read: Option<Vec<String>>,
    write: Option<Vec<String>>,
    operations: Option<Vec<String>>,
}

impl PolicyRestrictor {
    pub fn from_toml(raw: &str) -> Result<Self, ProtocolError> {
        let doc: PolicyDocument = toml::from_str(raw)
            .map_err(|e| ProtocolError::Internal(format!("invalid policy document: {e}")))?;

        let verbs = doc
            .verbs
            .map(|list| {
                list.iter()
                    .map(|v| {
                        Verb::parse(v).ok_or_else(|| {
                            ProtocolError::Internal(format!("unknown verb '{v}' in policy"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        let compile = |rules: Vec<BeanRule>| -> Result<Vec<CompiledRule>, ProtocolError> {
            rules
                .into_iter()
                .map(|rule| {
                    Ok(CompiledRule {
                        name: ObjectName::parse(&rule.name).map_err(|e| {
                            ProtocolError::Internal(format!("bad name in policy: {e}"))
                        })?,
                        read: rule.read,
                        write: rule.write,
                        operations: rule.operations,
                    })
                })
                .collect()
        };

        Ok(Self {
            verbs,
            remote_allow: doc.remote.allow,
            allow: compile(doc.allow_rules)?,
            deny: compile(doc.deny_rules)?,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ProtocolError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::Internal(format!("cannot read policy {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    fn check(&self, name: &ObjectName, item: &str, access: Access) -> bool {
        fn item_list(rule: &CompiledRule, access: Access) -> Option<&[String]> {
            match access {
                Access::Read => rule.read.as_deref(),
                Access::Write => rule.write.as_deref(),
                Access::Operation => rule.operations.as_deref(),
            }
        }
        // A rule with no lists at all covers every access on the bean;
        // a rule with lists covers only what the matching list names.
        let covers = |rule: &CompiledRule| {
            let bare =
                rule.read.is_none() && rule.write.is_none() && rule.operations.is_none();
            bare || item_list(rule, access)
                .is_some_and(|items| items.iter().any(|g| glob(g, item)))
        };

        for rule in &self.deny {
            if rule_applies(&rule.name, name) && covers(rule) {
                return false;
            }
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow
            .iter()
            .any(|rule| rule_applies(&rule.name, name) && covers(rule))
    }
}

impl Restrictor for PolicyRestrictor {
    fn is_verb_allowed(&self, verb: Verb) -> bool {
        match &self.verbs {
            None => true,
            Some(allowed) => allowed.contains(&verb),
        }
    }

    fn is_attribute_read_allowed(&self, name: &ObjectName, attribute: &str) -> bool {
        self.check(name, attribute, Access::Read)
    }

    fn is_attribute_write_allowed(&self, name: &ObjectName, attribute: &str) -> bool {
        self.check(name, attribute, Access::Write)
    }

    fn is_operation_allowed(&self, name: &ObjectName, operation: &str) -> bool {
        self.check(name, operation, Access::Operation)
    }

    fn is_remote_access_allowed(&self, host: Option<&str>, addr: Option<&str>) -> bool {
        match &self.remote_allow {
            None => true,
            Some(globs) => globs.iter().any(|g| {
                host.is_some_and(|h| glob(g, h)) || addr.is_some_and(|a| glob(g, a))
            }),
        }
    }
}

fn rule_applies(rule_name: &ObjectName, name: &ObjectName) -> bool {
    if rule_name.is_pattern() {
        rule_name.matches(name)
    } else {
        rule_name == name
    }
}

fn glob(pattern: &str, text: &str) -> bool {
    // Reuse the object-name wildcard semantics for attribute and host
    // globs by matching through a single-property pattern.
    if !pattern.contains('*') && !pattern.contains('?') {
        return pattern == text;
    }
    let Ok(p) = ObjectName::parse(&format!("g:v={pattern}")) else {
        return false;
    };
    let Ok(t) = ObjectName::parse(&format!("g:v={text}")) else {
        return false;
    };
    p.matches(&t)
}

// ── Registration table ──────────────────────────────────────────────
//
// Restrictors are pluggable by registered name, the redesigned form of
// the original's load-by-class-name.

type RestrictorCtor = fn(&BridgeConfig) -> Result<Arc<dyn Restrictor>, ProtocolError>;

fn builtin_table() -> HashMap<&'static str, RestrictorCtor> {
    let mut table: HashMap<&'static str, RestrictorCtor> = HashMap::new();
    table.insert("allow-all", |_| Ok(Arc::new(AllowAllRestrictor)));
    table.insert("deny-all", |_| Ok(Arc::new(DenyAllRestrictor)));
    table.insert("policy", |config| {
        let path = config.policy_location.as_ref().ok_or_else(|| {
            ProtocolError::Internal("policy restrictor needs policyLocation".into())
        })?;
        Ok(Arc::new(PolicyRestrictor::from_path(path)?))
    });
    table
}

static REGISTRY: OnceLock<Mutex<HashMap<&'static str, RestrictorCtor>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<&'static str, RestrictorCtor>> {
    REGISTRY.get_or_init(|| Mutex::new(builtin_table()))
}

/// Register an additional restrictor constructor under a name usable
/// from the `restrictorClass` config key.
pub fn register_restrictor(name: &'static str, ctor: RestrictorCtor) {
    registry()
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .insert(name, ctor);
}

/// Resolve the restrictor for a configuration: explicit
/// `restrictorClass` first, then `policyLocation`, then allow-all.
pub fn restrictor_for(config: &BridgeConfig) -> Result<Arc<dyn Restrictor>, ProtocolError> {
    if let Some(name) = &config.restrictor_class {
        let ctor = registry()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(name.as_str())
            .copied()
            .ok_or_else(|| {
                ProtocolError::Internal(format!("no restrictor registered as '{name}'"))
            })?;
        return ctor(config);
    }
    if config.policy_location.is_some() {
        let ctor = registry()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get("policy")
            .copied()
            .ok_or_else(|| ProtocolError::Internal("policy restrictor missing".into()))?;
        return ctor(config);
    }
    Ok(Arc::new(AllowAllRestrictor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    #[test]
    fn allow_all_and_deny_all() {
        assert!(AllowAllRestrictor.is_verb_allowed(Verb::Exec));
        assert!(!DenyAllRestrictor.is_attribute_read_allowed(&name("a:b=c"), "X"));
    }

    #[test]
    fn verb_gate() {
        let policy = PolicyRestrictor::from_toml(r#"verbs = ["read", "list", "version"]"#).unwrap();
        assert!(policy.is_verb_allowed(Verb::Read));
        assert!(!policy.is_verb_allowed(Verb::Exec));
    }

    #[test]
    fn deny_rule_wins_over_allow() {
        let policy = PolicyRestrictor::from_toml(
            r#"
            [[allow]]
            name = "java.lang:type=*"

            [[deny]]
            name = "java.lang:type=Compilation"
            "#,
        )
        .unwrap();
        assert!(policy.is_attribute_read_allowed(&name("java.lang:type=Memory"), "HeapMemoryUsage"));
        assert!(!policy.is_attribute_read_allowed(&name("java.lang:type=Compilation"), "Name"));
    }

    #[test]
    fn allow_rules_become_exclusive_once_present() {
        let policy = PolicyRestrictor::from_toml(
            r#"
            [[allow]]
            name = "app:type=Safe"
            read = ["Status", "Count*"]
            "#,
        )
        .unwrap();
        assert!(policy.is_attribute_read_allowed(&name("app:type=Safe"), "Status"));
        assert!(policy.is_attribute_read_allowed(&name("app:type=Safe"), "CountTotal"));
        assert!(!policy.is_attribute_read_allowed(&name("app:type=Safe"), "Secret"));
        assert!(!policy.is_attribute_read_allowed(&name("app:type=Other"), "Status"));
        // The rule granted reads only; writes are not covered.
        assert!(!policy.is_attribute_write_allowed(&name("app:type=Safe"), "Status"));
    }

    #[test]
    fn partial_deny_rule_denies_only_its_lists() {
        let policy = PolicyRestrictor::from_toml(
            r#"
            [[deny]]
            name = "app:type=Box"
            read = ["Secret*"]
            "#,
        )
        .unwrap();
        assert!(!policy.is_attribute_read_allowed(&name("app:type=Box"), "SecretKey"));
        assert!(policy.is_attribute_read_allowed(&name("app:type=Box"), "Size"));
        // The deny rule names read globs only; writes stay open.
        assert!(policy.is_attribute_write_allowed(&name("app:type=Box"), "SecretKey"));
    }

    #[test]
    fn remote_host_globs() {
        let policy = PolicyRestrictor::from_toml(
            r#"
            [remote]
            allow = ["127.0.0.1", "10.0.*", "*.internal.example"]
            "#,
        )
        .unwrap();
        assert!(policy.is_remote_access_allowed(None, Some("127.0.0.1")));
        assert!(policy.is_remote_access_allowed(None, Some("10.0.3.7")));
        assert!(policy.is_remote_access_allowed(Some("mon.internal.example"), None));
        assert!(!policy.is_remote_access_allowed(Some("evil.example"), Some("203.0.113.9")));
    }

    #[test]
    fn empty_policy_allows_everything() {
        let policy = PolicyRestrictor::from_toml("").unwrap();
        assert!(policy.is_verb_allowed(Verb::Write));
        assert!(policy.is_attribute_write_allowed(&name("a:b=c"), "X"));
        assert!(policy.is_remote_access_allowed(Some("anywhere"), None));
    }

    #[test]
    fn policy_location_loads_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"verbs = ["read"]"#).unwrap();

        let config = BridgeConfig {
            policy_location: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let restrictor = restrictor_for(&config).unwrap();
        assert!(restrictor.is_verb_allowed(Verb::Read));
        assert!(!restrictor.is_verb_allowed(Verb::Write));

        let missing = BridgeConfig {
            policy_location: Some("/no/such/policy.toml".into()),
            ..Default::default()
        };
        assert!(restrictor_for(&missing).is_err());
    }

    #[test]
    fn resolver_prefers_explicit_class() {
        let config = BridgeConfig {
            restrictor_class: Some("deny-all".to_owned()),
            ..Default::default()
        };
        let restrictor = restrictor_for(&config).unwrap();
        assert!(!restrictor.is_verb_allowed(Verb::Read));

        let unknown = BridgeConfig {
            restrictor_class: Some("no-such".to_owned()),
            ..Default::default()
        };
        assert!(restrictor_for(&unknown).is_err());
    }
}
