// ── Object names ──
//
// A bean is addressed by `domain:key=value,key=value,...`. Names may be
// patterns: `*` and `?` wildcards in the domain or in property values,
// plus a trailing `,*` that relaxes the property list to "at least
// these". Equality and hashing always go through the canonical form
// (properties sorted by key) so that `a:x=1,y=2` and `a:y=2,x=1` are
// the same bean.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RegistryError;

/// A bean address: domain plus an ordered `key=value` property list.
///
/// The literal form preserves the property order given at parse time;
/// the canonical form sorts properties lexicographically by key. Two
/// names are equal iff their canonical forms are equal.
#[derive(Debug, Clone)]
pub struct ObjectName {
    domain: String,
    /// Properties in literal (input) order.
    properties: Vec<(String, String)>,
    /// Trailing `,*`: the property list is a prefix pattern.
    property_list_pattern: bool,
}

impl ObjectName {
    /// Parse a name from its string form.
    ///
    /// A non-pattern name must carry a non-empty domain and at least
    /// one property; patterns are free to omit either.
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let malformed = |reason: &str| RegistryError::MalformedName {
            name: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let (domain, props_raw) = raw
            .split_once(':')
            .ok_or_else(|| malformed("missing ':' separator"))?;
        if domain.contains(':') {
            return Err(malformed("more than one ':'"));
        }

        let mut properties = Vec::new();
        let mut property_list_pattern = false;
        for (i, part) in props_raw.split(',').enumerate() {
            if part == "*" {
                property_list_pattern = true;
                continue;
            }
            if part.is_empty() {
                // `domain:` is a valid property-less pattern head only
                // when the whole list is empty.
                if i == 0 && props_raw.is_empty() {
                    break;
                }
                return Err(malformed("empty property"));
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| malformed("property without '='"))?;
            if key.is_empty() {
                return Err(malformed("empty property key"));
            }
            if properties.iter().any(|(k, _)| k == key) {
                return Err(malformed("duplicate property key"));
            }
            properties.push((key.to_owned(), value.to_owned()));
        }

        let name = Self {
            domain: domain.to_owned(),
            properties,
            property_list_pattern,
        };
        if !name.is_pattern() && (name.domain.is_empty() || name.properties.is_empty()) {
            return Err(malformed(
                "a non-pattern name needs a domain and at least one property",
            ));
        }
        Ok(name)
    }

    /// The domain part before the `:`.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Property value for `key`, if present.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Properties in literal (input) order.
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    /// Whether this name contains any wildcard.
    pub fn is_pattern(&self) -> bool {
        self.property_list_pattern
            || has_wildcard(&self.domain)
            || self
                .properties
                .iter()
                .any(|(_, v)| has_wildcard(v))
    }

    /// The canonical string form: properties sorted by key.
    pub fn canonical_name(&self) -> String {
        let mut sorted: Vec<&(String, String)> = self.properties.iter().collect();
        sorted.sort_by(|a, b| match a.0.cmp(&b.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            other => other,
        });
        let mut parts: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
        if self.property_list_pattern {
            parts.push("*".to_owned());
        }
        format!("{}:{}", self.domain, parts.join(","))
    }

    /// The literal string form: properties in input order.
    pub fn literal_name(&self) -> String {
        let mut parts: Vec<String> = self
            .properties
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if self.property_list_pattern {
            parts.push("*".to_owned());
        }
        format!("{}:{}", self.domain, parts.join(","))
    }

    /// Match this name, interpreted as a pattern, against a concrete name.
    ///
    /// A non-pattern name matches only itself (canonically). For a
    /// pattern: the domain is glob-matched (`*`, `?`); every property
    /// in the pattern must be present in the candidate with a
    /// glob-matching value; without a trailing `,*` the candidate must
    /// carry exactly the pattern's keys.
    pub fn matches(&self, candidate: &ObjectName) -> bool {
        if candidate.is_pattern() {
            return false;
        }
        if !self.is_pattern() {
            return self == candidate;
        }
        if !glob_match(&self.domain, &candidate.domain) {
            return false;
        }
        for (key, pattern_value) in &self.properties {
            match candidate.property(key) {
                Some(value) if glob_match(pattern_value, value) => {}
                _ => return false,
            }
        }
        if !self.property_list_pattern && candidate.properties.len() != self.properties.len() {
            return false;
        }
        true
    }
}

impl PartialEq for ObjectName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_name() == other.canonical_name()
    }
}

impl Eq for ObjectName {}

impl Hash for ObjectName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_name().hash(state);
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal_name())
    }
}

impl FromStr for ObjectName {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.literal_name())
    }
}

impl<'de> Deserialize<'de> for ObjectName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn has_wildcard(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

/// Iterative glob match supporting `*` (any run) and `?` (any one char).
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star, mut mark) = (None::<usize>, 0usize);

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    #[test]
    fn parse_and_roundtrip_canonical() {
        let n = name("java.lang:type=Memory");
        assert_eq!(n.domain(), "java.lang");
        assert_eq!(n.property("type"), Some("Memory"));
        assert_eq!(n.canonical_name(), "java.lang:type=Memory");
        // Property 1: parse(format(n)) == n
        assert_eq!(ObjectName::parse(&n.canonical_name()).unwrap(), n);
    }

    #[test]
    fn canonical_sorts_properties_literal_preserves_order() {
        let n = name("app:zone=b,area=a");
        assert_eq!(n.canonical_name(), "app:area=a,zone=b");
        assert_eq!(n.literal_name(), "app:zone=b,area=a");
    }

    #[test]
    fn equality_uses_canonical_form() {
        assert_eq!(name("a:x=1,y=2"), name("a:y=2,x=1"));
        assert_ne!(name("a:x=1"), name("a:x=2"));
    }

    #[test]
    fn pattern_detection() {
        assert!(name("java.lang:type=*").is_pattern());
        assert!(name("*:type=Memory").is_pattern());
        assert!(name("java.lang:type=Memory,*").is_pattern());
        assert!(name("java.lang:type=Mem?ry").is_pattern());
        assert!(!name("java.lang:type=Memory").is_pattern());
    }

    #[test]
    fn non_pattern_requires_domain_and_property() {
        assert!(ObjectName::parse("java.lang:").is_err());
        assert!(ObjectName::parse(":type=Memory").is_err());
        assert!(ObjectName::parse("no-separator").is_err());
        // ...but patterns may omit either
        assert!(ObjectName::parse("java.lang:*").is_ok());
        assert!(ObjectName::parse("*:type=Memory").is_ok());
    }

    #[test]
    fn duplicate_keys_rejected() {
        assert!(ObjectName::parse("a:x=1,x=2").is_err());
    }

    #[test]
    fn wildcard_value_matching() {
        let pattern = name("java.lang:type=*");
        assert!(pattern.matches(&name("java.lang:type=Memory")));
        assert!(pattern.matches(&name("java.lang:type=Threading")));
        assert!(!pattern.matches(&name("java.lang:name=x")));
        assert!(!pattern.matches(&name("java.util:type=Memory")));
    }

    #[test]
    fn wildcard_domain_matching() {
        let pattern = name("java.*:type=Memory");
        assert!(pattern.matches(&name("java.lang:type=Memory")));
        assert!(!pattern.matches(&name("javax:type=Memory")));

        let q = name("ap?:x=1");
        assert!(q.matches(&name("app:x=1")));
        assert!(!q.matches(&name("apps:x=1")));
    }

    #[test]
    fn property_list_pattern_relaxes_key_set() {
        let pattern = name("app:type=Worker,*");
        assert!(pattern.matches(&name("app:type=Worker")));
        assert!(pattern.matches(&name("app:type=Worker,id=3")));

        let exact = name("app:type=*");
        assert!(!exact.matches(&name("app:type=Worker,id=3")));
    }

    #[test]
    fn concrete_name_matches_only_itself() {
        let n = name("app:type=Worker");
        assert!(n.matches(&name("app:type=Worker")));
        assert!(!n.matches(&name("app:type=Boss")));
    }
}
