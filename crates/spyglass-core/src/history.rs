// ── History store ──
//
// Remembers recent prior values per (object name, attribute|operation,
// path, target) tuple. Tracking is off for a key until a limit is
// configured through the history bean. Attach-then-append runs under
// the store lock so concurrent duplicate requests each see the
// previously committed value, never each other's in-flight write.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};

use spyglass_bus::ObjectName;

use crate::path::join_path;
use crate::request::{AttributeSpec, Request, RequestKind};

/// Upper bound on distinct tracked keys; least-recently-updated keys
/// are evicted beyond it.
const MAX_KEYS: usize = 512;

/// Exact-match history key. Patterns never become keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    /// Canonical object name.
    name: String,
    /// Attribute or operation name.
    item: Option<String>,
    /// Joined inner path.
    path: Option<String>,
    /// Proxy-target URL.
    target: Option<String>,
}

impl HistoryKey {
    pub fn for_attribute(
        name: &ObjectName,
        attribute: &str,
        path: Option<&str>,
        target: Option<&str>,
    ) -> Self {
        Self {
            name: name.canonical_name(),
            item: Some(attribute.to_owned()),
            path: path.map(str::to_owned),
            target: target.map(str::to_owned),
        }
    }

    pub fn for_operation(name: &ObjectName, operation: &str, target: Option<&str>) -> Self {
        Self {
            name: name.canonical_name(),
            item: Some(operation.to_owned()),
            path: None,
            target: target.map(str::to_owned),
        }
    }

    /// The key a request maps to, or `None` when the request is not
    /// history-tracked (patterns, multi-attribute reads, other verbs).
    fn from_request(request: &Request) -> Option<Self> {
        let target = request.target.as_ref().map(|t| t.url.as_str().to_owned());
        let path = request.path.as_deref().map(join_path);
        match &request.kind {
            RequestKind::Read { name, attributes } => {
                if name.is_pattern() {
                    return None;
                }
                match attributes {
                    AttributeSpec::One(attr) => Some(Self {
                        name: name.canonical_name(),
                        item: Some(attr.clone()),
                        path,
                        target,
                    }),
                    _ => None,
                }
            }
            RequestKind::Write { name, attribute, .. } => Some(Self {
                name: name.canonical_name(),
                item: Some(attribute.clone()),
                path,
                target,
            }),
            RequestKind::Exec { name, operation, .. } => Some(Self {
                name: name.canonical_name(),
                item: Some(operation.clone()),
                path: None,
                target,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    value: JsonValue,
    timestamp: i64,
}

#[derive(Debug)]
struct KeyState {
    limit: usize,
    max_age_secs: Option<i64>,
    entries: VecDeque<HistoryEntry>,
    /// Monotonic stamp for least-recently-updated eviction.
    touched: u64,
}

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<HistoryKey, KeyState>,
    /// Cap any per-key limit may not exceed.
    global_limit: usize,
    clock: u64,
}

/// Bounded, keyed store of prior response values.
#[derive(Debug)]
pub struct HistoryStore {
    inner: Mutex<Inner>,
}

impl HistoryStore {
    pub fn new(global_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                keys: HashMap::new(),
                global_limit,
                clock: 0,
            }),
        }
    }

    /// The cap applied to every per-key limit.
    pub fn global_limit(&self) -> usize {
        self.lock().global_limit
    }

    /// Change the cap; existing per-key limits and queues shrink to it.
    pub fn set_global_limit(&self, limit: usize) {
        let mut inner = self.lock();
        inner.global_limit = limit;
        for state in inner.keys.values_mut() {
            state.limit = state.limit.min(limit);
            while state.entries.len() > state.limit {
                state.entries.pop_front();
            }
        }
        inner.keys.retain(|_, s| s.limit > 0);
    }

    /// Number of currently tracked keys.
    pub fn key_count(&self) -> usize {
        self.lock().keys.len()
    }

    /// Switch tracking on (or off, with `limit == 0`) for a key.
    pub fn set_limit(&self, key: HistoryKey, limit: usize, max_age_secs: Option<i64>) {
        let mut inner = self.lock();
        if limit == 0 {
            inner.keys.remove(&key);
            return;
        }
        let limit = limit.min(inner.global_limit);
        let stamp = inner.tick();
        let state = inner.keys.entry(key).or_insert(KeyState {
            limit,
            max_age_secs,
            entries: VecDeque::new(),
            touched: stamp,
        });
        state.limit = limit;
        state.max_age_secs = max_age_secs;
        while state.entries.len() > limit {
            state.entries.pop_front();
        }
        inner.evict_excess_keys();
    }

    /// Drop all recorded values (tracking configuration survives).
    pub fn reset(&self) {
        let mut inner = self.lock();
        for state in inner.keys.values_mut() {
            state.entries.clear();
        }
    }

    /// Attach the prior history to the envelope, then append the new
    /// value. No-op for untracked or pattern requests.
    pub fn update_and_add(&self, request: &Request, envelope: &mut serde_json::Map<String, JsonValue>) {
        let Some(key) = HistoryKey::from_request(request) else {
            return;
        };
        let now = Utc::now().timestamp();
        let mut inner = self.lock();
        let stamp = inner.tick();
        let Some(state) = inner.keys.get_mut(&key) else {
            return;
        };

        // Lazy age purge before the snapshot.
        if let Some(max_age) = state.max_age_secs {
            let cutoff = now - max_age;
            state.entries.retain(|e| e.timestamp >= cutoff);
        }

        // Snapshot prior values, newest first, before appending.
        if !state.entries.is_empty() {
            let history: Vec<JsonValue> = state
                .entries
                .iter()
                .rev()
                .map(|e| json!({"value": e.value, "timestamp": e.timestamp}))
                .collect();
            envelope.insert("history".to_owned(), JsonValue::Array(history));
        }

        state.entries.push_back(HistoryEntry {
            value: envelope.get("value").cloned().unwrap_or(JsonValue::Null),
            timestamp: now,
        });
        while state.entries.len() > state.limit {
            state.entries.pop_front();
        }
        state.touched = stamp;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_excess_keys(&mut self) {
        while self.keys.len() > MAX_KEYS {
            let Some(oldest) = self
                .keys
                .iter()
                .min_by_key(|(_, s)| s.touched)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            self.keys.remove(&oldest);
        }
    }
}
