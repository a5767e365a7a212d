// ── Debug store ──
//
// A bounded ring of recent log lines, kept only while the debug flag
// is on. Operators dump and reset it through the debug bean, so a
// misbehaving deployment can be inspected over the same protocol it
// serves.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Clone)]
pub struct DebugEntry {
    pub timestamp: i64,
    pub level: &'static str,
    pub message: String,
    pub detail: Option<String>,
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<DebugEntry>,
    max_entries: usize,
}

/// Bounded ring of recent debug/error lines.
#[derive(Debug)]
pub struct DebugStore {
    ring: Mutex<Ring>,
    debug: AtomicBool,
}

impl DebugStore {
    pub fn new(max_entries: usize, debug: bool) -> Self {
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::new(),
                max_entries,
            }),
            debug: AtomicBool::new(debug),
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, on: bool) {
        self.debug.store(on, Ordering::Relaxed);
    }

    pub fn max_entries(&self) -> usize {
        self.lock().max_entries
    }

    pub fn set_max_entries(&self, max: usize) {
        let mut ring = self.lock();
        ring.max_entries = max;
        while ring.entries.len() > max {
            ring.entries.pop_front();
        }
    }

    /// Record a line when debugging is on; silently dropped otherwise.
    pub fn log(&self, level: &'static str, message: impl Into<String>, detail: Option<String>) {
        if !self.is_debug() {
            return;
        }
        let mut ring = self.lock();
        if ring.max_entries == 0 {
            return;
        }
        if ring.entries.len() >= ring.max_entries {
            ring.entries.pop_front();
        }
        ring.entries.push_back(DebugEntry {
            timestamp: Utc::now().timestamp(),
            level,
            message: message.into(),
            detail,
        });
    }

    /// Snapshot of all recorded entries, oldest first.
    pub fn dump(&self) -> Vec<DebugEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// JSON form of the dump, for the debug bean.
    pub fn dump_json(&self) -> JsonValue {
        JsonValue::Array(
            self.dump()
                .into_iter()
                .map(|e| {
                    let mut obj = serde_json::Map::new();
                    obj.insert("timestamp".to_owned(), json!(e.timestamp));
                    obj.insert("level".to_owned(), json!(e.level));
                    obj.insert("message".to_owned(), json!(e.message));
                    if let Some(detail) = e.detail {
                        obj.insert("detail".to_owned(), json!(detail));
                    }
                    JsonValue::Object(obj)
                })
                .collect(),
        )
    }

    pub fn reset(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_by_default_records_nothing() {
        let store = DebugStore::new(10, false);
        store.log("debug", "dropped", None);
        assert!(store.dump().is_empty());
    }

    #[test]
    fn ring_bound_drops_oldest() {
        let store = DebugStore::new(3, true);
        for i in 0..5 {
            store.log("debug", format!("line {i}"), None);
        }
        let dump = store.dump();
        assert_eq!(dump.len(), 3);
        assert_eq!(dump[0].message, "line 2");
        assert_eq!(dump[2].message, "line 4");
    }

    #[test]
    fn shrinking_max_discards_oldest() {
        let store = DebugStore::new(10, true);
        for i in 0..6 {
            store.log("debug", format!("line {i}"), None);
        }
        store.set_max_entries(2);
        let dump = store.dump();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump[0].message, "line 4");
    }

    #[test]
    fn reset_and_toggle() {
        let store = DebugStore::new(10, true);
        store.log("error", "boom", Some("details".to_owned()));
        assert_eq!(store.dump().len(), 1);
        store.reset();
        assert!(store.dump().is_empty());

        store.set_debug(false);
        store.log("debug", "dropped", None);
        assert!(store.dump().is_empty());
    }
}
