// ── Notification hub ──
//
// Pull-mode notification fan-out. Beans publish through their
// registry; listeners hold bounded FIFO queues that protocol clients
// drain explicitly. There is no push channel: delivery to remote
// clients is the transport's business, the hub only buffers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::name::ObjectName;
use crate::value::BusValue;

/// Per-listener queue bound. Oldest entries are dropped first.
const MAX_QUEUED: usize = 256;

/// One emitted notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: String,
    pub message: String,
    pub payload: BusValue,
    /// Epoch seconds at emission.
    pub timestamp: i64,
    /// Hub-wide monotonic sequence number.
    pub sequence: u64,
}

impl Notification {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, payload: BusValue) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            payload,
            timestamp: Utc::now().timestamp(),
            sequence: 0,
        }
    }
}

/// Identifier of one listener registration.
pub type ListenerId = Uuid;

struct Listener {
    /// Source filter; may be a pattern.
    source: ObjectName,
    /// Kind filter; `None` accepts all kinds.
    kinds: Option<Vec<String>>,
    queue: Mutex<VecDeque<Notification>>,
    /// Number of notifications dropped to the queue bound.
    dropped: AtomicU64,
}

/// Registry-local notification buffer.
pub struct NotificationHub {
    listeners: DashMap<ListenerId, Listener>,
    sequence: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Add a listener for the given source (pattern allowed) and
    /// optional kind filter. Returns the registration id.
    pub fn subscribe(&self, source: ObjectName, kinds: Option<Vec<String>>) -> ListenerId {
        let id = Uuid::new_v4();
        self.listeners.insert(
            id,
            Listener {
                source,
                kinds,
                queue: Mutex::new(VecDeque::new()),
                dropped: AtomicU64::new(0),
            },
        );
        id
    }

    /// Remove a listener. Returns `false` if the id was unknown.
    pub fn unsubscribe(&self, id: &ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    /// Fan a notification out to every matching listener queue.
    pub fn publish(&self, source: &ObjectName, notification: Notification) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        for entry in self.listeners.iter() {
            let listener = entry.value();
            let source_matches = if listener.source.is_pattern() {
                listener.source.matches(source)
            } else {
                &listener.source == source
            };
            if !source_matches {
                continue;
            }
            if let Some(kinds) = &listener.kinds {
                if !kinds.iter().any(|k| *k == notification.kind) {
                    continue;
                }
            }
            let mut queue = listener.queue.lock().unwrap_or_else(|p| p.into_inner());
            if queue.len() >= MAX_QUEUED {
                queue.pop_front();
                listener.dropped.fetch_add(1, Ordering::Relaxed);
            }
            let mut queued = notification.clone();
            queued.sequence = sequence;
            queue.push_back(queued);
        }
    }

    /// Drain all queued notifications for a listener, oldest first.
    /// Returns `None` for an unknown listener id.
    pub fn drain(&self, id: &ListenerId) -> Option<Vec<Notification>> {
        let entry = self.listeners.get(id)?;
        let mut queue = entry.queue.lock().unwrap_or_else(|p| p.into_inner());
        Some(queue.drain(..).collect())
    }

    /// Total notifications a listener lost to its queue bound.
    pub fn dropped(&self, id: &ListenerId) -> Option<u64> {
        self.listeners
            .get(id)
            .map(|l| l.dropped.load(Ordering::Relaxed))
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    fn note(kind: &str) -> Notification {
        Notification::new(kind, "something happened", BusValue::Null)
    }

    #[test]
    fn publish_reaches_matching_listeners_only() {
        let hub = NotificationHub::new();
        let wide = hub.subscribe(name("app:*"), None);
        let narrow = hub.subscribe(name("app:type=Worker"), Some(vec!["fault".to_owned()]));
        let other = hub.subscribe(name("db:type=Pool"), None);

        hub.publish(&name("app:type=Worker"), note("fault"));
        hub.publish(&name("app:type=Worker"), note("progress"));

        assert_eq!(hub.drain(&wide).unwrap().len(), 2);
        assert_eq!(hub.drain(&narrow).unwrap().len(), 1);
        assert!(hub.drain(&other).unwrap().is_empty());
    }

    #[test]
    fn drain_empties_the_queue() {
        let hub = NotificationHub::new();
        let id = hub.subscribe(name("app:type=Worker"), None);
        hub.publish(&name("app:type=Worker"), note("tick"));
        assert_eq!(hub.drain(&id).unwrap().len(), 1);
        assert!(hub.drain(&id).unwrap().is_empty());
    }

    #[test]
    fn queue_bound_drops_oldest() {
        let hub = NotificationHub::new();
        let id = hub.subscribe(name("app:type=Worker"), None);
        for i in 0..(MAX_QUEUED + 5) {
            hub.publish(&name("app:type=Worker"), note(&format!("k{i}")));
        }
        let drained = hub.drain(&id).unwrap();
        assert_eq!(drained.len(), MAX_QUEUED);
        assert_eq!(drained[0].kind, "k5");
        assert_eq!(hub.dropped(&id), Some(5));
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let hub = NotificationHub::new();
        let id = hub.subscribe(name("app:type=Worker"), None);
        hub.publish(&name("app:type=Worker"), note("a"));
        hub.publish(&name("app:type=Worker"), note("b"));
        let drained = hub.drain(&id).unwrap();
        assert!(drained[0].sequence < drained[1].sequence);
    }

    #[test]
    fn unknown_listener_yields_none() {
        let hub = NotificationHub::new();
        assert!(hub.drain(&Uuid::new_v4()).is_none());
        assert!(!hub.unsubscribe(&Uuid::new_v4()));
    }
}
