// ── Notification handler ──
//
// Pull-mode lifecycle over the bus notification hubs: clients register
// for an id, attach listeners (per object name, optional kind filter),
// keep themselves alive with pings and drain queued notifications with
// pull. Stale clients are pruned on access; their hub subscriptions go
// with them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

use spyglass_bus::{BeanRegistry, BusValue, ListenerId, Notification, ObjectName};

use crate::converter::{serialize_value, SerializeLimits};
use crate::error::ProtocolError;
use crate::handler::{HandlerOutcome, VerbHandler};
use crate::request::{NotificationCommand, Request, RequestKind, ValueFaultPolicy, Verb};

/// Clients that have not pinged for this long are dropped.
const CLIENT_TTL_SECS: i64 = 300;

struct ListenerReg {
    name: ObjectName,
    kinds: Option<Vec<String>>,
    /// One hub subscription per registry in the merged set.
    subscriptions: Vec<(Arc<BeanRegistry>, ListenerId)>,
}

struct ClientState {
    last_ping: i64,
    listeners: HashMap<Uuid, ListenerReg>,
}

impl ClientState {
    fn drop_subscriptions(&mut self) {
        for listener in self.listeners.values() {
            for (registry, id) in &listener.subscriptions {
                registry.hub().unsubscribe(id);
            }
        }
        self.listeners.clear();
    }
}

pub struct NotificationHandler {
    clients: Mutex<HashMap<Uuid, ClientState>>,
}

impl NotificationHandler {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ClientState>> {
        self.clients.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn prune_stale(clients: &mut HashMap<Uuid, ClientState>, now: i64) {
        clients.retain(|_, state| {
            let alive = now - state.last_ping <= CLIENT_TTL_SECS;
            if !alive {
                state.drop_subscriptions();
            }
            alive
        });
    }

    fn client_not_found(client: &Uuid) -> ProtocolError {
        ProtocolError::NotFound {
            kind: "ClientNotFound",
            message: format!("no notification client {client}"),
        }
    }

    fn render(notification: &Notification) -> JsonValue {
        let mut obj = JsonMap::new();
        obj.insert("type".to_owned(), json!(notification.kind));
        obj.insert("message".to_owned(), json!(notification.message));
        obj.insert("timestamp".to_owned(), json!(notification.timestamp));
        obj.insert("sequence".to_owned(), json!(notification.sequence));
        if notification.payload != BusValue::Null {
            let payload = serialize_value(
                &notification.payload,
                &[],
                &SerializeLimits::default(),
                &ValueFaultPolicy::Ignore,
            )
            .unwrap_or(JsonValue::Null);
            obj.insert("payload".to_owned(), payload);
        }
        JsonValue::Object(obj)
    }
}

impl Default for NotificationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl VerbHandler for NotificationHandler {
    fn verb(&self) -> Verb {
        Verb::Notification
    }

    fn handle_all_at_once(&self, _request: &Request) -> bool {
        true
    }

    fn handle_merged(
        &self,
        registries: &[Arc<BeanRegistry>],
        request: &Request,
    ) -> Result<HandlerOutcome, ProtocolError> {
        let RequestKind::Notification(command) = &request.kind else {
            return Err(ProtocolError::Internal(
                "notification handler got a different verb".into(),
            ));
        };

        let now = Utc::now().timestamp();
        let mut clients = self.lock();
        Self::prune_stale(&mut clients, now);

        let value = match command {
            NotificationCommand::Register => {
                let id = Uuid::new_v4();
                clients.insert(
                    id,
                    ClientState {
                        last_ping: now,
                        listeners: HashMap::new(),
                    },
                );
                json!({"id": id.to_string()})
            }

            NotificationCommand::Unregister { client } => {
                let mut state = clients
                    .remove(client)
                    .ok_or_else(|| Self::client_not_found(client))?;
                state.drop_subscriptions();
                JsonValue::Null
            }

            NotificationCommand::Add {
                client,
                name,
                kinds,
            } => {
                let state = clients
                    .get_mut(client)
                    .ok_or_else(|| Self::client_not_found(client))?;
                state.last_ping = now;

                let subscriptions = registries
                    .iter()
                    .map(|registry| {
                        let id = registry.hub().subscribe(name.clone(), kinds.clone());
                        (Arc::clone(registry), id)
                    })
                    .collect();
                let listener = Uuid::new_v4();
                state.listeners.insert(
                    listener,
                    ListenerReg {
                        name: name.clone(),
                        kinds: kinds.clone(),
                        subscriptions,
                    },
                );
                json!({"listener": listener.to_string()})
            }

            NotificationCommand::Remove { client, listener } => {
                let state = clients
                    .get_mut(client)
                    .ok_or_else(|| Self::client_not_found(client))?;
                state.last_ping = now;
                let removed = state.listeners.remove(listener).ok_or_else(|| {
                    ProtocolError::NotFound {
                        kind: "ListenerNotFound",
                        message: format!("no listener {listener} for client {client}"),
                    }
                })?;
                for (registry, id) in &removed.subscriptions {
                    registry.hub().unsubscribe(id);
                }
                JsonValue::Null
            }

            NotificationCommand::Ping { client } => {
                let state = clients
                    .get_mut(client)
                    .ok_or_else(|| Self::client_not_found(client))?;
                state.last_ping = now;
                JsonValue::Null
            }

            NotificationCommand::List { client } => {
                let state = clients
                    .get(client)
                    .ok_or_else(|| Self::client_not_found(client))?;
                let mut listeners = JsonMap::new();
                for (id, reg) in &state.listeners {
                    let mut entry = JsonMap::new();
                    entry.insert("mbean".to_owned(), json!(reg.name.to_string()));
                    if let Some(kinds) = &reg.kinds {
                        entry.insert("filter".to_owned(), json!(kinds));
                    }
                    listeners.insert(id.to_string(), JsonValue::Object(entry));
                }
                JsonValue::Object(listeners)
            }

            NotificationCommand::Pull { client } => {
                let state = clients
                    .get_mut(client)
                    .ok_or_else(|| Self::client_not_found(client))?;
                state.last_ping = now;

                let mut out = JsonMap::new();
                for (id, reg) in &state.listeners {
                    let mut drained: Vec<Notification> = Vec::new();
                    for (registry, sub) in &reg.subscriptions {
                        if let Some(batch) = registry.hub().drain(sub) {
                            drained.extend(batch);
                        }
                    }
                    drained.sort_by_key(|n| (n.timestamp, n.sequence));
                    out.insert(
                        id.to_string(),
                        JsonValue::Array(drained.iter().map(Self::render).collect()),
                    );
                }
                JsonValue::Object(out)
            }
        };

        Ok(HandlerOutcome::Ready(value))
    }
}
