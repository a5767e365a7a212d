// ── The bridge's own beans ──
//
// The bridge manages itself over the protocol it serves: a config bean
// for runtime knobs and registry rescans, a history bean, a debug bean
// and a read-only server-handle bean. All live in the `spyglass`
// domain, carry the configured qualifier, and are registered on the
// platform registry so shutdown can take them off symmetrically.

use std::sync::Arc;

use spyglass_bus::{
    no_such_attribute, no_such_operation, AttributeInfo, BeanInfo, BusType, BusValue, ManagedBean,
    ObjectName, OperationInfo, ParamInfo, RegistryError,
};

use crate::backend::registries::RegistrySetHandler;
use crate::config::BridgeConfig;
use crate::converter::deserialize_value;
use crate::debug::DebugStore;
use crate::detector::ServerHandle;
use crate::error::ProtocolError;
use crate::history::{HistoryKey, HistoryStore};

/// Build a bridge bean name, with the configured qualifier when set.
pub fn bridge_bean_name(kind: &str, qualifier: Option<&str>) -> ObjectName {
    let raw = match qualifier {
        Some(q) => format!("spyglass:type={kind},qualifier={q}"),
        None => format!("spyglass:type={kind}"),
    };
    ObjectName::parse(&raw).expect("static bridge bean name")
}

/// Register the config, history, debug and server-handle beans.
pub fn register_bridge_beans(
    registry_set: &Arc<RegistrySetHandler>,
    config: &Arc<BridgeConfig>,
    history: &Arc<HistoryStore>,
    debug_store: &Arc<DebugStore>,
    server_handle: &Arc<ServerHandle>,
) -> Result<(), ProtocolError> {
    let qualifier = config.mbean_qualifier.as_deref();
    registry_set.register_own_bean(
        bridge_bean_name("Config", qualifier),
        Arc::new(ConfigBean {
            config: Arc::clone(config),
            history: Arc::clone(history),
            debug_store: Arc::clone(debug_store),
            registry_set: Arc::clone(registry_set),
        }),
    )?;
    registry_set.register_own_bean(
        bridge_bean_name("History", qualifier),
        Arc::new(HistoryBean {
            history: Arc::clone(history),
        }),
    )?;
    registry_set.register_own_bean(
        bridge_bean_name("Debug", qualifier),
        Arc::new(DebugBean {
            debug_store: Arc::clone(debug_store),
        }),
    )?;
    registry_set.register_own_bean(
        bridge_bean_name("ServerHandle", qualifier),
        Arc::new(ServerHandleBean {
            server_handle: Arc::clone(server_handle),
        }),
    )?;
    Ok(())
}

// ── Argument coercion helpers ───────────────────────────────────────

fn arg_text(args: &[BusValue], index: usize, what: &str) -> Result<String, RegistryError> {
    match args.get(index) {
        Some(BusValue::Text(s)) => Ok(s.clone()),
        Some(other) => Err(RegistryError::InvalidValue {
            reason: format!("{what} must be a string, got {}", other.shape()),
        }),
        None => Err(RegistryError::InvalidValue {
            reason: format!("missing argument {what}"),
        }),
    }
}

fn arg_text_opt(args: &[BusValue], index: usize) -> Option<String> {
    match args.get(index) {
        Some(BusValue::Text(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn arg_int(args: &[BusValue], index: usize, what: &str) -> Result<i64, RegistryError> {
    match args.get(index) {
        Some(BusValue::Int(i)) => Ok(*i),
        Some(BusValue::Text(s)) => s.parse().map_err(|_| RegistryError::InvalidValue {
            reason: format!("{what} must be a number, got '{s}'"),
        }),
        Some(other) => Err(RegistryError::InvalidValue {
            reason: format!("{what} must be a number, got {}", other.shape()),
        }),
        None => Err(RegistryError::InvalidValue {
            reason: format!("missing argument {what}"),
        }),
    }
}

fn parse_bean_name(raw: &str) -> Result<ObjectName, RegistryError> {
    ObjectName::parse(raw)
}

// ── Config bean ─────────────────────────────────────────────────────

struct ConfigBean {
    config: Arc<BridgeConfig>,
    history: Arc<HistoryStore>,
    debug_store: Arc<DebugStore>,
    registry_set: Arc<RegistrySetHandler>,
}

impl ManagedBean for ConfigBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("BridgeConfig", "Runtime knobs of the spyglass bridge")
            .with_attributes(vec![
                AttributeInfo::writable("Debug", BusType::Bool, "debug flag"),
                AttributeInfo::writable(
                    "HistoryMaxEntries",
                    BusType::Int,
                    "cap on per-key history limits",
                ),
                AttributeInfo::writable("DebugMaxEntries", BusType::Int, "debug ring size"),
                AttributeInfo::readonly("AgentId", BusType::Text, "agent identifier"),
                AttributeInfo::readonly("AgentDescription", BusType::Text, "agent description"),
            ])
            .with_operations(vec![OperationInfo::new(
                "rescan",
                vec![],
                BusType::Any,
                "re-discover bean registries and swap the snapshot",
            )])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "Debug" => Ok(BusValue::Bool(self.debug_store.is_debug())),
            "HistoryMaxEntries" => Ok(BusValue::Int(self.history.global_limit() as i64)),
            "DebugMaxEntries" => Ok(BusValue::Int(self.debug_store.max_entries() as i64)),
            "AgentId" => Ok(self
                .config
                .agent_id
                .as_deref()
                .map(BusValue::from)
                .unwrap_or(BusValue::Null)),
            "AgentDescription" => Ok(self
                .config
                .agent_description
                .as_deref()
                .map(BusValue::from)
                .unwrap_or(BusValue::Null)),
            other => Err(no_such_attribute("BridgeConfig", other)),
        }
    }

    fn write(&self, attribute: &str, value: BusValue) -> Result<BusValue, RegistryError> {
        match attribute {
            "Debug" => {
                let previous = BusValue::Bool(self.debug_store.is_debug());
                match value {
                    BusValue::Bool(on) => self.debug_store.set_debug(on),
                    other => {
                        return Err(RegistryError::InvalidValue {
                            reason: format!("Debug must be a bool, got {}", other.shape()),
                        })
                    }
                }
                Ok(previous)
            }
            "HistoryMaxEntries" => {
                let previous = BusValue::Int(self.history.global_limit() as i64);
                let limit = match value {
                    BusValue::Int(i) if i >= 0 => i as usize,
                    other => {
                        return Err(RegistryError::InvalidValue {
                            reason: format!("HistoryMaxEntries must be a non-negative int, got {other:?}"),
                        })
                    }
                };
                self.history.set_global_limit(limit);
                Ok(previous)
            }
            "DebugMaxEntries" => {
                let previous = BusValue::Int(self.debug_store.max_entries() as i64);
                let max = match value {
                    BusValue::Int(i) if i >= 0 => i as usize,
                    other => {
                        return Err(RegistryError::InvalidValue {
                            reason: format!("DebugMaxEntries must be a non-negative int, got {other:?}"),
                        })
                    }
                };
                self.debug_store.set_max_entries(max);
                Ok(previous)
            }
            "AgentId" | "AgentDescription" => Err(RegistryError::NotWritable {
                name: "BridgeConfig".to_owned(),
                attribute: attribute.to_owned(),
            }),
            other => Err(no_such_attribute("BridgeConfig", other)),
        }
    }

    fn invoke(&self, operation: &str, _args: Vec<BusValue>) -> Result<BusValue, RegistryError> {
        match operation {
            "rescan" => {
                self.registry_set.rescan();
                Ok(BusValue::Null)
            }
            other => Err(no_such_operation("BridgeConfig", other)),
        }
    }
}

// ── History bean ────────────────────────────────────────────────────

struct HistoryBean {
    history: Arc<HistoryStore>,
}

impl ManagedBean for HistoryBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("BridgeHistory", "History store of the spyglass bridge")
            .with_attributes(vec![
                AttributeInfo::writable("MaxEntries", BusType::Int, "cap on per-key limits"),
                AttributeInfo::readonly("KeyCount", BusType::Int, "tracked keys"),
            ])
            .with_operations(vec![
                OperationInfo::new(
                    "setHistoryEntriesForAttribute",
                    vec![
                        ParamInfo::new("mbean", BusType::Text),
                        ParamInfo::new("attribute", BusType::Text),
                        ParamInfo::new("path", BusType::Text),
                        ParamInfo::new("target", BusType::Text),
                        ParamInfo::new("maxEntries", BusType::Int),
                    ],
                    BusType::Any,
                    "switch history tracking on for an attribute",
                ),
                OperationInfo::new(
                    "setHistoryLimitForAttribute",
                    vec![
                        ParamInfo::new("mbean", BusType::Text),
                        ParamInfo::new("attribute", BusType::Text),
                        ParamInfo::new("path", BusType::Text),
                        ParamInfo::new("target", BusType::Text),
                        ParamInfo::new("maxEntries", BusType::Int),
                        ParamInfo::new("maxAgeSeconds", BusType::Int),
                    ],
                    BusType::Any,
                    "history tracking with a time bound",
                ),
                OperationInfo::new(
                    "setHistoryEntriesForOperation",
                    vec![
                        ParamInfo::new("mbean", BusType::Text),
                        ParamInfo::new("operation", BusType::Text),
                        ParamInfo::new("target", BusType::Text),
                        ParamInfo::new("maxEntries", BusType::Int),
                    ],
                    BusType::Any,
                    "switch history tracking on for an operation",
                ),
                OperationInfo::new(
                    "resetHistoryEntries",
                    vec![],
                    BusType::Any,
                    "drop all recorded values",
                ),
            ])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "MaxEntries" => Ok(BusValue::Int(self.history.global_limit() as i64)),
            "KeyCount" => Ok(BusValue::Int(self.history.key_count() as i64)),
            other => Err(no_such_attribute("BridgeHistory", other)),
        }
    }

    fn write(&self, attribute: &str, value: BusValue) -> Result<BusValue, RegistryError> {
        match attribute {
            "MaxEntries" => {
                let previous = BusValue::Int(self.history.global_limit() as i64);
                match value {
                    BusValue::Int(i) if i >= 0 => self.history.set_global_limit(i as usize),
                    other => {
                        return Err(RegistryError::InvalidValue {
                            reason: format!("MaxEntries must be a non-negative int, got {other:?}"),
                        })
                    }
                }
                Ok(previous)
            }
            "KeyCount" => Err(RegistryError::NotWritable {
                name: "BridgeHistory".to_owned(),
                attribute: attribute.to_owned(),
            }),
            other => Err(no_such_attribute("BridgeHistory", other)),
        }
    }

    fn invoke(&self, operation: &str, args: Vec<BusValue>) -> Result<BusValue, RegistryError> {
        match operation {
            "setHistoryEntriesForAttribute" | "setHistoryLimitForAttribute" => {
                let name = parse_bean_name(&arg_text(&args, 0, "mbean")?)?;
                let attribute = arg_text(&args, 1, "attribute")?;
                let path = arg_text_opt(&args, 2);
                let target = arg_text_opt(&args, 3);
                let limit = arg_int(&args, 4, "maxEntries")?;
                let max_age = if operation == "setHistoryLimitForAttribute" {
                    Some(arg_int(&args, 5, "maxAgeSeconds")?)
                } else {
                    None
                };
                self.history.set_limit(
                    HistoryKey::for_attribute(
                        &name,
                        &attribute,
                        path.as_deref(),
                        target.as_deref(),
                    ),
                    limit.max(0) as usize,
                    max_age,
                );
                Ok(BusValue::Null)
            }
            "setHistoryEntriesForOperation" => {
                let name = parse_bean_name(&arg_text(&args, 0, "mbean")?)?;
                let op = arg_text(&args, 1, "operation")?;
                let target = arg_text_opt(&args, 2);
                let limit = arg_int(&args, 3, "maxEntries")?;
                self.history.set_limit(
                    HistoryKey::for_operation(&name, &op, target.as_deref()),
                    limit.max(0) as usize,
                    None,
                );
                Ok(BusValue::Null)
            }
            "resetHistoryEntries" => {
                self.history.reset();
                Ok(BusValue::Null)
            }
            other => Err(no_such_operation("BridgeHistory", other)),
        }
    }
}

// ── Debug bean ──────────────────────────────────────────────────────

struct DebugBean {
    debug_store: Arc<DebugStore>,
}

impl ManagedBean for DebugBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("BridgeDebug", "Debug ring of the spyglass bridge")
            .with_attributes(vec![
                AttributeInfo::writable("Debug", BusType::Bool, "debug flag"),
                AttributeInfo::writable("MaxEntries", BusType::Int, "ring size"),
            ])
            .with_operations(vec![
                OperationInfo::new("debugInfo", vec![], BusType::Any, "dump the ring"),
                OperationInfo::new("resetDebugInfo", vec![], BusType::Any, "clear the ring"),
            ])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "Debug" => Ok(BusValue::Bool(self.debug_store.is_debug())),
            "MaxEntries" => Ok(BusValue::Int(self.debug_store.max_entries() as i64)),
            other => Err(no_such_attribute("BridgeDebug", other)),
        }
    }

    fn write(&self, attribute: &str, value: BusValue) -> Result<BusValue, RegistryError> {
        match attribute {
            "Debug" => {
                let previous = BusValue::Bool(self.debug_store.is_debug());
                match value {
                    BusValue::Bool(on) => self.debug_store.set_debug(on),
                    other => {
                        return Err(RegistryError::InvalidValue {
                            reason: format!("Debug must be a bool, got {}", other.shape()),
                        })
                    }
                }
                Ok(previous)
            }
            "MaxEntries" => {
                let previous = BusValue::Int(self.debug_store.max_entries() as i64);
                match value {
                    BusValue::Int(i) if i >= 0 => self.debug_store.set_max_entries(i as usize),
                    other => {
                        return Err(RegistryError::InvalidValue {
                            reason: format!("MaxEntries must be a non-negative int, got {other:?}"),
                        })
                    }
                }
                Ok(previous)
            }
            other => Err(no_such_attribute("BridgeDebug", other)),
        }
    }

    fn invoke(&self, operation: &str, _args: Vec<BusValue>) -> Result<BusValue, RegistryError> {
        match operation {
            "debugInfo" => {
                let dump = self.debug_store.dump_json();
                deserialize_value(&BusType::Any, &dump).map_err(|e| RegistryError::Io(e.to_string()))
            }
            "resetDebugInfo" => {
                self.debug_store.reset();
                Ok(BusValue::Null)
            }
            other => Err(no_such_operation("BridgeDebug", other)),
        }
    }
}

// ── Server-handle bean ──────────────────────────────────────────────

struct ServerHandleBean {
    server_handle: Arc<ServerHandle>,
}

impl ManagedBean for ServerHandleBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("BridgeServerHandle", "Detected host product").with_attributes(vec![
            AttributeInfo::readonly("Vendor", BusType::Text, ""),
            AttributeInfo::readonly("Product", BusType::Text, ""),
            AttributeInfo::readonly("Version", BusType::Text, ""),
            AttributeInfo::readonly("AgentUrl", BusType::Text, ""),
        ])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "Vendor" => Ok(BusValue::from(self.server_handle.vendor.as_str())),
            "Product" => Ok(BusValue::from(self.server_handle.product.as_str())),
            "Version" => Ok(BusValue::from(self.server_handle.version.as_str())),
            "AgentUrl" => Ok(self
                .server_handle
                .agent_url
                .as_ref()
                .map(|u| BusValue::from(u.as_str()))
                .unwrap_or(BusValue::Null)),
            other => Err(no_such_attribute("BridgeServerHandle", other)),
        }
    }
}
