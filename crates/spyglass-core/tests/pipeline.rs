// End-to-end pipeline tests: registry + backend + facade, no sockets.
//
// The bean names mirror the JVM-flavored examples from the protocol
// documentation so the wire shapes here double as compatibility
// fixtures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};

use spyglass_bus::{
    no_such_attribute, no_such_operation, AttributeInfo, BeanInfo, BeanRegistry, BusType, BusValue,
    CompositeSchema, ManagedBean, Notification, ObjectName, OperationInfo, ParamInfo,
    RegistryError,
};
use spyglass_core::backend::registries::RegistrySetHandler;
use spyglass_core::config::BridgeConfig;
use spyglass_core::restrictor::{PolicyRestrictor, Restrictor};
use spyglass_core::{BackendManager, HttpRequestHandler};

// ── Fixture beans ───────────────────────────────────────────────────

fn usage_schema() -> CompositeSchema {
    CompositeSchema {
        type_name: "MemoryUsage".to_owned(),
        fields: vec![
            ("init".to_owned(), BusType::Int),
            ("used".to_owned(), BusType::Int),
            ("committed".to_owned(), BusType::Int),
            ("max".to_owned(), BusType::Int),
        ],
    }
}

fn usage_value(used: i64) -> BusValue {
    let mut fields = IndexMap::new();
    fields.insert("init".to_owned(), BusValue::Int(268_435_456));
    fields.insert("used".to_owned(), BusValue::Int(used));
    fields.insert("committed".to_owned(), BusValue::Int(536_870_912));
    fields.insert("max".to_owned(), BusValue::Int(4_294_967_296));
    BusValue::composite("MemoryUsage", fields)
}

struct MemoryBean {
    used: AtomicI64,
}

impl MemoryBean {
    fn new() -> Self {
        Self {
            used: AtomicI64::new(123_456_789),
        }
    }
}

impl ManagedBean for MemoryBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("Memory", "memory subsystem")
            .with_attributes(vec![AttributeInfo::readonly(
                "HeapMemoryUsage",
                BusType::Composite(usage_schema()),
                "current heap usage",
            )])
            .with_operations(vec![OperationInfo::new(
                "gc",
                vec![],
                BusType::Any,
                "run a collection",
            )])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "HeapMemoryUsage" => Ok(usage_value(self.used.load(Ordering::Relaxed))),
            other => Err(no_such_attribute("Memory", other)),
        }
    }

    fn invoke(&self, operation: &str, _args: Vec<BusValue>) -> Result<BusValue, RegistryError> {
        match operation {
            "gc" => {
                self.used.fetch_sub(1000, Ordering::Relaxed);
                Ok(BusValue::Null)
            }
            other => Err(no_such_operation("Memory", other)),
        }
    }
}

struct ThreadingBean;

impl ManagedBean for ThreadingBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("Threading", "thread subsystem").with_attributes(vec![
            AttributeInfo::readonly("ThreadCount", BusType::Int, "live threads"),
        ])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "ThreadCount" => Ok(BusValue::Int(42)),
            other => Err(no_such_attribute("Threading", other)),
        }
    }
}

struct CompilationBean;

impl ManagedBean for CompilationBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("Compilation", "JIT subsystem").with_attributes(vec![
            AttributeInfo::readonly(
                "HeapMemoryUsage",
                BusType::Composite(usage_schema()),
                "compiler heap share",
            ),
        ])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "HeapMemoryUsage" => Ok(usage_value(7)),
            other => Err(no_such_attribute("Compilation", other)),
        }
    }
}

struct SettingsBean {
    limit: AtomicI64,
}

impl ManagedBean for SettingsBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("Settings", "tunable settings")
            .with_attributes(vec![AttributeInfo::writable(
                "Limit",
                BusType::Int,
                "active limit",
            )])
            .with_operations(vec![OperationInfo::new(
                "raise",
                vec![ParamInfo::new("by", BusType::Int)],
                BusType::Int,
                "raise the limit",
            )])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "Limit" => Ok(BusValue::Int(self.limit.load(Ordering::Relaxed))),
            other => Err(no_such_attribute("Settings", other)),
        }
    }

    fn write(&self, attribute: &str, value: BusValue) -> Result<BusValue, RegistryError> {
        match attribute {
            "Limit" => {
                let BusValue::Int(new) = value else {
                    return Err(RegistryError::InvalidValue {
                        reason: "Limit takes an int".to_owned(),
                    });
                };
                Ok(BusValue::Int(self.limit.swap(new, Ordering::Relaxed)))
            }
            other => Err(no_such_attribute("Settings", other)),
        }
    }

    fn invoke(&self, operation: &str, args: Vec<BusValue>) -> Result<BusValue, RegistryError> {
        match operation {
            "raise" => {
                let Some(&BusValue::Int(by)) = args.first() else {
                    return Err(RegistryError::InvalidValue {
                        reason: "raise takes an int".to_owned(),
                    });
                };
                Ok(BusValue::Int(self.limit.fetch_add(by, Ordering::Relaxed) + by))
            }
            other => Err(no_such_operation("Settings", other)),
        }
    }
}

// ── Harness ─────────────────────────────────────────────────────────

fn name(s: &str) -> ObjectName {
    ObjectName::parse(s).unwrap()
}

fn seed_registry() -> Arc<BeanRegistry> {
    let registry = Arc::new(BeanRegistry::new("test"));
    registry
        .register(name("java.lang:type=Memory"), Arc::new(MemoryBean::new()))
        .unwrap();
    registry
        .register(name("java.lang:type=Threading"), Arc::new(ThreadingBean))
        .unwrap();
    registry
        .register(name("java.lang:type=Compilation"), Arc::new(CompilationBean))
        .unwrap();
    registry
        .register(
            name("test:type=Settings"),
            Arc::new(SettingsBean {
                limit: AtomicI64::new(100),
            }),
        )
        .unwrap();
    registry
}

fn harness_with(
    restrictor: Option<Arc<dyn Restrictor>>,
    config: BridgeConfig,
) -> (HttpRequestHandler, Arc<BeanRegistry>) {
    let registry = seed_registry();
    let discovered = Arc::clone(&registry);
    let registry_set =
        RegistrySetHandler::with_discovery(Box::new(move || vec![Arc::clone(&discovered)]));
    let backend = BackendManager::with_parts(config, restrictor, Arc::new(registry_set)).unwrap();
    (HttpRequestHandler::new(Arc::new(backend)), registry)
}

fn harness() -> (HttpRequestHandler, Arc<BeanRegistry>) {
    harness_with(None, BridgeConfig::default())
}

fn get(handler: &HttpRequestHandler, path: &str) -> JsonValue {
    handler.handle_get(path, &HashMap::new())
}

fn get_with(handler: &HttpRequestHandler, path: &str, params: &[(&str, &str)]) -> JsonValue {
    let params = params
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    handler.handle_get(path, &params)
}

fn post(handler: &HttpRequestHandler, body: JsonValue) -> JsonValue {
    handler.handle_post(body.to_string().as_bytes(), None, &HashMap::new())
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn s1_read_full_attribute() {
    let (handler, _) = harness();
    let resp = get(&handler, "/read/java.lang:type=Memory/HeapMemoryUsage");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"]["used"], json!(123_456_789));
    assert!(resp["value"]["init"].is_i64());
    assert!(resp["value"]["committed"].is_i64());
    assert!(resp["value"]["max"].is_i64());
    assert_eq!(resp["request"]["type"], "read");
    assert_eq!(resp["request"]["mbean"], "java.lang:type=Memory");
    assert!(resp["timestamp"].is_i64());
}

#[test]
fn s2_read_with_inner_path() {
    let (handler, _) = harness();
    let resp = get(&handler, "/read/java.lang:type=Memory/HeapMemoryUsage/used");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"], json!(123_456_789));
    assert_eq!(resp["request"]["path"], "used");
}

#[test]
fn s3_bulk_post_preserves_order() {
    let (handler, _) = harness();
    let resp = post(
        &handler,
        json!([
            {"type": "version"},
            {"type": "read", "mbean": "java.lang:type=Threading", "attribute": "ThreadCount"},
        ]),
    );
    let list = resp.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["status"], 200);
    assert!(list[0]["value"]["protocol"].is_string());
    assert!(list[0]["value"]["agent"].is_string());
    assert_eq!(list[1]["status"], 200);
    assert_eq!(list[1]["value"], json!(42));
}

#[test]
fn s4_missing_bean_is_404_instance_not_found() {
    let (handler, _) = harness();
    let resp = get(&handler, "/read/java.lang:name=bogus/Anything");
    assert_eq!(resp["status"], 404);
    assert_eq!(resp["error_type"], "InstanceNotFound");
    assert!(resp["error"].as_str().unwrap().contains("bogus"));
}

#[test]
fn s5_pattern_read_elides_denied_beans() {
    let policy = PolicyRestrictor::from_toml(
        r#"
        [[deny]]
        name = "java.lang:type=Compilation"
        "#,
    )
    .unwrap();
    let (handler, _) = harness_with(Some(Arc::new(policy)), BridgeConfig::default());

    let resp = get(&handler, "/read/java.lang:type=*/HeapMemoryUsage");
    assert_eq!(resp["status"], 200);
    let value = resp["value"].as_object().unwrap();
    assert!(value.contains_key("java.lang:type=Memory"));
    assert!(!value.contains_key("java.lang:type=Compilation"));
    // Threading has no HeapMemoryUsage attribute: elided, not errored.
    assert!(!value.contains_key("java.lang:type=Threading"));
    assert_eq!(
        value["java.lang:type=Memory"]["HeapMemoryUsage"]["used"],
        json!(123_456_789)
    );
}

#[test]
fn s6_history_attaches_prior_values() {
    let (handler, _) = harness();

    // Switch tracking on over the protocol itself.
    let resp = post(
        &handler,
        json!({
            "type": "exec",
            "mbean": "spyglass:type=History",
            "operation": "setHistoryEntriesForAttribute",
            "arguments": ["java.lang:type=Memory", "HeapMemoryUsage", null, null, 5],
        }),
    );
    assert_eq!(resp["status"], 200);

    let first = get(&handler, "/read/java.lang:type=Memory/HeapMemoryUsage");
    assert_eq!(first["status"], 200);
    assert!(first.get("history").is_none());

    let second = get(&handler, "/read/java.lang:type=Memory/HeapMemoryUsage");
    let history = second["history"].as_array().unwrap();
    assert!(!history.is_empty());
    assert_eq!(history[0]["value"], first["value"]);
    assert!(history[0]["timestamp"].is_i64());
}

// ── Properties ──────────────────────────────────────────────────────

#[test]
fn restrictor_denial_is_403_without_stacktrace() {
    let policy = PolicyRestrictor::from_toml(r#"verbs = ["read", "list", "version"]"#).unwrap();
    let (handler, _) = harness_with(Some(Arc::new(policy)), BridgeConfig::default());

    let resp = post(
        &handler,
        json!({"type": "exec", "mbean": "java.lang:type=Memory", "operation": "gc"}),
    );
    assert_eq!(resp["status"], 403);
    assert_eq!(resp["error_type"], "Forbidden");
    assert!(resp.get("stacktrace").is_none());
}

#[test]
fn pattern_with_unmatched_attributes_is_400_empty_spec_is_200() {
    let (handler, _) = harness();

    let resp = get(&handler, "/read/java.lang:type=*/NoSuchAttribute");
    assert_eq!(resp["status"], 400);

    // Pattern matching nothing with no attribute set: empty 200.
    let resp = get(&handler, "/read/nowhere:type=*");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"], json!({}));

    // Pattern matching nothing with attributes requested: 400.
    let resp = get(&handler, "/read/nowhere:type=*/Anything");
    assert_eq!(resp["status"], 400);
}

#[test]
fn bulk_failures_do_not_abort_siblings() {
    let (handler, _) = harness();
    let resp = post(
        &handler,
        json!([
            {"type": "read", "mbean": "java.lang:type=Threading", "attribute": "ThreadCount"},
            {"type": "read", "mbean": "java.lang:name=bogus"},
            {"type": "version", "bogus-key": true},
            {"type": "read", "mbean": "java.lang:type=Memory", "attribute": "HeapMemoryUsage"},
        ]),
    );
    let list = resp.as_array().unwrap();
    assert_eq!(list.len(), 4);
    assert_eq!(list[0]["status"], 200);
    assert_eq!(list[1]["status"], 404);
    assert_eq!(list[2]["status"], 400);
    assert_eq!(list[3]["status"], 200);
}

// ── Verb coverage ───────────────────────────────────────────────────

#[test]
fn write_returns_previous_value() {
    let (handler, registry) = harness();
    let resp = get(&handler, "/write/test:type=Settings/Limit/250");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"], json!(100));
    assert_eq!(
        registry
            .get_attribute(&name("test:type=Settings"), "Limit")
            .unwrap(),
        BusValue::Int(250)
    );
}

#[test]
fn write_to_unknown_or_readonly_attribute_fails() {
    let (handler, _) = harness();
    let resp = get(&handler, "/write/test:type=Settings/Nope/1");
    assert_eq!(resp["status"], 404);
    assert_eq!(resp["error_type"], "AttributeNotFound");

    let resp = get(&handler, "/write/java.lang:type=Threading/ThreadCount/1");
    assert_eq!(resp["status"], 404);
}

#[test]
fn exec_converts_arguments_by_declared_type() {
    let (handler, _) = harness();
    // GET arguments travel as strings; the declared Int type coerces.
    let resp = get(&handler, "/exec/test:type=Settings/raise/25");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"], json!(125));

    let resp = get(&handler, "/exec/test:type=Settings/noSuchOp");
    assert_eq!(resp["status"], 404);
    assert_eq!(resp["error_type"], "OperationNotFound");
}

#[test]
fn multi_attribute_read_respects_fault_policy() {
    let (handler, _) = harness();

    // Strict (default): a missing attribute fails the request.
    let resp = post(
        &handler,
        json!({
            "type": "read",
            "mbean": "java.lang:type=Memory",
            "attribute": ["HeapMemoryUsage", "Bogus"],
        }),
    );
    assert_eq!(resp["status"], 404);

    // ignoreErrors: the error string becomes the value.
    let resp = post(
        &handler,
        json!({
            "type": "read",
            "mbean": "java.lang:type=Memory",
            "attribute": ["HeapMemoryUsage", "Bogus"],
            "config": {"ignoreErrors": true},
        }),
    );
    assert_eq!(resp["status"], 200);
    assert!(resp["value"]["HeapMemoryUsage"]["used"].is_i64());
    assert!(resp["value"]["Bogus"]
        .as_str()
        .unwrap()
        .starts_with("ERROR:"));
}

#[test]
fn read_all_attributes_expands_readable_metadata() {
    let (handler, _) = harness();
    let resp = get(&handler, "/read/java.lang:type=Memory");
    assert_eq!(resp["status"], 200);
    assert!(resp["value"]["HeapMemoryUsage"]["used"].is_i64());
}

#[test]
fn list_builds_metadata_tree_with_path_descent() {
    let (handler, _) = harness();

    let resp = get(&handler, "/list/java.lang/type=Memory");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"]["attr"]["HeapMemoryUsage"]["rw"], json!(false));
    assert_eq!(
        resp["value"]["attr"]["HeapMemoryUsage"]["type"],
        json!("composite<MemoryUsage>")
    );
    assert!(resp["value"]["op"]["gc"].is_object());

    let resp = get(&handler, "/list/java.lang/type=Missing");
    assert_eq!(resp["status"], 404);
}

#[test]
fn search_returns_sorted_canonical_names() {
    let (handler, _) = harness();
    let resp = get(&handler, "/search/java.lang:type=*");
    assert_eq!(resp["status"], 200);
    let names: Vec<&str> = resp["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "java.lang:type=Compilation",
            "java.lang:type=Memory",
            "java.lang:type=Threading"
        ]
    );

    let resp = get(&handler, "/search/nothing:here=*");
    assert_eq!(resp["value"], json!([]));
}

#[test]
fn version_reports_protocol_and_agent() {
    let mut map = HashMap::new();
    map.insert("agentId".to_owned(), "test-agent-1".to_owned());
    let (handler, _) = harness_with(None, BridgeConfig::from_map(&map));
    let resp = get(&handler, "/version");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"]["protocol"], json!("7.2"));
    assert_eq!(resp["value"]["id"], json!("test-agent-1"));
    assert!(resp["value"]["info"].is_object());
}

#[test]
fn serialization_limits_apply_from_query_params() {
    let (handler, _) = harness();
    let resp = get_with(
        &handler,
        "/read/java.lang:type=Memory/HeapMemoryUsage",
        &[("maxDepth", "0")],
    );
    assert_eq!(resp["status"], 200);
    // Depth exhausted at the root: string form.
    assert_eq!(resp["value"], json!("[MemoryUsage]"));
}

#[test]
fn bridge_beans_are_reachable_over_the_protocol() {
    let (handler, _) = harness();
    let resp = get(&handler, "/read/spyglass:type=Config/HistoryMaxEntries");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"], json!(10));

    let resp = get(&handler, "/read/spyglass:type=ServerHandle/Product");
    assert_eq!(resp["status"], 200);
}

#[test]
fn debug_bean_round_trip() {
    let (handler, _) = harness();

    // Debug off: ring stays empty even after errors.
    let resp = get(&handler, "/write/spyglass:type=Debug/Debug/true");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["value"], json!(false));

    // Provoke an error; it lands in the ring now.
    let _ = get(&handler, "/read/java.lang:name=bogus");
    let resp = post(
        &handler,
        json!({"type": "exec", "mbean": "spyglass:type=Debug", "operation": "debugInfo"}),
    );
    assert_eq!(resp["status"], 200);
    let entries = resp["value"].as_array().unwrap();
    assert!(entries.iter().any(|e| e["level"] == "error"));
}

#[test]
fn notification_lifecycle_over_the_protocol() {
    let (handler, registry) = harness();

    let resp = post(&handler, json!({"type": "notification", "command": "register"}));
    assert_eq!(resp["status"], 200);
    let client = resp["value"]["id"].as_str().unwrap().to_owned();

    let resp = post(
        &handler,
        json!({
            "type": "notification",
            "command": "add",
            "client": client,
            "mbean": "java.lang:type=Memory",
        }),
    );
    assert_eq!(resp["status"], 200);
    let listener = resp["value"]["listener"].as_str().unwrap().to_owned();

    registry.emit(
        &name("java.lang:type=Memory"),
        Notification::new("memory.pressure", "heap is filling up", BusValue::Null),
    );

    let resp = post(
        &handler,
        json!({"type": "notification", "command": "pull", "client": client}),
    );
    assert_eq!(resp["status"], 200);
    let batch = resp["value"][&listener].as_array().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0]["type"], "memory.pressure");

    let resp = post(
        &handler,
        json!({"type": "notification", "command": "unregister", "client": client}),
    );
    assert_eq!(resp["status"], 200);

    let resp = post(
        &handler,
        json!({"type": "notification", "command": "ping", "client": client}),
    );
    assert_eq!(resp["status"], 404);
}

#[test]
fn rescan_picks_up_new_registries() {
    let extra = Arc::new(BeanRegistry::new("late"));
    let registries: Arc<std::sync::Mutex<Vec<Arc<BeanRegistry>>>> =
        Arc::new(std::sync::Mutex::new(vec![seed_registry()]));

    let discover = Arc::clone(&registries);
    let registry_set =
        RegistrySetHandler::with_discovery(Box::new(move || discover.lock().unwrap().clone()));
    let backend = Arc::new(
        BackendManager::with_parts(BridgeConfig::default(), None, Arc::new(registry_set)).unwrap(),
    );
    let handler = HttpRequestHandler::new(Arc::clone(&backend));

    extra
        .register(name("late:type=Arrival"), Arc::new(ThreadingBean))
        .unwrap();
    registries.lock().unwrap().push(Arc::clone(&extra));

    // Invisible until an explicit rescan through the config bean.
    let resp = get(&handler, "/search/late:type=*");
    assert_eq!(resp["value"], json!([]));

    let resp = post(
        &handler,
        json!({"type": "exec", "mbean": "spyglass:type=Config", "operation": "rescan"}),
    );
    assert_eq!(resp["status"], 200);

    let resp = get(&handler, "/search/late:type=*");
    assert_eq!(resp["value"], json!(["late:type=Arrival"]));
}

#[test]
fn destroy_unregisters_bridge_beans() {
    let registry = seed_registry();
    let discovered = Arc::clone(&registry);
    let registry_set =
        RegistrySetHandler::with_discovery(Box::new(move || vec![Arc::clone(&discovered)]));
    let backend =
        BackendManager::with_parts(BridgeConfig::default(), None, Arc::new(registry_set)).unwrap();

    assert!(registry.is_registered(&name("spyglass:type=Config")));
    backend.destroy().unwrap();
    assert!(!registry.is_registered(&name("spyglass:type=Config")));
    assert!(!registry.is_registered(&name("spyglass:type=History")));
    assert!(!registry.is_registered(&name("spyglass:type=Debug")));
    assert!(!registry.is_registered(&name("spyglass:type=ServerHandle")));
}

#[test]
fn mbean_qualifier_lands_in_bridge_bean_names() {
    let mut map = HashMap::new();
    map.insert("mbeanQualifier".to_owned(), "node-7".to_owned());
    let (handler, registry) = harness_with(None, BridgeConfig::from_map(&map));

    assert!(registry.is_registered(&name("spyglass:type=Config,qualifier=node-7")));
    let resp = get(
        &handler,
        "/read/spyglass:type=Config,qualifier=node-7/HistoryMaxEntries",
    );
    assert_eq!(resp["status"], 200);
}

#[test]
fn target_requests_without_proxy_dispatcher_are_internal_errors() {
    let (handler, _) = harness();
    let resp = post(
        &handler,
        json!({
            "type": "version",
            "target": {"url": "http://remote:7777/bridge"},
        }),
    );
    assert_eq!(resp["status"], 500);
    assert_eq!(resp["error_type"], "InternalError");
}
