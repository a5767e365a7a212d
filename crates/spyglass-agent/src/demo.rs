//! Built-in demo beans, registered with `--demo` (or `demo = true`) so
//! a fresh agent has something to serve before the embedding host
//! registers its own beans.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use spyglass_bus::{
    no_such_attribute, no_such_operation, AttributeInfo, BeanInfo, BeanRegistry, BusType, BusValue,
    ManagedBean, ObjectName, OperationInfo, ParamInfo, RegistryError,
};

struct RuntimeBean {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ManagedBean for RuntimeBean {
    fn info(&self) -> BeanInfo {
        BeanInfo::new("ProcessRuntime", "The process hosting this agent")
            .with_attributes(vec![
                AttributeInfo::readonly("Pid", BusType::Int, "process id"),
                AttributeInfo::readonly("UptimeSeconds", BusType::Int, "seconds since start"),
                AttributeInfo::readonly("StartedAt", BusType::Text, "start time, RFC 3339"),
            ])
            .with_operations(vec![OperationInfo::new(
                "echo",
                vec![ParamInfo::new("message", BusType::Text)],
                BusType::Text,
                "round-trip a string through the pipeline",
            )])
    }

    fn read(&self, attribute: &str) -> Result<BusValue, RegistryError> {
        match attribute {
            "Pid" => Ok(BusValue::Int(i64::from(std::process::id()))),
            "UptimeSeconds" => Ok(BusValue::Int(self.started.elapsed().as_secs() as i64)),
            "StartedAt" => Ok(BusValue::Text(self.started_at.to_rfc3339())),
            other => Err(no_such_attribute("ProcessRuntime", other)),
        }
    }

    fn invoke(&self, operation: &str, args: Vec<BusValue>) -> Result<BusValue, RegistryError> {
        match operation {
            "echo" => match args.into_iter().next() {
                Some(BusValue::Text(message)) => Ok(BusValue::Text(message)),
                other => Err(RegistryError::InvalidValue {
                    reason: format!("echo takes a string, got {other:?}"),
                }),
            },
            other => Err(no_such_operation("ProcessRuntime", other)),
        }
    }
}

/// Register the demo beans; already-registered names are left alone so
/// repeated startups (tests) stay quiet.
pub fn register_demo_beans(registry: &Arc<BeanRegistry>) {
    let name = ObjectName::parse("process:type=Runtime").expect("static demo bean name");
    if registry.is_registered(&name) {
        return;
    }
    let _ = registry.register(
        name,
        Arc::new(RuntimeBean {
            started_at: Utc::now(),
            started: Instant::now(),
        }),
    );
}
