// E2E tests: spawn the agent on an ephemeral port and drive the wire
// protocol with a real HTTP client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

use spyglass_agent::Settings;

async fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_port(port: u16) {
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("agent did not come up on port {port}");
}

/// Start an agent with demo beans and a unique bean qualifier (several
/// agents share the process-wide platform registry under test).
async fn start_agent(qualifier: &str) -> (u16, tokio::task::JoinHandle<()>) {
    let port = find_free_port().await;
    let mut bridge = HashMap::new();
    bridge.insert("mbeanQualifier".to_owned(), qualifier.to_owned());
    bridge.insert("agentContext".to_owned(), "/spyglass".to_owned());

    let settings = Settings {
        listen: SocketAddr::from(([127, 0, 0, 1], port)),
        bridge,
        demo: true,
    };
    let handle = tokio::spawn(async move {
        spyglass_agent::run(settings).await.unwrap();
    });
    wait_for_port(port).await;
    (port, handle)
}

#[tokio::test]
async fn get_read_and_version_round_trip() {
    let (port, server) = start_agent("e2e-get").await;
    let client = reqwest::Client::new();

    let body: JsonValue = client
        .get(format!(
            "http://127.0.0.1:{port}/spyglass/read/process:type=Runtime/Pid"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], 200);
    assert_eq!(body["value"], json!(i64::from(std::process::id())));
    assert_eq!(body["request"]["mbean"], "process:type=Runtime");

    let body: JsonValue = client
        .get(format!("http://127.0.0.1:{port}/spyglass/version"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], 200);
    assert!(body["value"]["protocol"].is_string());

    // Protocol errors still arrive as HTTP 200 with a status field.
    let response = client
        .get(format!(
            "http://127.0.0.1:{port}/spyglass/read/no.such:bean=really/X"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body["status"], 404);
    assert_eq!(body["error_type"], "InstanceNotFound");

    server.abort();
}

#[tokio::test]
async fn post_bulk_and_exec_round_trip() {
    let (port, server) = start_agent("e2e-post").await;
    let client = reqwest::Client::new();

    let body: JsonValue = client
        .post(format!("http://127.0.0.1:{port}/spyglass"))
        .json(&json!([
            {"type": "version"},
            {"type": "read", "mbean": "process:type=Runtime", "attribute": "UptimeSeconds"},
            {
                "type": "exec",
                "mbean": "process:type=Runtime",
                "operation": "echo",
                "arguments": ["ping"],
            },
        ]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list[0]["status"], 200);
    assert!(list[1]["value"].is_i64());
    assert_eq!(list[2]["status"], 200);
    assert_eq!(list[2]["value"], json!("ping"));

    server.abort();
}
