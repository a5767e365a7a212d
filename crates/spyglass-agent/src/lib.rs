//! HTTP agent around `spyglass-core`: axum owns the sockets, the core
//! owns the protocol. The core is synchronous; requests run on the
//! blocking pool so a slow bean never stalls the reactor.

pub mod config;
pub mod demo;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tracing::{error, info};

use spyglass_core::config::BridgeConfig;
use spyglass_core::{BackendManager, HttpRequestHandler};

pub use config::{load_config, AgentConfig, ConfigError};

/// Everything `run` needs; built from CLI + config file.
pub struct Settings {
    pub listen: SocketAddr,
    pub bridge: HashMap<String, String>,
    pub demo: bool,
}

#[derive(Clone)]
struct AppState {
    handler: Arc<HttpRequestHandler>,
}

/// Build the pipeline and serve until ctrl-c. Shutdown destroys the
/// backend, which unregisters the bridge's own beans.
pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if settings.demo {
        demo::register_demo_beans(&spyglass_bus::platform());
    }

    let bridge_config = BridgeConfig::from_map(&settings.bridge);
    let mut context = bridge_config.agent_context.clone();
    if !context.starts_with('/') {
        context.insert(0, '/');
    }
    let context = context.trim_end_matches('/').to_owned();
    let backend = Arc::new(BackendManager::new(bridge_config)?);
    let handler = Arc::new(HttpRequestHandler::new(Arc::clone(&backend)));

    let state = AppState {
        handler: Arc::clone(&handler),
    };
    let root = if context.is_empty() { "/" } else { &context };
    let app = Router::new()
        .route(root, get(handle_get_root).post(handle_post))
        .route(&format!("{context}/{{*path}}"), get(handle_get))
        .with_state(state);

    let listener = TcpListener::bind(settings.listen).await?;
    info!(listen = %settings.listen, context = %context, "spyglass agent up");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = ctrl_c().await;
        info!("shutting down");
    })
    .await?;

    if let Err(e) = backend.destroy() {
        error!(error = %e, "backend shutdown reported failures");
    }
    Ok(())
}

/// Protocol-level failures are carried inside the envelope; the HTTP
/// status stays 200 so proxies and dumb clients always get the JSON.
fn respond(envelope: JsonValue) -> impl IntoResponse {
    (StatusCode::OK, Json(envelope))
}

fn forbidden(handler: &HttpRequestHandler, err: spyglass_core::ProtocolError) -> axum::response::Response {
    (StatusCode::FORBIDDEN, Json(handler.handle_error(&err))).into_response()
}

async fn handle_get(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let handler = Arc::clone(&state.handler);
    if let Err(e) = handler.check_client_access(None, Some(&peer.ip().to_string())) {
        return forbidden(&handler, e);
    }
    let envelope = tokio::task::spawn_blocking(move || {
        state.handler.handle_get(&format!("/{path}"), &params)
    })
    .await
    .unwrap_or_else(|e| {
        handler.handle_error(&spyglass_core::ProtocolError::Internal(format!(
            "request task failed: {e}"
        )))
    });
    respond(envelope).into_response()
}

async fn handle_get_root(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let handler = Arc::clone(&state.handler);
    if let Err(e) = handler.check_client_access(None, Some(&peer.ip().to_string())) {
        return forbidden(&handler, e);
    }
    let envelope =
        tokio::task::spawn_blocking(move || state.handler.handle_get("", &params))
            .await
            .unwrap_or_else(|e| {
                handler.handle_error(&spyglass_core::ProtocolError::Internal(format!(
                    "request task failed: {e}"
                )))
            });
    respond(envelope).into_response()
}

async fn handle_post(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> axum::response::Response {
    let handler = Arc::clone(&state.handler);
    if let Err(e) = handler.check_client_access(None, Some(&peer.ip().to_string())) {
        return forbidden(&handler, e);
    }
    let envelope = tokio::task::spawn_blocking(move || {
        state.handler.handle_post(&body, None, &params)
    })
    .await
    .unwrap_or_else(|e| {
        handler.handle_error(&spyglass_core::ProtocolError::Internal(format!(
            "request task failed: {e}"
        )))
    });
    respond(envelope).into_response()
}
