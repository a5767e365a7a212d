//! Request-processing core of the spyglass bridge: a remote,
//! firewall-friendly JSON/HTTP protocol over the in-process management
//! bus of `spyglass-bus`.
//!
//! - **[`request`]** — the typed request model and its factory: GET
//!   path grammar, POST JSON documents, processing options.
//! - **[`backend::BackendManager`]** — the single entry point: verb
//!   gate, dispatcher selection, verb handlers, conversion, history
//!   capture, envelope stamping.
//! - **[`converter`]** — the value engine: `BusValue`-to-JSON with
//!   path descent, depth/collection/object limits and cycle breaking,
//!   and the typed JSON-to-`BusValue` direction used by write/exec.
//! - **[`restrictor`]** — the policy oracle (allow-all, deny-all, TOML
//!   policy documents).
//! - **[`detector`]** — the product-detector chain building the
//!   [`detector::ServerHandle`] with its composed pre-dispatch and
//!   post-detect hooks.
//! - **[`history`] / [`debug`]** — the bounded stores, exposed (with
//!   config and server handle) as the bridge's own beans in the
//!   `spyglass` domain.
//! - **[`http::HttpRequestHandler`]** — the transport-neutral facade:
//!   every protocol failure becomes a status-coded JSON envelope.
//!
//! The core is synchronous; a request occupies its worker thread from
//! entry to envelope. Transports (see `spyglass-agent`) own the sockets.

pub mod backend;
pub mod beans;
pub mod config;
pub mod converter;
pub mod debug;
pub mod detector;
pub mod error;
pub mod handler;
pub mod history;
pub mod http;
pub mod path;
pub mod request;
pub mod restrictor;

pub use backend::BackendManager;
pub use config::{BridgeConfig, ConfigKey};
pub use error::ProtocolError;
pub use http::HttpRequestHandler;
pub use request::{Request, Verb};
