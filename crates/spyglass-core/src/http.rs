// ── HTTP request facade ──
//
// Transport-neutral adapter: takes a GET path + parameter map or a
// POST body, runs the pipeline, and always hands the transport a JSON
// envelope; protocol-level failures never escape as errors. Bulk POST
// arrays wrap each element independently so one failure never aborts
// its siblings.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::backend::BackendManager;
use crate::error::ProtocolError;
use crate::request::{factory, ProcessingOptions, Request, StackTracePolicy};

pub struct HttpRequestHandler {
    backend: Arc<BackendManager>,
}

impl HttpRequestHandler {
    pub fn new(backend: Arc<BackendManager>) -> Self {
        Self { backend }
    }

    /// Handle a GET request: endpoint-relative path plus query
    /// parameters.
    pub fn handle_get(&self, path_info: &str, params: &HashMap<String, String>) -> JsonValue {
        match factory::from_get(path_info, params) {
            Ok(request) => {
                if self.backend.is_debug() {
                    self.backend.debug_log(format!("GET {path_info}"));
                }
                self.execute(&request)
            }
            Err(e) => self.error_envelope(&e, None, &ProcessingOptions::default()),
        }
    }

    /// Handle a POST body: a single JSON object or a bulk array.
    /// The response mirrors the shape: one envelope, or an array of
    /// envelopes in request order.
    pub fn handle_post(
        &self,
        body: &[u8],
        encoding: Option<&str>,
        params: &HashMap<String, String>,
    ) -> JsonValue {
        let parsed = match Self::decode(body, encoding) {
            Ok(text) => match serde_json::from_str::<JsonValue>(&text) {
                Ok(value) => value,
                Err(e) => {
                    let err = ProtocolError::InvalidRequest(format!("invalid JSON request: {e}"));
                    return self.error_envelope(&err, None, &ProcessingOptions::default());
                }
            },
            Err(e) => return self.error_envelope(&e, None, &ProcessingOptions::default()),
        };

        match parsed {
            JsonValue::Array(elements) => JsonValue::Array(
                elements
                    .into_iter()
                    .map(|element| self.handle_post_element(element, params))
                    .collect(),
            ),
            JsonValue::Object(map) => self.handle_post_element(JsonValue::Object(map), params),
            other => {
                let err = ProtocolError::InvalidRequest(format!(
                    "request root must be an object or array, got {other}"
                ));
                self.error_envelope(&err, None, &ProcessingOptions::default())
            }
        }
    }

    /// Remote-origin gate the transport calls before any parsing.
    pub fn check_client_access(
        &self,
        host: Option<&str>,
        addr: Option<&str>,
    ) -> Result<(), ProtocolError> {
        if self.backend.is_remote_access_allowed(host, addr) {
            Ok(())
        } else {
            Err(ProtocolError::Forbidden(format!(
                "no access from client {} allowed",
                addr.or(host).unwrap_or("<unknown>")
            )))
        }
    }

    /// Last security belt: render any failure still escaping a bulk
    /// run as a 500-class envelope.
    pub fn handle_error(&self, err: &ProtocolError) -> JsonValue {
        self.error_envelope(err, None, &ProcessingOptions::default())
    }

    fn handle_post_element(
        &self,
        element: JsonValue,
        params: &HashMap<String, String>,
    ) -> JsonValue {
        let Some(map) = element.as_object() else {
            let err = ProtocolError::InvalidRequest(format!(
                "bulk elements must be objects, got {element}"
            ));
            return self.error_envelope(&err, None, &ProcessingOptions::default());
        };
        match factory::from_post(map, params) {
            Ok(request) => self.execute(&request),
            Err(e) => self.error_envelope(&e, None, &ProcessingOptions::default()),
        }
    }

    fn execute(&self, request: &Request) -> JsonValue {
        match self.backend.handle(request) {
            Ok(envelope) => envelope,
            Err(e) => self.error_envelope(&e, Some(request), &request.options),
        }
    }

    fn decode(body: &[u8], encoding: Option<&str>) -> Result<String, ProtocolError> {
        match encoding {
            None => {}
            Some(enc) if enc.eq_ignore_ascii_case("utf-8") || enc.eq_ignore_ascii_case("utf8") => {}
            Some(other) => {
                return Err(ProtocolError::InvalidRequest(format!(
                    "unsupported request encoding '{other}'"
                )))
            }
        }
        String::from_utf8(body.to_vec())
            .map_err(|e| ProtocolError::InvalidRequest(format!("request body is not UTF-8: {e}")))
    }

    /// Build the error envelope for a protocol failure. Restrictor
    /// denials never carry a stacktrace.
    fn error_envelope(
        &self,
        err: &ProtocolError,
        request: Option<&Request>,
        options: &ProcessingOptions,
    ) -> JsonValue {
        let status = err.status();
        let mut envelope = JsonMap::new();
        envelope.insert("status".to_owned(), json!(status));
        envelope.insert("error".to_owned(), json!(format!("{} : {err}", err.error_type())));
        envelope.insert("error_type".to_owned(), json!(err.error_type()));

        let include_trace = match options.include_stacktrace {
            StackTracePolicy::Always => true,
            StackTracePolicy::Never => false,
            StackTracePolicy::Runtime => matches!(err, ProtocolError::TargetFailure { .. }),
        };
        if include_trace && !matches!(err, ProtocolError::Forbidden(_)) {
            envelope.insert("stacktrace".to_owned(), json!(render_trace(err)));
        }
        if options.serialize_exception {
            envelope.insert(
                "error_value".to_owned(),
                json!({"error_type": err.error_type(), "message": err.to_string()}),
            );
        }
        if let Some(request) = request {
            envelope.insert("request".to_owned(), request.to_json());
        }

        self.backend
            .error_log(format!("error {status}: {err}"), err.cause().map(str::to_owned));
        JsonValue::Object(envelope)
    }
}

/// Error-chain rendering standing in for a stack trace: the failure
/// plus its unwrapped cause, one per line.
fn render_trace(err: &ProtocolError) -> String {
    let mut out = format!("{}: {err}", err.error_type());
    if let Some(cause) = err.cause() {
        out.push_str("\ncaused by: ");
        out.push_str(cause);
    }
    out
}
