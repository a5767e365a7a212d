// ── Request factory ──
//
// Builds typed requests from the two wire encodings: GET (verb and
// operands in the URI path, options in query parameters) and POST
// (JSON document, options in the `config` object with query parameters
// as fallback).

use std::collections::HashMap;

use secrecy::SecretString;
use serde_json::Value as JsonValue;
use url::Url;
use uuid::Uuid;

use spyglass_bus::ObjectName;

use crate::error::ProtocolError;
use crate::path::split_path;
use crate::request::{
    AttributeSpec, NotificationCommand, ProcessingOptions, Request, RequestKind, RequestOrigin,
    StackTracePolicy, TargetConfig, ValueFaultPolicy, Verb,
};

/// Build a request from a GET URI path (endpoint prefix already
/// stripped) and its query parameters.
///
/// GET requests cannot express multi-attribute reads, bulk arrays or
/// proxy targets; the grammar simply has no place for them.
pub fn from_get(path_info: &str, params: &HashMap<String, String>) -> Result<Request, ProtocolError> {
    let trimmed = path_info.strip_prefix('/').unwrap_or(path_info);
    let options = options_from_params(params)?;

    // A bare endpoint hit is a version probe.
    if trimmed.is_empty() {
        return Ok(Request {
            kind: RequestKind::Version,
            path: None,
            options,
            target: None,
            origin: RequestOrigin::Get,
        });
    }

    let segments = split_path(trimmed)?;
    let verb = Verb::parse(&segments[0])
        .ok_or_else(|| ProtocolError::InvalidRequest(format!("unknown verb '{}'", segments[0])))?;
    let rest = &segments[1..];

    let (kind, path) = match verb {
        Verb::Read => {
            let name = parse_name(rest.first(), "read")?;
            let attributes = match rest.get(1) {
                None => AttributeSpec::All,
                Some(attr) => AttributeSpec::One(attr.clone()),
            };
            (
                RequestKind::Read { name, attributes },
                tail_path(rest, 2),
            )
        }
        Verb::Write => {
            let name = parse_name(rest.first(), "write")?;
            let attribute = rest
                .get(1)
                .cloned()
                .ok_or_else(|| ProtocolError::InvalidRequest("write needs an attribute".into()))?;
            let value = rest
                .get(2)
                .map(|raw| parse_get_value(raw))
                .ok_or_else(|| ProtocolError::InvalidRequest("write needs a value".into()))?;
            (
                RequestKind::Write {
                    name,
                    attribute,
                    value,
                },
                tail_path(rest, 3),
            )
        }
        Verb::Exec => {
            let name = parse_name(rest.first(), "exec")?;
            let operation = rest
                .get(1)
                .cloned()
                .ok_or_else(|| ProtocolError::InvalidRequest("exec needs an operation".into()))?;
            let arguments = rest[2.min(rest.len())..]
                .iter()
                .map(|raw| parse_get_value(raw))
                .collect();
            (
                RequestKind::Exec {
                    name,
                    operation,
                    arguments,
                },
                None,
            )
        }
        Verb::Search => {
            let pattern = parse_name(rest.first(), "search")?;
            (RequestKind::Search { pattern }, None)
        }
        Verb::List => (RequestKind::List, tail_path(rest, 0)),
        Verb::Version => (RequestKind::Version, None),
        Verb::Notification => {
            return Err(ProtocolError::InvalidRequest(
                "notification requests are POST-only".into(),
            ))
        }
    };

    Ok(Request {
        kind,
        path,
        options,
        target: None,
        origin: RequestOrigin::Get,
    })
}

/// Build a request from one POST JSON object. Options already parsed
/// from query parameters are overridden by the body's `config` object.
pub fn from_post(
    body: &serde_json::Map<String, JsonValue>,
    params: &HashMap<String, String>,
) -> Result<Request, ProtocolError> {
    let verb_raw = body
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ProtocolError::InvalidRequest("missing request 'type'".into()))?;
    let verb = Verb::parse(verb_raw)
        .ok_or_else(|| ProtocolError::InvalidRequest(format!("unknown verb '{verb_raw}'")))?;

    reject_unknown_keys(body, verb)?;

    let mut options = options_from_params(params)?;
    if let Some(config) = body.get("config") {
        let config = config.as_object().ok_or_else(|| {
            ProtocolError::InvalidRequest("'config' must be an object".into())
        })?;
        apply_config_object(&mut options, config)?;
    }

    let kind = match verb {
        Verb::Read => RequestKind::Read {
            name: name_field(body)?,
            attributes: parse_attribute_spec(body.get("attribute"))?,
        },
        Verb::Write => RequestKind::Write {
            name: name_field(body)?,
            attribute: body
                .get("attribute")
                .and_then(JsonValue::as_str)
                .map(str::to_owned)
                .ok_or_else(|| ProtocolError::InvalidRequest("write needs an attribute".into()))?,
            value: body.get("value").cloned().unwrap_or(JsonValue::Null),
        },
        Verb::Exec => RequestKind::Exec {
            name: name_field(body)?,
            operation: body
                .get("operation")
                .and_then(JsonValue::as_str)
                .map(str::to_owned)
                .ok_or_else(|| ProtocolError::InvalidRequest("exec needs an operation".into()))?,
            arguments: match body.get("arguments") {
                None | Some(JsonValue::Null) => Vec::new(),
                Some(JsonValue::Array(args)) => args.clone(),
                Some(_) => {
                    return Err(ProtocolError::InvalidRequest(
                        "'arguments' must be an array".into(),
                    ))
                }
            },
        },
        Verb::List => RequestKind::List,
        Verb::Search => RequestKind::Search {
            pattern: name_field(body)?,
        },
        Verb::Version => RequestKind::Version,
        Verb::Notification => RequestKind::Notification(parse_notification(body)?),
    };

    Ok(Request {
        kind,
        path: parse_post_path(body.get("path"))?,
        options,
        target: parse_target(body.get("target"))?,
        origin: RequestOrigin::Post,
    })
}

// ── Field parsing ───────────────────────────────────────────────────

fn parse_name(raw: Option<&String>, verb: &str) -> Result<ObjectName, ProtocolError> {
    let raw = raw
        .ok_or_else(|| ProtocolError::InvalidRequest(format!("{verb} needs an object name")))?;
    ObjectName::parse(raw).map_err(ProtocolError::from)
}

fn name_field(body: &serde_json::Map<String, JsonValue>) -> Result<ObjectName, ProtocolError> {
    let raw = body
        .get("mbean")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ProtocolError::InvalidRequest("missing 'mbean'".into()))?;
    ObjectName::parse(raw).map_err(ProtocolError::from)
}

fn tail_path(segments: &[String], from: usize) -> Option<Vec<String>> {
    if segments.len() > from {
        Some(segments[from..].to_vec())
    } else {
        None
    }
}

/// GET operand strings: `[null]` is the null marker, everything else
/// stays a string and is coerced by the declared type at dispatch time.
fn parse_get_value(raw: &str) -> JsonValue {
    if raw == "[null]" {
        JsonValue::Null
    } else {
        JsonValue::String(raw.to_owned())
    }
}

fn parse_attribute_spec(field: Option<&JsonValue>) -> Result<AttributeSpec, ProtocolError> {
    match field {
        None | Some(JsonValue::Null) => Ok(AttributeSpec::All),
        Some(JsonValue::String(attr)) => Ok(AttributeSpec::One(attr.clone())),
        Some(JsonValue::Array(items)) => {
            if items.is_empty() || (items.len() == 1 && items[0].is_null()) {
                return Ok(AttributeSpec::All);
            }
            let names = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_owned).ok_or_else(|| {
                        ProtocolError::InvalidRequest("attribute list entries must be strings".into())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AttributeSpec::Many(names))
        }
        Some(other) => Err(ProtocolError::InvalidRequest(format!(
            "'attribute' must be a string or array, got {other}"
        ))),
    }
}

fn parse_post_path(field: Option<&JsonValue>) -> Result<Option<Vec<String>>, ProtocolError> {
    match field {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(raw)) => Ok(Some(split_path(raw)?)),
        Some(JsonValue::Array(items)) => {
            let segments = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_owned).ok_or_else(|| {
                        ProtocolError::InvalidRequest("path segments must be strings".into())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(segments))
        }
        Some(other) => Err(ProtocolError::InvalidRequest(format!(
            "'path' must be a string or array, got {other}"
        ))),
    }
}

fn parse_target(field: Option<&JsonValue>) -> Result<Option<TargetConfig>, ProtocolError> {
    let Some(field) = field else { return Ok(None) };
    let obj = field
        .as_object()
        .ok_or_else(|| ProtocolError::InvalidRequest("'target' must be an object".into()))?;
    let url_raw = obj
        .get("url")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ProtocolError::InvalidRequest("target needs a 'url'".into()))?;
    let url = Url::parse(url_raw)
        .map_err(|e| ProtocolError::InvalidRequest(format!("invalid target url: {e}")))?;
    Ok(Some(TargetConfig {
        url,
        user: obj
            .get("user")
            .and_then(JsonValue::as_str)
            .map(str::to_owned),
        password: obj
            .get("password")
            .and_then(JsonValue::as_str)
            .map(|p| SecretString::from(p.to_owned())),
    }))
}

fn parse_notification(
    body: &serde_json::Map<String, JsonValue>,
) -> Result<NotificationCommand, ProtocolError> {
    let command = body
        .get("command")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ProtocolError::InvalidRequest("notification needs a 'command'".into()))?;

    let client = |body: &serde_json::Map<String, JsonValue>| -> Result<Uuid, ProtocolError> {
        parse_uuid(body.get("client"), "client")
    };

    match command {
        "register" => Ok(NotificationCommand::Register),
        "unregister" => Ok(NotificationCommand::Unregister { client: client(body)? }),
        "ping" => Ok(NotificationCommand::Ping { client: client(body)? }),
        "list" => Ok(NotificationCommand::List { client: client(body)? }),
        "pull" => Ok(NotificationCommand::Pull { client: client(body)? }),
        "add" => Ok(NotificationCommand::Add {
            client: client(body)?,
            name: name_field(body)?,
            kinds: match body.get("filter") {
                None | Some(JsonValue::Null) => None,
                Some(JsonValue::Array(items)) => Some(
                    items
                        .iter()
                        .map(|item| {
                            item.as_str().map(str::to_owned).ok_or_else(|| {
                                ProtocolError::InvalidRequest(
                                    "filter entries must be strings".into(),
                                )
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                Some(JsonValue::String(kind)) => Some(vec![kind.clone()]),
                Some(other) => {
                    return Err(ProtocolError::InvalidRequest(format!(
                        "'filter' must be a string or array, got {other}"
                    )))
                }
            },
        }),
        "remove" => Ok(NotificationCommand::Remove {
            client: client(body)?,
            listener: parse_uuid(body.get("listener"), "listener")?,
        }),
        other => Err(ProtocolError::InvalidRequest(format!(
            "unknown notification command '{other}'"
        ))),
    }
}

fn parse_uuid(field: Option<&JsonValue>, what: &str) -> Result<Uuid, ProtocolError> {
    let raw = field
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ProtocolError::InvalidRequest(format!("missing '{what}' id")))?;
    Uuid::parse_str(raw)
        .map_err(|_| ProtocolError::InvalidRequest(format!("invalid '{what}' id '{raw}'")))
}

fn reject_unknown_keys(
    body: &serde_json::Map<String, JsonValue>,
    verb: Verb,
) -> Result<(), ProtocolError> {
    let allowed: &[&str] = match verb {
        Verb::Read => &["type", "mbean", "attribute", "path", "target", "config"],
        Verb::Write => &["type", "mbean", "attribute", "value", "path", "target", "config"],
        Verb::Exec => &["type", "mbean", "operation", "arguments", "path", "target", "config"],
        Verb::List => &["type", "path", "target", "config"],
        Verb::Search => &["type", "mbean", "target", "config"],
        Verb::Version => &["type", "target", "config"],
        Verb::Notification => &[
            "type", "command", "client", "listener", "mbean", "filter", "config",
        ],
    };
    for key in body.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(ProtocolError::InvalidRequest(format!(
                "unknown key '{key}' for {verb} request"
            )));
        }
    }
    Ok(())
}

// ── Option parsing ──────────────────────────────────────────────────

fn options_from_params(params: &HashMap<String, String>) -> Result<ProcessingOptions, ProtocolError> {
    let mut options = ProcessingOptions::default();
    for (key, value) in params {
        apply_option(&mut options, key, value)?;
    }
    Ok(options)
}

fn apply_config_object(
    options: &mut ProcessingOptions,
    config: &serde_json::Map<String, JsonValue>,
) -> Result<(), ProtocolError> {
    for (key, value) in config {
        let raw = match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Number(n) => n.to_string(),
            other => {
                return Err(ProtocolError::InvalidRequest(format!(
                    "config value for '{key}' must be scalar, got {other}"
                )))
            }
        };
        apply_option(options, key, &raw)?;
    }
    Ok(())
}

fn apply_option(
    options: &mut ProcessingOptions,
    key: &str,
    value: &str,
) -> Result<(), ProtocolError> {
    match key {
        "maxDepth" => options.max_depth = Some(parse_number(key, value)?),
        "maxCollectionSize" => options.max_collection_size = Some(parse_number(key, value)?),
        "maxObjects" => options.max_objects = Some(parse_number(key, value)?),
        "ignoreErrors" => {
            options.fault = if parse_bool(key, value)? {
                ValueFaultPolicy::Ignore
            } else {
                ValueFaultPolicy::Strict
            }
        }
        "includeStackTrace" => {
            options.include_stacktrace = match value {
                "true" => StackTracePolicy::Always,
                "false" => StackTracePolicy::Never,
                "runtime" => StackTracePolicy::Runtime,
                other => {
                    return Err(ProtocolError::InvalidRequest(format!(
                        "includeStackTrace must be true|false|runtime, got '{other}'"
                    )))
                }
            }
        }
        "serializeException" => options.serialize_exception = parse_bool(key, value)?,
        "canonicalNaming" => options.canonical_naming = parse_bool(key, value)?,
        // Unrecognized parameters are the transport's business.
        _ => {}
    }
    Ok(())
}

fn parse_number(key: &str, value: &str) -> Result<usize, ProtocolError> {
    value
        .parse()
        .map_err(|_| ProtocolError::InvalidRequest(format!("'{key}' must be a number, got '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ProtocolError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ProtocolError::InvalidRequest(format!(
            "'{key}' must be true or false, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_params() -> HashMap<String, String> {
        HashMap::new()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn body(value: JsonValue) -> serde_json::Map<String, JsonValue> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn get_read_with_attribute_and_path() {
        let req = from_get(
            "/read/java.lang:type=Memory/HeapMemoryUsage/used",
            &no_params(),
        )
        .unwrap();
        assert_eq!(req.verb(), Verb::Read);
        assert_eq!(
            req.object_name().unwrap().to_string(),
            "java.lang:type=Memory"
        );
        match &req.kind {
            RequestKind::Read { attributes, .. } => {
                assert_eq!(attributes, &AttributeSpec::One("HeapMemoryUsage".to_owned()));
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(req.path_segments(), ["used"]);
    }

    #[test]
    fn get_read_without_attribute_means_all() {
        let req = from_get("/read/java.lang:type=Memory", &no_params()).unwrap();
        match &req.kind {
            RequestKind::Read { attributes, .. } => assert_eq!(attributes, &AttributeSpec::All),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn get_escaped_name_property_survives() {
        // `!/` keeps the slash inside the property value.
        let req = from_get("/read/app:path=!/var!/log/Size", &no_params()).unwrap();
        assert_eq!(
            req.object_name().unwrap().property("path"),
            Some("/var/log")
        );
    }

    #[test]
    fn get_write_and_exec_grammar() {
        let req = from_get("/write/app:type=Cfg/Limit/42", &no_params()).unwrap();
        match &req.kind {
            RequestKind::Write { attribute, value, .. } => {
                assert_eq!(attribute, "Limit");
                assert_eq!(value, &json!("42"));
            }
            other => panic!("unexpected kind {other:?}"),
        }

        let req = from_get("/exec/app:type=Cfg/reset/7/soft", &no_params()).unwrap();
        match &req.kind {
            RequestKind::Exec { operation, arguments, .. } => {
                assert_eq!(operation, "reset");
                assert_eq!(arguments, &vec![json!("7"), json!("soft")]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn get_null_marker() {
        let req = from_get("/write/app:type=Cfg/Limit/[null]", &no_params()).unwrap();
        match &req.kind {
            RequestKind::Write { value, .. } => assert!(value.is_null()),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn get_empty_path_is_version() {
        assert_eq!(from_get("", &no_params()).unwrap().verb(), Verb::Version);
        assert_eq!(from_get("/", &no_params()).unwrap().verb(), Verb::Version);
    }

    #[test]
    fn get_rejects_unknown_verb_and_notification() {
        assert!(from_get("/frobnicate/x:a=b", &no_params()).is_err());
        assert!(from_get("/notification", &no_params()).is_err());
    }

    #[test]
    fn query_params_set_options() {
        let req = from_get(
            "/read/java.lang:type=Memory",
            &params(&[
                ("maxDepth", "3"),
                ("ignoreErrors", "true"),
                ("includeStackTrace", "runtime"),
                ("canonicalNaming", "false"),
            ]),
        )
        .unwrap();
        assert_eq!(req.options.max_depth, Some(3));
        assert!(!req.options.fault.is_strict());
        assert_eq!(req.options.include_stacktrace, StackTracePolicy::Runtime);
        assert!(!req.options.canonical_naming);
    }

    #[test]
    fn post_read_multi_attribute() {
        let req = from_post(
            &body(json!({
                "type": "read",
                "mbean": "java.lang:type=Memory",
                "attribute": ["HeapMemoryUsage", "NonHeapMemoryUsage"],
            })),
            &no_params(),
        )
        .unwrap();
        match &req.kind {
            RequestKind::Read { attributes, .. } => {
                assert!(attributes.is_multi());
                assert_eq!(attributes.names().unwrap().len(), 2);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn post_single_null_attribute_means_all() {
        let req = from_post(
            &body(json!({"type": "read", "mbean": "a:b=c", "attribute": [null]})),
            &no_params(),
        )
        .unwrap();
        match &req.kind {
            RequestKind::Read { attributes, .. } => assert_eq!(attributes, &AttributeSpec::All),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn post_unknown_keys_rejected() {
        let err = from_post(
            &body(json!({"type": "read", "mbean": "a:b=c", "bogus": 1})),
            &no_params(),
        )
        .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn post_config_overrides_query_params() {
        let req = from_post(
            &body(json!({
                "type": "read",
                "mbean": "a:b=c",
                "config": {"maxDepth": 7}
            })),
            &params(&[("maxDepth", "2")]),
        )
        .unwrap();
        assert_eq!(req.options.max_depth, Some(7));
    }

    #[test]
    fn post_target_parses_and_password_is_secret() {
        let req = from_post(
            &body(json!({
                "type": "version",
                "target": {"url": "http://remote:7777/bridge", "user": "u", "password": "p"}
            })),
            &no_params(),
        )
        .unwrap();
        let target = req.target.unwrap();
        assert_eq!(target.url.as_str(), "http://remote:7777/bridge");
        assert!(target.password.is_some());
    }

    #[test]
    fn post_notification_lifecycle_commands() {
        let req = from_post(
            &body(json!({"type": "notification", "command": "register"})),
            &no_params(),
        )
        .unwrap();
        assert!(matches!(
            req.kind,
            RequestKind::Notification(NotificationCommand::Register)
        ));

        let id = Uuid::new_v4();
        let req = from_post(
            &body(json!({
                "type": "notification",
                "command": "add",
                "client": id.to_string(),
                "mbean": "app:type=Worker,*",
                "filter": ["fault"]
            })),
            &no_params(),
        )
        .unwrap();
        assert!(matches!(
            req.kind,
            RequestKind::Notification(NotificationCommand::Add { .. })
        ));

        let err = from_post(
            &body(json!({"type": "notification", "command": "ping", "client": "not-a-uuid"})),
            &no_params(),
        )
        .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn post_path_as_string_or_array() {
        let req = from_post(
            &body(json!({"type": "list", "path": "java.lang/type=Memory"})),
            &no_params(),
        )
        .unwrap();
        assert_eq!(req.path_segments(), ["java.lang", "type=Memory"]);

        let req = from_post(
            &body(json!({"type": "list", "path": ["java.lang", "type=Memory"]})),
            &no_params(),
        )
        .unwrap();
        assert_eq!(req.path_segments(), ["java.lang", "type=Memory"]);
    }
}
