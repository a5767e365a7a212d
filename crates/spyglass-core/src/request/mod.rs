// ── Typed request model ──
//
// Every wire request parses into a `Request`: a verb-tagged payload
// plus the fields all verbs share (inner path, processing options,
// optional proxy target). The original wire field names (`mbean`,
// `attribute`, `operation`, ...) are a client-compatibility contract
// and are preserved in the JSON echo.

pub mod factory;

use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{json, Value as JsonValue};
use url::Url;
use uuid::Uuid;

use spyglass_bus::ObjectName;

use crate::path::join_path;

/// Protocol verb tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Read,
    Write,
    Exec,
    List,
    Search,
    Version,
    Notification,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Exec => "exec",
            Self::List => "list",
            Self::Search => "search",
            Self::Version => "version",
            Self::Notification => "notification",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "exec" => Some(Self::Exec),
            "list" => Some(Self::List),
            "search" => Some(Self::Search),
            "version" => Some(Self::Version),
            "notification" => Some(Self::Notification),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which attributes a read request addresses.
///
/// `All` expands to every readable attribute; `Many` switches the
/// result into a map keyed by attribute name, regardless of length.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeSpec {
    All,
    One(String),
    Many(Vec<String>),
}

impl AttributeSpec {
    /// Whether the result is the keyed multi-attribute form.
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::All | Self::Many(_))
    }

    /// The requested names, or `None` for "all readable".
    pub fn names(&self) -> Option<Vec<&str>> {
        match self {
            Self::All => None,
            Self::One(name) => Some(vec![name.as_str()]),
            Self::Many(names) => Some(names.iter().map(String::as_str).collect()),
        }
    }
}

/// How per-attribute failures render inside a multi-attribute read.
#[derive(Clone, Default)]
pub enum ValueFaultPolicy {
    /// Rethrow: the first failure fails the whole request.
    #[default]
    Strict,
    /// Insert the error's string form as the attribute value; during
    /// path descent a missing step becomes `null`.
    Ignore,
    /// A supplied transformer decides the replacement value.
    Custom(Arc<dyn Fn(&crate::error::ProtocolError) -> JsonValue + Send + Sync>),
}

impl ValueFaultPolicy {
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl fmt::Debug for ValueFaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("Strict"),
            Self::Ignore => f.write_str("Ignore"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Stacktrace inclusion policy for error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackTracePolicy {
    #[default]
    Always,
    Never,
    /// Only when the failure originated inside the invoked target.
    Runtime,
}

/// Per-request processing options, typically from query parameters
/// (GET) or the `config` object (POST); body wins over query.
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub max_depth: Option<usize>,
    pub max_collection_size: Option<usize>,
    pub max_objects: Option<usize>,
    pub fault: ValueFaultPolicy,
    pub include_stacktrace: StackTracePolicy,
    pub serialize_exception: bool,
    pub canonical_naming: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_collection_size: None,
            max_objects: None,
            fault: ValueFaultPolicy::default(),
            include_stacktrace: StackTracePolicy::default(),
            serialize_exception: false,
            canonical_naming: true,
        }
    }
}

/// Proxy-mode target: a remote agent URL plus credentials.
///
/// The core parses, validates and echoes targets; actually proxying is
/// the business of a registered dispatcher.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub url: Url,
    pub user: Option<String>,
    pub password: Option<SecretString>,
}

impl TargetConfig {
    /// Echo form. Credentials never leave the process.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        obj.insert("url".to_owned(), json!(self.url.as_str()));
        if let Some(user) = &self.user {
            obj.insert("user".to_owned(), json!(user));
        }
        JsonValue::Object(obj)
    }
}

/// Notification sub-verbs.
#[derive(Debug, Clone)]
pub enum NotificationCommand {
    Register,
    Unregister {
        client: Uuid,
    },
    Add {
        client: Uuid,
        name: ObjectName,
        kinds: Option<Vec<String>>,
    },
    Remove {
        client: Uuid,
        listener: Uuid,
    },
    Ping {
        client: Uuid,
    },
    List {
        client: Uuid,
    },
    Pull {
        client: Uuid,
    },
}

impl NotificationCommand {
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Unregister { .. } => "unregister",
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Ping { .. } => "ping",
            Self::List { .. } => "list",
            Self::Pull { .. } => "pull",
        }
    }
}

/// Verb-specific request payload.
#[derive(Debug, Clone)]
pub enum RequestKind {
    Read {
        name: ObjectName,
        attributes: AttributeSpec,
    },
    Write {
        name: ObjectName,
        attribute: String,
        value: JsonValue,
    },
    Exec {
        name: ObjectName,
        operation: String,
        arguments: Vec<JsonValue>,
    },
    List,
    Search {
        pattern: ObjectName,
    },
    Version,
    Notification(NotificationCommand),
}

/// How the request arrived; GET carries extra structural restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Get,
    Post,
}

/// A fully parsed protocol request.
#[derive(Debug, Clone)]
pub struct Request {
    pub kind: RequestKind,
    pub path: Option<Vec<String>>,
    pub options: ProcessingOptions,
    pub target: Option<TargetConfig>,
    pub origin: RequestOrigin,
}

impl Request {
    pub fn verb(&self) -> Verb {
        match &self.kind {
            RequestKind::Read { .. } => Verb::Read,
            RequestKind::Write { .. } => Verb::Write,
            RequestKind::Exec { .. } => Verb::Exec,
            RequestKind::List => Verb::List,
            RequestKind::Search { .. } => Verb::Search,
            RequestKind::Version => Verb::Version,
            RequestKind::Notification(_) => Verb::Notification,
        }
    }

    /// The addressed object name, when the verb has one.
    pub fn object_name(&self) -> Option<&ObjectName> {
        match &self.kind {
            RequestKind::Read { name, .. }
            | RequestKind::Write { name, .. }
            | RequestKind::Exec { name, .. } => Some(name),
            RequestKind::Search { pattern } => Some(pattern),
            RequestKind::Notification(NotificationCommand::Add { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// The inner path as segments (empty slice when absent).
    pub fn path_segments(&self) -> &[String] {
        self.path.as_deref().unwrap_or(&[])
    }

    /// The request echo placed into every response envelope.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        obj.insert("type".to_owned(), json!(self.verb().as_str()));

        match &self.kind {
            RequestKind::Read { name, attributes } => {
                obj.insert("mbean".to_owned(), json!(name.to_string()));
                match attributes {
                    AttributeSpec::All => {}
                    AttributeSpec::One(attr) => {
                        obj.insert("attribute".to_owned(), json!(attr));
                    }
                    AttributeSpec::Many(attrs) => {
                        obj.insert("attribute".to_owned(), json!(attrs));
                    }
                }
            }
            RequestKind::Write {
                name,
                attribute,
                value,
            } => {
                obj.insert("mbean".to_owned(), json!(name.to_string()));
                obj.insert("attribute".to_owned(), json!(attribute));
                obj.insert("value".to_owned(), value.clone());
            }
            RequestKind::Exec {
                name,
                operation,
                arguments,
            } => {
                obj.insert("mbean".to_owned(), json!(name.to_string()));
                obj.insert("operation".to_owned(), json!(operation));
                if !arguments.is_empty() {
                    obj.insert("arguments".to_owned(), JsonValue::Array(arguments.clone()));
                }
            }
            RequestKind::List | RequestKind::Version => {}
            RequestKind::Search { pattern } => {
                obj.insert("mbean".to_owned(), json!(pattern.to_string()));
            }
            RequestKind::Notification(command) => {
                obj.insert("command".to_owned(), json!(command.command_name()));
                match command {
                    NotificationCommand::Register => {}
                    NotificationCommand::Unregister { client }
                    | NotificationCommand::Ping { client }
                    | NotificationCommand::List { client }
                    | NotificationCommand::Pull { client } => {
                        obj.insert("client".to_owned(), json!(client.to_string()));
                    }
                    NotificationCommand::Add {
                        client,
                        name,
                        kinds,
                    } => {
                        obj.insert("client".to_owned(), json!(client.to_string()));
                        obj.insert("mbean".to_owned(), json!(name.to_string()));
                        if let Some(kinds) = kinds {
                            obj.insert("filter".to_owned(), json!(kinds));
                        }
                    }
                    NotificationCommand::Remove { client, listener } => {
                        obj.insert("client".to_owned(), json!(client.to_string()));
                        obj.insert("listener".to_owned(), json!(listener.to_string()));
                    }
                }
            }
        }

        if let Some(path) = &self.path {
            obj.insert("path".to_owned(), json!(join_path(path)));
        }
        if let Some(target) = &self.target {
            obj.insert("target".to_owned(), target.to_json());
        }
        JsonValue::Object(obj)
    }
}
