use spyglass_bus::RegistryError;
use thiserror::Error;

/// Protocol-level error taxonomy.
///
/// Every failure inside a single request execution is funneled into one
/// of these variants; the HTTP facade renders them as error envelopes
/// and never lets them escape as panics. The variant determines the
/// HTTP-like status code and the `error_type` tag on the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Parse or structural problem with the request itself (400).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Name, attribute, instance or path step is missing (404).
    ///
    /// `kind` is the wire-level `error_type` tag, e.g.
    /// `InstanceNotFound` or `AttributeNotFound`.
    #[error("{message}")]
    NotFound {
        kind: &'static str,
        message: String,
    },

    /// Denied by the restrictor (403; stacktrace elided on the wire).
    #[error("access denied: {0}")]
    Forbidden(String),

    /// The invoked bean attribute/operation itself failed (500).
    /// `cause` is the bean's underlying failure, unwrapped one level.
    #[error("{message}")]
    TargetFailure {
        message: String,
        cause: Option<String>,
    },

    /// I/O against a registry, including interrupted calls (500).
    #[error("registry I/O error: {0}")]
    Io(String),

    /// Everything unexpected (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    pub fn instance_not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "InstanceNotFound",
            message: message.into(),
        }
    }

    pub fn attribute_not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "AttributeNotFound",
            message: message.into(),
        }
    }

    pub fn path_not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "PathNotFound",
            message: message.into(),
        }
    }

    /// The HTTP-like status code for the envelope.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Forbidden(_) => 403,
            Self::TargetFailure { .. } | Self::Io(_) | Self::Internal(_) => 500,
        }
    }

    /// The `error_type` tag for the envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::NotFound { kind, .. } => kind,
            Self::Forbidden(_) => "Forbidden",
            Self::TargetFailure { .. } => "TargetFailure",
            Self::Io(_) => "RegistryIo",
            Self::Internal(_) => "InternalError",
        }
    }

    /// The unwrapped cause, when one exists.
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::TargetFailure { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Whether this is the "instance not found" case that
    /// multi-registry dispatch treats as "try the next registry".
    pub fn is_instance_not_found(&self) -> bool {
        matches!(self, Self::NotFound { kind, .. } if *kind == "InstanceNotFound")
    }
}

impl From<RegistryError> for ProtocolError {
    fn from(err: RegistryError) -> Self {
        match &err {
            RegistryError::InstanceNotFound { .. }
            | RegistryError::AttributeNotFound { .. }
            | RegistryError::OperationNotFound { .. }
            | RegistryError::NotReadable { .. }
            | RegistryError::NotWritable { .. } => Self::NotFound {
                kind: err.kind(),
                message: err.to_string(),
            },
            RegistryError::InvalidValue { .. } | RegistryError::MalformedName { .. } => {
                Self::InvalidRequest(err.to_string())
            }
            RegistryError::BeanFailure { message, cause } => Self::TargetFailure {
                message: message.clone(),
                cause: cause.clone(),
            },
            RegistryError::Io(msg) => Self::Io(msg.clone()),
            RegistryError::InstanceAlreadyExists { .. } => Self::Internal(err.to_string()),
        }
    }
}
