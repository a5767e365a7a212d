use thiserror::Error;

/// Error type for every operation against a bean registry.
///
/// The protocol layer maps these onto HTTP-like status codes, so the
/// taxonomy here mirrors the wire contract: "not found" variants become
/// 404, `BeanFailure` becomes 500 with the cause unwrapped one level,
/// `InvalidValue` becomes 400.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No bean is registered under the given name.
    #[error("no bean registered as {name}")]
    InstanceNotFound { name: String },

    /// A bean is already registered under the given name.
    #[error("bean {name} is already registered")]
    InstanceAlreadyExists { name: String },

    /// The bean exists but has no such attribute.
    #[error("bean {name} has no attribute {attribute}")]
    AttributeNotFound { name: String, attribute: String },

    /// The bean exists but has no such operation (name + arity).
    #[error("bean {name} has no operation {operation}")]
    OperationNotFound { name: String, operation: String },

    /// The attribute exists but is not readable.
    #[error("attribute {attribute} of {name} is not readable")]
    NotReadable { name: String, attribute: String },

    /// The attribute exists but is not writable.
    #[error("attribute {attribute} of {name} is not writable")]
    NotWritable { name: String, attribute: String },

    /// A supplied value does not fit the declared type.
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    /// Object name syntax error.
    #[error("malformed object name '{name}': {reason}")]
    MalformedName { name: String, reason: String },

    /// The bean's own attribute/operation code failed.
    ///
    /// `cause` carries the bean's underlying failure, unwrapped one
    /// level, for the error record on the wire.
    #[error("bean operation failed: {message}")]
    BeanFailure {
        message: String,
        cause: Option<String>,
    },

    /// I/O against the registry failed (includes interrupted calls).
    #[error("registry I/O error: {0}")]
    Io(String),
}

impl RegistryError {
    /// Returns `true` for the "instance not found" case that multi-registry
    /// dispatch treats as "try the next registry".
    pub fn is_instance_not_found(&self) -> bool {
        matches!(self, Self::InstanceNotFound { .. })
    }

    /// Returns `true` for any missing-target case (instance, attribute
    /// or operation).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::InstanceNotFound { .. }
                | Self::AttributeNotFound { .. }
                | Self::OperationNotFound { .. }
        )
    }

    /// Short type tag used in wire-level error records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InstanceNotFound { .. } => "InstanceNotFound",
            Self::InstanceAlreadyExists { .. } => "InstanceAlreadyExists",
            Self::AttributeNotFound { .. } => "AttributeNotFound",
            Self::OperationNotFound { .. } => "OperationNotFound",
            Self::NotReadable { .. } => "NotReadable",
            Self::NotWritable { .. } => "NotWritable",
            Self::InvalidValue { .. } => "InvalidValue",
            Self::MalformedName { .. } => "MalformedObjectName",
            Self::BeanFailure { .. } => "BeanFailure",
            Self::Io(_) => "RegistryIo",
        }
    }
}
