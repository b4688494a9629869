//! Error types for the IAM policy SDK.

use thiserror::Error;

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Errors that can occur while parsing or evaluating a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy payload could not be parsed into an expression.
    #[error("Failed to parse policy: {0}")]
    ParseError(String),

    /// Operand shape does not match what the operator requires.
    ///
    /// Aborts the whole evaluation; there is no partial result.
    #[error("Policy validation error: {0}")]
    ValidationError(String),

    /// Operator has no registered comparator.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Required field is missing from a request or payload.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid field value.
    #[error("Invalid field value for '{field}': {message}")]
    InvalidFieldValue { field: String, message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Canonicalization error.
    #[error("Canonicalization error: {0}")]
    CanonicalizationError(String),

    /// The policy source (authorization service transport) failed.
    #[error("Policy source error: {0}")]
    SourceError(String),
}

impl PolicyError {
    pub(crate) fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        PolicyError::InvalidFieldValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PolicyError {
    fn from(err: serde_yaml::Error) -> Self {
        PolicyError::ParseError(err.to_string())
    }
}

impl From<regex::Error> for PolicyError {
    fn from(err: regex::Error) -> Self {
        PolicyError::ParseError(format!("Invalid regex: {}", err))
    }
}

impl From<std::fmt::Error> for PolicyError {
    fn from(err: std::fmt::Error) -> Self {
        PolicyError::CanonicalizationError(err.to_string())
    }
}
