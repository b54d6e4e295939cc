//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid execution id: {0}")]
    InvalidExecutionId(String),

    #[error("invalid execution status: {0}")]
    InvalidStatus(String),

    #[error("invalid pipeline step: {0}")]
    InvalidStep(String),

    #[error("unknown handler: {0}")]
    UnknownHandler(String),

    #[error("invalid file role: {0}")]
    InvalidFileRole(String),

    /// A user-supplied option failed validation. `field` names the offending input.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a validation error for the given input field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field() {
        let err = Error::validation("store_spatial_files", "Must be a valid boolean.");
        assert_eq!(err.to_string(), "store_spatial_files: Must be a valid boolean.");
    }
}
