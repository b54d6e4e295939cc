//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use geoingest_importer::ImportError;
use geoingest_metadata::MetadataError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Body returned for a rejected input field.
#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub success: bool,
    pub code: &'static str,
    pub field: String,
    pub errors: Vec<String>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// A named request field failed validation.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("import error: {0}")]
    Import(#[from] ImportError),

    #[error("core error: {0}")]
    Core(geoingest_core::Error),
}

impl From<geoingest_core::Error> for ApiError {
    fn from(err: geoingest_core::Error) -> Self {
        match err {
            geoingest_core::Error::Validation { field, message } => {
                Self::Validation { field, message }
            }
            other => Self::Core(other),
        }
    }
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Validation { .. } => "invalid",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Internal(_) => "internal_error",
            Self::Metadata(_) => "metadata_error",
            Self::Import(e) => match e {
                ImportError::ResourceNotFound(_) | ImportError::ExecutionNotFound(_) => {
                    "not_found"
                }
                ImportError::InvalidFiles(_) => "invalid_files",
                _ => "import_error",
            },
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                MetadataError::Constraint(_) => StatusCode::CONFLICT,
                MetadataError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Import(e) => match e {
                ImportError::ResourceNotFound(_) | ImportError::ExecutionNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                ImportError::InvalidFiles(_) | ImportError::Core(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }
        match self {
            Self::Validation { field, message } => {
                let body = ValidationResponse {
                    success: false,
                    code: "invalid",
                    field,
                    errors: vec![message],
                };
                (status, Json(body)).into_response()
            }
            other => {
                let body = ErrorResponse {
                    code: other.code().to_string(),
                    message: other.to_string(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
