//! Import pipeline error types.

use geoingest_metadata::MetadataError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving, importing or copying a resource.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unmapped field type '{type_name}' for field '{field}' in layer '{layer}'")]
    UnmappedFieldType {
        layer: String,
        field: String,
        type_name: String,
    },

    #[error("unmapped geometry type '{type_name}' in layer '{layer}'")]
    UnmappedGeometryType { layer: String, type_name: String },

    #[error("invalid files: {0}")]
    InvalidFiles(String),

    #[error("layer inspection failed for {source_uri}: {message}")]
    Inspection { source_uri: String, message: String },

    /// The converter ran and was judged to have failed.
    #[error("{program} failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    CommandTimeout { program: String, timeout: Duration },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown handler: {0}")]
    UnknownHandler(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("unexpected layer structure: {0}")]
    UnexpectedLayerStructure(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Core(#[from] geoingest_core::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline step panicked: {0}")]
    StepPanicked(String),

    #[error("pipeline is shut down")]
    QueueClosed,
}

impl ImportError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnmappedFieldType { .. } | Self::UnmappedGeometryType { .. } => "unmapped_type",
            Self::InvalidFiles(_) => "invalid_files",
            Self::Inspection { .. } => "inspection",
            Self::CommandFailed { .. } => "command_failed",
            Self::CommandTimeout { .. } => "command_timeout",
            Self::Spawn { .. } => "spawn",
            Self::UnknownHandler(_) => "unknown_handler",
            Self::ExecutionNotFound(_) | Self::ResourceNotFound(_) => "not_found",
            Self::UnexpectedLayerStructure(_) => "layer_structure",
            Self::Metadata(_) => "metadata",
            Self::Core(_) => "core",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::StepPanicked(_) => "panic",
            Self::QueueClosed => "queue_closed",
        }
    }
}

/// Result type for import operations.
pub type ImportResult<T> = std::result::Result<T, ImportError>;
