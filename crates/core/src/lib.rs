//! Core domain types and shared logic for the geospatial ingestion service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Execution identifiers, statuses and pipeline steps
//! - Persisted handler references
//! - Uploaded file sets and upload options
//! - Source layer metadata and field definitions
//! - Static type-mapping tables
//! - Configuration

pub mod config;
pub mod error;
pub mod execution;
pub mod files;
pub mod handler_key;
pub mod layer;
pub mod mapping;
pub mod schema;

pub use error::{Error, Result};
pub use execution::{
    COPY_TASKS, ExecutionAction, ExecutionId, ExecutionStatus, ExecutionStatusResponse,
    IMPORT_TASKS, ImportStage, PipelineStep,
};
pub use files::{FileRole, ImportOptions, ResourceOverrides, UploadFiles, parse_bool_option};
pub use handler_key::HandlerKind;
pub use layer::{LayerMetadata, SourceField, launder_identifier};
pub use mapping::{DEFAULT_TEXT_MAX_LENGTH, FieldClass, FieldMapping, GeometryKind};
pub use schema::{DEFAULT_STORAGE_TARGET, FieldDefinition, PublishedLayer};
