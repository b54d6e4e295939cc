//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Executions
// =============================================================================

/// Execution request record, one per accepted upload or copy.
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRow {
    pub exec_id: Uuid,
    /// `import` or `copy`.
    pub action: String,
    /// `created`, `running`, `success` or `failed`.
    pub status: String,
    /// Pipeline step last started; resume picks up here.
    pub step: String,
    /// Observable state-machine stage (`schema_setup`, `published`, ...).
    pub stage: String,
    /// Registry key of the handler driving this execution.
    pub handler: Option<String>,
    pub input_json: String,
    pub output_json: Option<String>,
    /// Newline-terminated log lines, oldest first.
    pub log: String,
    pub created_at: OffsetDateTime,
    pub last_updated: OffsetDateTime,
}

/// Fields changed together by one tracker update.
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub status: String,
    pub step: String,
    pub stage: String,
    pub log_line: String,
    pub last_updated: OffsetDateTime,
}

// =============================================================================
// Schema definitions
// =============================================================================

/// Schema definition for one source layer, unique per `(name, db_name)`.
#[derive(Debug, Clone, FromRow)]
pub struct SchemaRow {
    pub schema_id: Uuid,
    pub name: String,
    /// Storage target the schema is bound to.
    pub db_name: String,
    /// Unmanaged schemas describe tables created by the converter, not by us.
    pub managed: bool,
    pub created_at: OffsetDateTime,
}

/// Field definition owned by a schema. Immutable once inserted.
#[derive(Debug, Clone, FromRow)]
pub struct FieldRow {
    pub schema_id: Uuid,
    pub position: i32,
    pub name: String,
    /// Persisted `FieldClass` name, e.g. `char` or `geometry:multi_polygon`.
    pub class_name: String,
    pub nullable: bool,
    pub max_length: Option<i64>,
}

// =============================================================================
// Catalog resources
// =============================================================================

/// Catalog resource registered for a published layer.
#[derive(Debug, Clone, FromRow)]
pub struct ResourceRow {
    pub resource_id: Uuid,
    /// Execution that registered the resource; `None` for metadata-only copies.
    pub execution_id: Option<Uuid>,
    pub name: String,
    pub title: String,
    /// Fully qualified datastore table.
    pub table_name: String,
    pub geometry_column: Option<String>,
    pub geometry_type: Option<String>,
    /// Retained upload files as JSON, when `store_spatial_files` was set.
    pub files_json: Option<String>,
    /// Resource this one was copied from.
    pub source_resource_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Reference from a resource to the handler that produced it.
#[derive(Debug, Clone, FromRow)]
pub struct ResourceHandlerInfoRow {
    pub resource_id: Uuid,
    pub handler_key: String,
    pub created_at: OffsetDateTime,
}
