//! Schema definition repository.

use crate::error::MetadataResult;
use crate::models::{FieldRow, SchemaRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for dynamic schema definitions.
#[async_trait]
pub trait SchemaRepo: Send + Sync {
    /// Look up or atomically create the schema keyed by `(name, db_name)`.
    ///
    /// Runs in one transaction whose first statement is a conditional insert.
    /// `fields` are inserted only when that insert created the row, so a
    /// concurrent or repeated call never duplicates fields. Returns the
    /// persisted row and whether this call created it.
    async fn get_or_create_schema(
        &self,
        schema: &SchemaRow,
        fields: &[FieldRow],
    ) -> MetadataResult<(SchemaRow, bool)>;

    async fn get_schema(&self, schema_id: Uuid) -> MetadataResult<Option<SchemaRow>>;

    async fn get_schema_by_name(
        &self,
        name: &str,
        db_name: &str,
    ) -> MetadataResult<Option<SchemaRow>>;

    /// Fields of a schema ordered by position.
    async fn get_schema_fields(&self, schema_id: Uuid) -> MetadataResult<Vec<FieldRow>>;

    async fn list_schemas(&self) -> MetadataResult<Vec<SchemaRow>>;
}
