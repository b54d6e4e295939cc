//! Field definitions materialized for a source layer.

use crate::mapping::{FieldClass, GeometryKind};
use serde::{Deserialize, Serialize};

/// Storage target used for imported layer schemas.
pub const DEFAULT_STORAGE_TARGET: &str = "datastore";

/// A typed column of a schema definition. Immutable once persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub class: FieldClass,
    pub nullable: bool,
    /// Maximum length for text fields.
    pub max_length: Option<i64>,
}

impl FieldDefinition {
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        match self.class {
            FieldClass::Geometry(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Layer published from an execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedLayer {
    pub name: String,
    /// Fully qualified table, `<storage target>.<name>`.
    pub table: String,
    pub geometry_column: Option<String>,
    pub geometry_type: Option<GeometryKind>,
    /// Query selecting the modelled columns of the published table.
    #[serde(default)]
    pub query: String,
}
