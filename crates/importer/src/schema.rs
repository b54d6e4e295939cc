//! Dynamic schema builder.
//!
//! Turns the field and geometry metadata of a source layer into a persisted
//! schema definition, then materializes a [`DynamicModel`] over it. Schemas are
//! keyed by `(name, storage target)` and created with an atomic get-or-create,
//! so building the same layer twice, or from two workers at once, yields one
//! definition.

use crate::error::{ImportError, ImportResult};
use geoingest_core::mapping::{map_field_type, map_geometry_type};
use geoingest_core::{
    DEFAULT_STORAGE_TARGET, DEFAULT_TEXT_MAX_LENGTH, FieldClass, FieldDefinition, GeometryKind,
    LayerMetadata, launder_identifier,
};
use geoingest_metadata::MetadataStore;
use geoingest_metadata::models::{FieldRow, SchemaRow};
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Queryable model bound to a persisted schema definition.
#[derive(Clone, Debug)]
pub struct DynamicModel {
    pub schema: SchemaRow,
    pub fields: Vec<FieldDefinition>,
}

impl DynamicModel {
    pub fn table_name(&self) -> &str {
        &self.schema.name
    }

    pub fn geometry_field(&self) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.class.is_geometry())
    }

    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        self.geometry_field().and_then(FieldDefinition::geometry_kind)
    }

    fn qualified_table(&self, db_schema: Option<&str>) -> String {
        match db_schema {
            Some(schema) => format!(
                "{}.{}",
                quote_ident(schema),
                quote_ident(self.table_name())
            ),
            None => quote_ident(self.table_name()),
        }
    }

    /// Select every modelled column, optionally bounded.
    pub fn select_sql(&self, db_schema: Option<&str>, limit: Option<u32>) -> String {
        let columns = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields
                .iter()
                .map(|f| quote_ident(&f.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {columns} FROM {}", self.qualified_table(db_schema));
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }
}

/// Double-quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds and loads schema definitions.
pub struct SchemaBuilder {
    metadata: Arc<dyn MetadataStore>,
    storage_target: String,
    text_max_length: i64,
}

impl SchemaBuilder {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            metadata,
            storage_target: DEFAULT_STORAGE_TARGET.to_string(),
            text_max_length: DEFAULT_TEXT_MAX_LENGTH,
        }
    }

    pub fn with_text_max_length(mut self, max_length: i64) -> Self {
        self.text_max_length = max_length;
        self
    }

    pub fn with_storage_target(mut self, target: impl Into<String>) -> Self {
        self.storage_target = target.into();
        self
    }

    pub fn storage_target(&self) -> &str {
        &self.storage_target
    }

    /// Translate source fields into field definitions without touching storage.
    pub fn translate(&self, layer: &LayerMetadata) -> ImportResult<Vec<FieldDefinition>> {
        let mut seen = HashSet::new();
        let mut definitions = Vec::with_capacity(layer.fields.len() + 1);

        let geometry_column = layer.is_spatial().then(|| layer.geometry_column_name());

        for field in &layer.fields {
            let mapping =
                map_field_type(&field.type_name).ok_or_else(|| ImportError::UnmappedFieldType {
                    layer: layer.name.clone(),
                    field: field.name.clone(),
                    type_name: field.type_name.clone(),
                })?;
            let name = launder_identifier(&field.name);
            if name.is_empty() || geometry_column.as_deref() == Some(name.as_str()) {
                return Err(ImportError::UnexpectedLayerStructure(format!(
                    "field '{}' in layer '{}' has no usable column name",
                    field.name, layer.name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(ImportError::UnexpectedLayerStructure(format!(
                    "layer '{}' has more than one field named '{name}' after normalization",
                    layer.name
                )));
            }
            definitions.push(FieldDefinition {
                max_length: mapping.class.is_text().then_some(self.text_max_length),
                name,
                class: mapping.class,
                nullable: mapping.nullable,
            });
        }

        if let Some(column) = geometry_column {
            let type_name = layer.geometry_type.as_deref().unwrap_or_default();
            let kind = map_geometry_type(type_name).ok_or_else(|| {
                ImportError::UnmappedGeometryType {
                    layer: layer.name.clone(),
                    type_name: type_name.to_string(),
                }
            })?;
            definitions.push(FieldDefinition {
                name: column,
                class: FieldClass::Geometry(kind),
                nullable: true,
                max_length: None,
            });
        }

        Ok(definitions)
    }

    /// Ensure a schema exists for `layer` and return its model.
    ///
    /// Translation runs first, so an unmapped type fails before anything is
    /// persisted. When the schema already exists it is returned unchanged.
    pub async fn build_schema(&self, layer: &LayerMetadata) -> ImportResult<DynamicModel> {
        let definitions = self.translate(layer)?;
        self.get_or_create(&layer.schema_name(), definitions).await
    }

    /// Create the schema for a copied table from the source's definitions.
    pub async fn copy_schema(
        &self,
        source_name: &str,
        target_name: &str,
    ) -> ImportResult<DynamicModel> {
        let source = self.load(source_name).await?.ok_or_else(|| {
            ImportError::UnexpectedLayerStructure(format!(
                "no schema definition for '{source_name}'"
            ))
        })?;
        self.get_or_create(&launder_identifier(target_name), source.fields)
            .await
    }

    /// Load a persisted schema by name from this builder's storage target.
    pub async fn load(&self, name: &str) -> ImportResult<Option<DynamicModel>> {
        let Some(schema) = self
            .metadata
            .get_schema_by_name(name, &self.storage_target)
            .await?
        else {
            return Ok(None);
        };
        let fields = self.metadata.get_schema_fields(schema.schema_id).await?;
        Ok(Some(DynamicModel {
            schema,
            fields: field_definitions(&fields)?,
        }))
    }

    async fn get_or_create(
        &self,
        name: &str,
        definitions: Vec<FieldDefinition>,
    ) -> ImportResult<DynamicModel> {
        let schema = SchemaRow {
            schema_id: Uuid::new_v4(),
            name: name.to_string(),
            db_name: self.storage_target.clone(),
            managed: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let rows: Vec<FieldRow> = definitions
            .iter()
            .enumerate()
            .map(|(position, def)| FieldRow {
                schema_id: schema.schema_id,
                position: position as i32,
                name: def.name.clone(),
                class_name: def.class.class_name(),
                nullable: def.nullable,
                max_length: def.max_length,
            })
            .collect();

        let (schema, created) = self.metadata.get_or_create_schema(&schema, &rows).await?;

        if created {
            crate::metrics::SCHEMAS_CREATED.inc();
            tracing::info!(
                schema = %schema.name,
                db_name = %schema.db_name,
                fields = definitions.len(),
                "created schema definition"
            );
            return Ok(DynamicModel {
                schema,
                fields: definitions,
            });
        }

        crate::metrics::SCHEMAS_REUSED.inc();
        tracing::debug!(schema = %schema.name, "reusing existing schema definition");
        let fields = self.metadata.get_schema_fields(schema.schema_id).await?;
        Ok(DynamicModel {
            schema,
            fields: field_definitions(&fields)?,
        })
    }
}

fn field_definitions(rows: &[FieldRow]) -> ImportResult<Vec<FieldDefinition>> {
    rows.iter()
        .map(|row| {
            Ok(FieldDefinition {
                name: row.name.clone(),
                class: row.class_name.parse()?,
                nullable: row.nullable,
                max_length: row.max_length,
            })
        })
        .collect()
}
