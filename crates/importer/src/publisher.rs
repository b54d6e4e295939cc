//! Publish step: exposes imported tables as layers.

use crate::error::{ImportError, ImportResult};
use crate::schema::SchemaBuilder;
use async_trait::async_trait;
use geoingest_core::PublishedLayer;
use std::sync::Arc;

/// Makes imported tables available to map consumers.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, layers: &[String]) -> ImportResult<Vec<PublishedLayer>>;
}

/// Publishes every layer that has a persisted schema definition.
pub struct CatalogPublisher {
    schemas: Arc<SchemaBuilder>,
    /// Datastore schema the converter writes into, if not the search path.
    db_schema: Option<String>,
}

impl CatalogPublisher {
    pub fn new(schemas: Arc<SchemaBuilder>, db_schema: Option<String>) -> Self {
        Self { schemas, db_schema }
    }
}

#[async_trait]
impl Publisher for CatalogPublisher {
    async fn publish(&self, layers: &[String]) -> ImportResult<Vec<PublishedLayer>> {
        if layers.is_empty() {
            return Err(ImportError::UnexpectedLayerStructure(
                "no layers were imported".to_string(),
            ));
        }

        let mut published = Vec::with_capacity(layers.len());
        for name in layers {
            let model = self.schemas.load(name).await?.ok_or_else(|| {
                ImportError::UnexpectedLayerStructure(format!(
                    "layer '{name}' has no schema definition"
                ))
            })?;
            published.push(PublishedLayer {
                name: model.table_name().to_string(),
                table: format!("{}.{}", self.schemas.storage_target(), model.table_name()),
                geometry_column: model.geometry_field().map(|f| f.name.clone()),
                geometry_type: model.geometry_kind(),
                query: model.select_sql(self.db_schema.as_deref(), None),
            });
        }
        tracing::debug!(layers = published.len(), "published layers");
        Ok(published)
    }
}
