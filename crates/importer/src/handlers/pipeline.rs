//! Step implementations shared by every vector handler.

use crate::command::CommandRunner;
use crate::context::StepContext;
use crate::error::{ImportError, ImportResult};
use crate::executor::{ConversionOptions, ImportExecutor};
use crate::inspect::{LayerInspector, OgrInfoInspector};
use crate::publisher::{CatalogPublisher, Publisher};
use crate::schema::SchemaBuilder;
use crate::tracker::ExecutionTracker;
use geoingest_core::config::{DatastoreConfig, ImporterConfig};
use geoingest_core::{ExecutionStatus, HandlerKind, ImportStage, PipelineStep, launder_identifier};
use geoingest_metadata::MetadataStore;
use geoingest_metadata::models::ResourceRow;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Collaborators used by the import and copy steps.
pub struct VectorPipeline {
    inspector: Arc<dyn LayerInspector>,
    schemas: Arc<SchemaBuilder>,
    executor: Arc<ImportExecutor>,
    publisher: Arc<dyn Publisher>,
    tracker: ExecutionTracker,
    metadata: Arc<dyn MetadataStore>,
}

impl VectorPipeline {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        runner: Arc<dyn CommandRunner>,
        datastore: DatastoreConfig,
        config: &ImporterConfig,
    ) -> Self {
        let schemas = Arc::new(
            SchemaBuilder::new(metadata.clone())
                .with_text_max_length(config.text_max_length)
                .with_storage_target(config.storage_target.clone()),
        );
        Self {
            inspector: Arc::new(OgrInfoInspector::new(runner.clone(), config)),
            publisher: Arc::new(CatalogPublisher::new(schemas.clone(), datastore.schema.clone())),
            executor: Arc::new(ImportExecutor::new(runner, datastore, config)),
            schemas,
            tracker: ExecutionTracker::new(metadata.clone()),
            metadata,
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn LayerInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn schemas(&self) -> &SchemaBuilder {
        &self.schemas
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    /// Build a schema for every layer of `source`, then bulk load it.
    pub async fn import_layers(&self, source: &str, ctx: &mut StepContext) -> ImportResult<String> {
        let id = ctx.execution_id;
        let layers = self.inspector.inspect(source).await?;
        if layers.is_empty() {
            return Err(ImportError::UnexpectedLayerStructure(format!(
                "no layers found in {source}"
            )));
        }

        let mut names = Vec::with_capacity(layers.len());
        for layer in &layers {
            self.tracker
                .update(
                    id,
                    ExecutionStatus::Running,
                    PipelineStep::ImportResource,
                    ImportStage::SchemaSetup,
                    &format!("setting up dynamic model for layer {}", layer.name),
                )
                .await?;
            let model = self.schemas.build_schema(layer).await?;
            tracing::info!(
                execution_id = %id,
                layer = %layer.name,
                schema = %model.table_name(),
                "layer schema ready"
            );
            names.push(model.table_name().to_string());
        }

        self.tracker
            .update(
                id,
                ExecutionStatus::Running,
                PipelineStep::ImportResource,
                ImportStage::Importing,
                &format!("importing {} layer(s) into the datastore", names.len()),
            )
            .await?;
        let stdout = self
            .executor
            .run_import(source, &ConversionOptions::default())
            .await?;

        ctx.output.layers = names;
        ctx.output.converter_output = Some(stdout.clone());
        Ok(stdout)
    }

    pub async fn publish(&self, ctx: &mut StepContext) -> ImportResult<()> {
        ctx.output.published = self.publisher.publish(&ctx.output.layers).await?;
        Ok(())
    }

    /// Register one catalog resource per published layer.
    pub async fn create_resources(&self, kind: HandlerKind, ctx: &mut StepContext) -> ImportResult<()> {
        let keep_files = ctx.input.options.store_spatial_files;
        let files_json = if keep_files {
            Some(serde_json::to_string(&ctx.input.files)?)
        } else {
            None
        };

        for layer in &ctx.output.published {
            let row = ResourceRow {
                resource_id: Uuid::new_v4(),
                execution_id: Some(*ctx.execution_id.as_uuid()),
                name: layer.name.clone(),
                title: ctx
                    .input
                    .title_override()
                    .unwrap_or(layer.name.as_str())
                    .to_string(),
                table_name: layer.table.clone(),
                geometry_column: layer.geometry_column.clone(),
                geometry_type: layer.geometry_type.map(|k| k.as_str().to_string()),
                files_json: files_json.clone(),
                source_resource_id: None,
                created_at: OffsetDateTime::now_utc(),
            };
            let resource = self.register(kind, &row).await?;
            if !ctx.output.resources.contains(&resource.resource_id) {
                ctx.output.resources.push(resource.resource_id);
            }
        }

        if !keep_files {
            if let Some(dir) = &ctx.input.upload_dir {
                match tokio::fs::remove_dir_all(dir).await {
                    Ok(()) => tracing::debug!(dir = %dir.display(), "removed staged upload"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    async fn source_resource(&self, ctx: &StepContext) -> ImportResult<ResourceRow> {
        let id = ctx
            .input
            .source_resource_id
            .ok_or_else(|| ImportError::ResourceNotFound("no source resource".to_string()))?;
        self.metadata
            .get_resource(id)
            .await?
            .ok_or_else(|| ImportError::ResourceNotFound(id.to_string()))
    }

    /// Resolve the source layer and pick the name of the copy.
    pub async fn start_copy(&self, ctx: &mut StepContext) -> ImportResult<()> {
        let source = self.source_resource(ctx).await?;
        let target = launder_identifier(&format!("{}_{}", source.name, ctx.execution_id.short()));
        tracing::info!(
            execution_id = %ctx.execution_id,
            source = %source.name,
            target = %target,
            "copying resource"
        );
        ctx.output.source_layer = Some(source.name);
        ctx.output.target_layer = Some(target);
        Ok(())
    }

    fn copy_names(ctx: &StepContext) -> ImportResult<(String, String)> {
        match (&ctx.output.source_layer, &ctx.output.target_layer) {
            (Some(source), Some(target)) => Ok((source.clone(), target.clone())),
            _ => Err(ImportError::UnexpectedLayerStructure(
                "copy source and target are not resolved".to_string(),
            )),
        }
    }

    pub async fn copy_schema(&self, ctx: &mut StepContext) -> ImportResult<()> {
        let (source, target) = Self::copy_names(ctx)?;
        let model = self.schemas.copy_schema(&source, &target).await?;
        ctx.output.layers = vec![model.table_name().to_string()];
        Ok(())
    }

    pub async fn copy_data(&self, ctx: &mut StepContext) -> ImportResult<()> {
        let (source, target) = Self::copy_names(ctx)?;
        let stdout = self.executor.copy_table(&source, &target).await?;
        ctx.output.converter_output = Some(stdout);
        Ok(())
    }

    /// Register the copied layer as a new resource bound to the same handler.
    pub async fn copy_resource(&self, kind: HandlerKind, ctx: &mut StepContext) -> ImportResult<()> {
        let source = self.source_resource(ctx).await?;
        let layer = ctx.output.published.first().ok_or_else(|| {
            ImportError::UnexpectedLayerStructure("copied layer was not published".to_string())
        })?;
        let row = ResourceRow {
            resource_id: Uuid::new_v4(),
            execution_id: Some(*ctx.execution_id.as_uuid()),
            name: layer.name.clone(),
            title: ctx
                .input
                .title_override()
                .unwrap_or(source.title.as_str())
                .to_string(),
            table_name: layer.table.clone(),
            geometry_column: layer.geometry_column.clone(),
            geometry_type: layer.geometry_type.map(|k| k.as_str().to_string()),
            files_json: source.files_json.clone(),
            source_resource_id: Some(source.resource_id),
            created_at: OffsetDateTime::now_utc(),
        };
        let resource = self.register(kind, &row).await?;
        ctx.output.resources = vec![resource.resource_id];
        Ok(())
    }

    async fn register(&self, kind: HandlerKind, row: &ResourceRow) -> ImportResult<ResourceRow> {
        let resource = self.metadata.create_resource(row).await?;
        self.metadata
            .set_handler_info(resource.resource_id, kind.key(), OffsetDateTime::now_utc())
            .await?;
        tracing::info!(
            resource_id = %resource.resource_id,
            name = %resource.name,
            handler = %kind,
            "registered resource"
        );
        Ok(resource)
    }
}
