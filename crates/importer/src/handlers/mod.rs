//! Format handlers.
//!
//! A handler binds one source format to the pipeline. It decides whether an
//! upload belongs to it, names the steps the orchestrator runs, and knows how
//! to address its files for the converter. The step bodies themselves live in
//! [`VectorPipeline`] and are shared by every variant.

mod geojson;
mod gpkg;
mod pipeline;
mod shapefile;

pub use geojson::GeoJsonFileHandler;
pub use gpkg::GpkgFileHandler;
pub use pipeline::VectorPipeline;
pub use shapefile::ShapeFileHandler;

use crate::context::StepContext;
use crate::error::{ImportError, ImportResult};
use async_trait::async_trait;
use geoingest_core::{
    COPY_TASKS, ExecutionAction, HandlerKind, IMPORT_TASKS, PipelineStep, UploadFiles,
};
use std::path::Path;

#[async_trait]
pub trait ImportHandler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    /// Whether this handler can process `files`. Never fails; malformed or
    /// missing input simply yields `false`.
    fn is_valid(&self, files: &UploadFiles) -> bool;

    /// Source address handed to the inspector and the converter.
    fn source_uri(&self, files: &UploadFiles) -> ImportResult<String>;

    fn pipeline(&self) -> &VectorPipeline;

    fn task_list(&self) -> &'static [PipelineStep] {
        &IMPORT_TASKS
    }

    fn copy_task_list(&self) -> &'static [PipelineStep] {
        &COPY_TASKS
    }

    fn tasks_for(&self, action: ExecutionAction) -> &'static [PipelineStep] {
        match action {
            ExecutionAction::Import => self.task_list(),
            ExecutionAction::Copy => self.copy_task_list(),
        }
    }

    /// Build schemas for every layer of the upload, then load its data.
    /// Returns the converter output.
    async fn import_resource(&self, ctx: &mut StepContext) -> ImportResult<String> {
        let source = self.source_uri(&ctx.input.files)?;
        self.pipeline().import_layers(&source, ctx).await
    }

    async fn execute_step(&self, step: PipelineStep, ctx: &mut StepContext) -> ImportResult<()> {
        let pipeline = self.pipeline();
        match step {
            PipelineStep::StartImport => {
                if !self.is_valid(&ctx.input.files) {
                    return Err(ImportError::InvalidFiles(format!(
                        "files are no longer valid for {}",
                        self.kind()
                    )));
                }
                Ok(())
            }
            PipelineStep::ImportResource => self.import_resource(ctx).await.map(|_| ()),
            PipelineStep::PublishResource => pipeline.publish(ctx).await,
            PipelineStep::CreateResource => pipeline.create_resources(self.kind(), ctx).await,
            PipelineStep::StartCopy => pipeline.start_copy(ctx).await,
            PipelineStep::CopySchema => pipeline.copy_schema(ctx).await,
            PipelineStep::CopyData => pipeline.copy_data(ctx).await,
            PipelineStep::CopyResource => pipeline.copy_resource(self.kind(), ctx).await,
        }
    }
}

/// Lower-cased extension of `path`.
pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

pub(crate) fn path_uri(path: &Path) -> ImportResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| ImportError::InvalidFiles(format!("non UTF-8 path: {}", path.display())))
}

pub(crate) fn base_file_uri(files: &UploadFiles) -> ImportResult<String> {
    let base = files
        .base_file()
        .ok_or_else(|| ImportError::InvalidFiles("missing base_file".to_string()))?;
    path_uri(base)
}
