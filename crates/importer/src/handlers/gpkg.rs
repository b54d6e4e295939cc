use crate::error::ImportResult;
use super::{ImportHandler, VectorPipeline, base_file_uri, extension};
use async_trait::async_trait;
use geoingest_core::{HandlerKind, UploadFiles};
use std::sync::Arc;

/// GeoPackage (`.gpkg`) uploads.
pub struct GpkgFileHandler {
    pipeline: Arc<VectorPipeline>,
}

impl GpkgFileHandler {
    pub fn new(pipeline: Arc<VectorPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl ImportHandler for GpkgFileHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::GeoPackage
    }

    fn is_valid(&self, files: &UploadFiles) -> bool {
        files
            .base_file()
            .and_then(extension)
            .is_some_and(|ext| ext == "gpkg")
            && files.all_exist()
    }

    fn source_uri(&self, files: &UploadFiles) -> ImportResult<String> {
        base_file_uri(files)
    }

    fn pipeline(&self) -> &VectorPipeline {
        &self.pipeline
    }
}
