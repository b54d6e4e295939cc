use crate::error::ImportResult;
use super::{ImportHandler, VectorPipeline, base_file_uri, extension};
use async_trait::async_trait;
use geoingest_core::{HandlerKind, UploadFiles};
use std::sync::Arc;

const EXTENSIONS: [&str; 2] = ["json", "geojson"];

/// GeoJSON uploads.
pub struct GeoJsonFileHandler {
    pipeline: Arc<VectorPipeline>,
}

impl GeoJsonFileHandler {
    pub fn new(pipeline: Arc<VectorPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl ImportHandler for GeoJsonFileHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::GeoJson
    }

    fn is_valid(&self, files: &UploadFiles) -> bool {
        files
            .base_file()
            .and_then(extension)
            .is_some_and(|ext| EXTENSIONS.contains(&ext.as_str()))
            && files.all_exist()
    }

    fn source_uri(&self, files: &UploadFiles) -> ImportResult<String> {
        base_file_uri(files)
    }

    fn pipeline(&self) -> &VectorPipeline {
        &self.pipeline
    }
}
