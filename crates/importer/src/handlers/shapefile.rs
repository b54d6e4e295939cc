use crate::error::{ImportError, ImportResult};
use super::{ImportHandler, VectorPipeline, extension, path_uri};
use async_trait::async_trait;
use geoingest_core::{FileRole, HandlerKind, UploadFiles};
use std::path::Path;
use std::sync::Arc;

/// ESRI Shapefile uploads, either as loose `.shp`/`.dbf`/`.shx` files or as a
/// single `.zip` archive read through GDAL's `/vsizip/` handler.
pub struct ShapeFileHandler {
    pipeline: Arc<VectorPipeline>,
}

impl ShapeFileHandler {
    pub fn new(pipeline: Arc<VectorPipeline>) -> Self {
        Self { pipeline }
    }
}

/// A required sidecar is either uploaded under its own role or sits next to
/// the `.shp` file. Either way it must share the `.shp` stem and directory,
/// since that is where the driver looks for it.
fn has_sidecar(files: &UploadFiles, shp: &Path, role: FileRole, ext: &str) -> bool {
    match files.get(role) {
        Some(path) => extension(path).is_some_and(|e| e == ext) && is_sibling(shp, path),
        None => shp.with_extension(ext).is_file(),
    }
}

fn is_sibling(shp: &Path, path: &Path) -> bool {
    let same_stem = match (shp.file_stem(), path.file_stem()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    };
    same_stem && shp.parent() == path.parent()
}

#[async_trait]
impl ImportHandler for ShapeFileHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Shapefile
    }

    fn is_valid(&self, files: &UploadFiles) -> bool {
        let Some(base) = files.base_file() else {
            return false;
        };
        if !files.all_exist() {
            return false;
        }
        match extension(base).as_deref() {
            Some("zip") => true,
            Some("shp") => {
                has_sidecar(files, base, FileRole::DbfFile, "dbf")
                    && has_sidecar(files, base, FileRole::ShxFile, "shx")
            }
            _ => false,
        }
    }

    fn source_uri(&self, files: &UploadFiles) -> ImportResult<String> {
        let base = files
            .base_file()
            .ok_or_else(|| ImportError::InvalidFiles("missing base_file".to_string()))?;
        let uri = path_uri(base)?;
        if extension(base).as_deref() == Some("zip") {
            Ok(format!("/vsizip/{uri}"))
        } else {
            Ok(uri)
        }
    }

    fn pipeline(&self) -> &VectorPipeline {
        &self.pipeline
    }
}
