//! Test data builders.

use geoingest_core::{FileRole, LayerMetadata, SourceField, UploadFiles};
use std::path::{Path, PathBuf};

/// Write a file under `dir` and return its path.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write fixture file");
    path
}

/// A staged upload directory holding one file as its base file.
#[allow(dead_code)]
pub fn staged_upload(root: &Path, file_name: &str) -> (UploadFiles, PathBuf) {
    let dir = root.join(format!("upload-{}", uuid::Uuid::new_v4().simple()));
    std::fs::create_dir_all(&dir).expect("Failed to create upload dir");
    let base = write_file(&dir, file_name, b"fixture");
    (UploadFiles::new().with(FileRole::BaseFile, base), dir)
}

/// Layer with the given `(name, ogr type)` fields.
#[allow(dead_code)]
pub fn layer(name: &str, fields: &[(&str, &str)], geometry_type: Option<&str>) -> LayerMetadata {
    LayerMetadata {
        name: name.to_string(),
        fields: fields
            .iter()
            .map(|(n, t)| SourceField::new(*n, *t))
            .collect(),
        geometry_column: geometry_type.map(|_| "geom".to_string()),
        geometry_type: geometry_type.map(str::to_string),
    }
}

/// The layer most tests import.
#[allow(dead_code)]
pub fn stili_layer() -> LayerMetadata {
    layer(
        "Stili_Di_Vita",
        &[
            ("ID", "Integer64"),
            ("Scenario", "String"),
            ("Area_km2", "Real"),
        ],
        Some("Multi Polygon"),
    )
}
