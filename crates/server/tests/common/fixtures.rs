//! Test data builders.

use geoingest_core::{LayerMetadata, SourceField};
use geoingest_metadata::models::ResourceRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// The layer every fake inspection reports.
pub fn stili_layer() -> LayerMetadata {
    LayerMetadata {
        name: "Stili_Di_Vita".to_string(),
        fields: vec![
            SourceField::new("ID", "Integer64"),
            SourceField::new("Scenario", "String"),
            SourceField::new("Area_km2", "Real"),
        ],
        geometry_column: Some("geom".to_string()),
        geometry_type: Some("Multi Polygon".to_string()),
    }
}

/// A catalog resource not tied to any execution.
#[allow(dead_code)]
pub fn resource_row(name: &str) -> ResourceRow {
    ResourceRow {
        resource_id: Uuid::new_v4(),
        execution_id: None,
        name: name.to_string(),
        title: name.to_string(),
        table_name: format!("datastore.{name}"),
        geometry_column: Some("geom".to_string()),
        geometry_type: Some("multi_polygon".to_string()),
        files_json: None,
        source_resource_id: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

/// Build a `multipart/form-data` body from text fields and `(field, file
/// name, bytes)` files. Returns the content type and the body.
#[allow(dead_code)]
pub fn multipart_body(texts: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "geoingest-test-boundary";
    let mut body = Vec::new();
    for (name, value) in texts {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
