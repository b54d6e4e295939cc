//! Source layer metadata as reported by the format inspector.

use serde::{Deserialize, Serialize};

/// Geometry column name the converter uses for PostgreSQL targets when the
/// source does not name one.
pub const DEFAULT_GEOMETRY_COLUMN: &str = "wkb_geometry";

/// A field declared by a source layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceField {
    pub name: String,
    /// OGR field type name (e.g. `Integer64`, `String`).
    pub type_name: String,
}

impl SourceField {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One named table or feature collection inside a source file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMetadata {
    pub name: String,
    pub fields: Vec<SourceField>,
    pub geometry_column: Option<String>,
    /// OGR geometry type name; `None` for attribute-only tables.
    pub geometry_type: Option<String>,
}

impl LayerMetadata {
    /// Schema name derived from the layer name.
    pub fn schema_name(&self) -> String {
        launder_identifier(&self.name)
    }

    /// Geometry column as it will exist in the datastore.
    pub fn geometry_column_name(&self) -> String {
        match self.geometry_column.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => launder_identifier(name),
            _ => DEFAULT_GEOMETRY_COLUMN.to_string(),
        }
    }

    pub fn is_spatial(&self) -> bool {
        self.geometry_type
            .as_deref()
            .is_some_and(|t| !t.is_empty() && t != "None")
    }
}

/// Normalize an identifier the way the converter launders PostgreSQL names:
/// lower-case, every character outside `[a-z0-9_]` replaced with `_`.
pub fn launder_identifier(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(geometry_column: Option<&str>, geometry_type: Option<&str>) -> LayerMetadata {
        LayerMetadata {
            name: "Stili di Vita".to_string(),
            fields: vec![],
            geometry_column: geometry_column.map(str::to_string),
            geometry_type: geometry_type.map(str::to_string),
        }
    }

    #[test]
    fn test_launder_identifier() {
        assert_eq!(launder_identifier("Roads"), "roads");
        assert_eq!(launder_identifier("Stili di-Vita"), "stili_di_vita");
        assert_eq!(launder_identifier("area_km2"), "area_km2");
    }

    #[test]
    fn test_schema_name_is_laundered() {
        assert_eq!(layer(None, None).schema_name(), "stili_di_vita");
    }

    #[test]
    fn test_geometry_column_defaults() {
        assert_eq!(layer(Some("geom"), None).geometry_column_name(), "geom");
        assert_eq!(layer(Some(""), None).geometry_column_name(), "wkb_geometry");
        assert_eq!(layer(None, None).geometry_column_name(), "wkb_geometry");
    }

    #[test]
    fn test_is_spatial() {
        assert!(layer(None, Some("Point")).is_spatial());
        assert!(!layer(None, Some("None")).is_spatial());
        assert!(!layer(None, None).is_spatial());
    }
}
