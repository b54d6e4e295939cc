//! Stable identifiers for handler variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Handler variant, persisted per resource by its registry key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HandlerKind {
    GeoPackage,
    GeoJson,
    Shapefile,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 3] = [Self::GeoPackage, Self::GeoJson, Self::Shapefile];

    /// Registry key stored in `resource_handler_info`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::GeoPackage => "geoingest.handlers.gpkg.GpkgFileHandler",
            Self::GeoJson => "geoingest.handlers.geojson.GeoJsonFileHandler",
            Self::Shapefile => "geoingest.handlers.shapefile.ShapeFileHandler",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for HandlerKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| crate::Error::UnknownHandler(s.to_string()))
    }
}

impl TryFrom<String> for HandlerKind {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        value.parse()
    }
}

impl From<HandlerKind> for String {
    fn from(kind: HandlerKind) -> Self {
        kind.key().to_string()
    }
}
