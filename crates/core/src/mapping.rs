//! Static lookup tables from OGR type names to storage field types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length assigned to text fields when no rule overrides it.
pub const DEFAULT_TEXT_MAX_LENGTH: i64 = 255;

/// Geometry subtype of a spatial column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
    Geometry,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::LineString => "line_string",
            Self::Polygon => "polygon",
            Self::MultiPoint => "multi_point",
            Self::MultiLineString => "multi_line_string",
            Self::MultiPolygon => "multi_polygon",
            Self::GeometryCollection => "geometry_collection",
            Self::Geometry => "geometry",
        }
    }
}

impl FromStr for GeometryKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "point" => Ok(Self::Point),
            "line_string" => Ok(Self::LineString),
            "polygon" => Ok(Self::Polygon),
            "multi_point" => Ok(Self::MultiPoint),
            "multi_line_string" => Ok(Self::MultiLineString),
            "multi_polygon" => Ok(Self::MultiPolygon),
            "geometry_collection" => Ok(Self::GeometryCollection),
            "geometry" => Ok(Self::Geometry),
            other => Err(crate::Error::Serialization(format!(
                "unknown geometry kind: {other}"
            ))),
        }
    }
}

/// Target storage field type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldClass {
    Integer,
    BigInteger,
    Float,
    Text,
    Date,
    Time,
    DateTime,
    Binary,
    Json,
    Geometry(GeometryKind),
}

impl FieldClass {
    /// Stable name persisted with field definitions.
    pub fn class_name(&self) -> String {
        match self {
            Self::Integer => "integer".to_string(),
            Self::BigInteger => "big_integer".to_string(),
            Self::Float => "float".to_string(),
            Self::Text => "char".to_string(),
            Self::Date => "date".to_string(),
            Self::Time => "time".to_string(),
            Self::DateTime => "datetime".to_string(),
            Self::Binary => "binary".to_string(),
            Self::Json => "json".to_string(),
            Self::Geometry(kind) => format!("geometry:{}", kind.as_str()),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, Self::Geometry(_))
    }
}

impl fmt::Display for FieldClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name())
    }
}

impl FromStr for FieldClass {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        if let Some(kind) = s.strip_prefix("geometry:") {
            return Ok(Self::Geometry(kind.parse()?));
        }
        match s {
            "integer" => Ok(Self::Integer),
            "big_integer" => Ok(Self::BigInteger),
            "float" => Ok(Self::Float),
            "char" => Ok(Self::Text),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "datetime" => Ok(Self::DateTime),
            "binary" => Ok(Self::Binary),
            "json" => Ok(Self::Json),
            other => Err(crate::Error::Serialization(format!(
                "unknown field class: {other}"
            ))),
        }
    }
}

/// One row of the standard field mapping table.
#[derive(Clone, Copy, Debug)]
pub struct FieldMapping {
    pub class: FieldClass,
    pub nullable: bool,
}

const fn nullable(class: FieldClass) -> FieldMapping {
    FieldMapping {
        class,
        nullable: true,
    }
}

/// OGR field type name -> storage field type.
pub static STANDARD_TYPE_MAPPING: &[(&str, FieldMapping)] = &[
    ("Integer", nullable(FieldClass::Integer)),
    ("Integer64", nullable(FieldClass::BigInteger)),
    ("Real", nullable(FieldClass::Float)),
    ("String", nullable(FieldClass::Text)),
    ("WideString", nullable(FieldClass::Text)),
    ("Date", nullable(FieldClass::Date)),
    ("Time", nullable(FieldClass::Time)),
    ("DateTime", nullable(FieldClass::DateTime)),
    ("Binary", nullable(FieldClass::Binary)),
    ("IntegerList", nullable(FieldClass::Json)),
    ("Integer64List", nullable(FieldClass::Json)),
    ("RealList", nullable(FieldClass::Json)),
    ("StringList", nullable(FieldClass::Json)),
    ("WideStringList", nullable(FieldClass::Json)),
];

/// OGR geometry type name -> geometry kind.
///
/// Carries both the descriptive names (`Multi Polygon`, `3D Point`) and the
/// compact OGC names reported in JSON output (`MultiPolygon`, `PointZ`).
/// Z and M dimensions map to the planar kind; the converter writes 2D.
pub static GEOMETRY_TYPE_MAPPING: &[(&str, GeometryKind)] = &[
    ("Point", GeometryKind::Point),
    ("3D Point", GeometryKind::Point),
    ("Measured Point", GeometryKind::Point),
    ("3D Measured Point", GeometryKind::Point),
    ("PointZ", GeometryKind::Point),
    ("PointM", GeometryKind::Point),
    ("PointZM", GeometryKind::Point),
    ("Line String", GeometryKind::LineString),
    ("3D Line String", GeometryKind::LineString),
    ("Measured Line String", GeometryKind::LineString),
    ("3D Measured Line String", GeometryKind::LineString),
    ("LineString", GeometryKind::LineString),
    ("LineStringZ", GeometryKind::LineString),
    ("LineStringM", GeometryKind::LineString),
    ("LineStringZM", GeometryKind::LineString),
    ("Polygon", GeometryKind::Polygon),
    ("3D Polygon", GeometryKind::Polygon),
    ("Measured Polygon", GeometryKind::Polygon),
    ("3D Measured Polygon", GeometryKind::Polygon),
    ("PolygonZ", GeometryKind::Polygon),
    ("PolygonM", GeometryKind::Polygon),
    ("PolygonZM", GeometryKind::Polygon),
    ("Multi Point", GeometryKind::MultiPoint),
    ("3D Multi Point", GeometryKind::MultiPoint),
    ("Measured Multi Point", GeometryKind::MultiPoint),
    ("3D Measured Multi Point", GeometryKind::MultiPoint),
    ("MultiPoint", GeometryKind::MultiPoint),
    ("MultiPointZ", GeometryKind::MultiPoint),
    ("MultiPointM", GeometryKind::MultiPoint),
    ("MultiPointZM", GeometryKind::MultiPoint),
    ("Multi Line String", GeometryKind::MultiLineString),
    ("3D Multi Line String", GeometryKind::MultiLineString),
    ("Measured Multi Line String", GeometryKind::MultiLineString),
    ("3D Measured Multi Line String", GeometryKind::MultiLineString),
    ("MultiLineString", GeometryKind::MultiLineString),
    ("MultiLineStringZ", GeometryKind::MultiLineString),
    ("MultiLineStringM", GeometryKind::MultiLineString),
    ("MultiLineStringZM", GeometryKind::MultiLineString),
    ("Multi Polygon", GeometryKind::MultiPolygon),
    ("3D Multi Polygon", GeometryKind::MultiPolygon),
    ("Measured Multi Polygon", GeometryKind::MultiPolygon),
    ("3D Measured Multi Polygon", GeometryKind::MultiPolygon),
    ("MultiPolygon", GeometryKind::MultiPolygon),
    ("MultiPolygonZ", GeometryKind::MultiPolygon),
    ("MultiPolygonM", GeometryKind::MultiPolygon),
    ("MultiPolygonZM", GeometryKind::MultiPolygon),
    ("Geometry Collection", GeometryKind::GeometryCollection),
    ("3D Geometry Collection", GeometryKind::GeometryCollection),
    ("Measured Geometry Collection", GeometryKind::GeometryCollection),
    ("3D Measured Geometry Collection", GeometryKind::GeometryCollection),
    ("GeometryCollection", GeometryKind::GeometryCollection),
    ("GeometryCollectionZ", GeometryKind::GeometryCollection),
    ("GeometryCollectionM", GeometryKind::GeometryCollection),
    ("GeometryCollectionZM", GeometryKind::GeometryCollection),
    ("Unknown (any)", GeometryKind::Geometry),
    ("Geometry", GeometryKind::Geometry),
];

/// Look up the storage type for an OGR field type name.
pub fn map_field_type(type_name: &str) -> Option<FieldMapping> {
    STANDARD_TYPE_MAPPING
        .iter()
        .find(|(name, _)| *name == type_name)
        .map(|(_, mapping)| *mapping)
}

/// Look up the geometry kind for an OGR geometry type name.
pub fn map_geometry_type(type_name: &str) -> Option<GeometryKind> {
    GEOMETRY_TYPE_MAPPING
        .iter()
        .find(|(name, _)| *name == type_name)
        .map(|(_, kind)| *kind)
}
