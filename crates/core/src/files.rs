//! Uploaded file sets and upload options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Logical role of an uploaded file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// The main data file (`.gpkg`, `.geojson`, `.shp`, `.zip`).
    BaseFile,
    /// Archive carrying the whole upload.
    ZipFile,
    ShpFile,
    DbfFile,
    ShxFile,
    PrjFile,
    CpgFile,
    /// Metadata document.
    XmlFile,
    /// Style document.
    SldFile,
}

impl FileRole {
    pub const ALL: [FileRole; 9] = [
        Self::BaseFile,
        Self::ZipFile,
        Self::ShpFile,
        Self::DbfFile,
        Self::ShxFile,
        Self::PrjFile,
        Self::CpgFile,
        Self::XmlFile,
        Self::SldFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaseFile => "base_file",
            Self::ZipFile => "zip_file",
            Self::ShpFile => "shp_file",
            Self::DbfFile => "dbf_file",
            Self::ShxFile => "shx_file",
            Self::PrjFile => "prj_file",
            Self::CpgFile => "cpg_file",
            Self::XmlFile => "xml_file",
            Self::SldFile => "sld_file",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidFileRole(s.to_string()))
    }
}

/// Uploaded files keyed by role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadFiles(BTreeMap<FileRole, PathBuf>);

impl UploadFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, role: FileRole, path: impl Into<PathBuf>) -> Self {
        self.insert(role, path);
        self
    }

    pub fn insert(&mut self, role: FileRole, path: impl Into<PathBuf>) {
        self.0.insert(role, path.into());
    }

    pub fn get(&self, role: FileRole) -> Option<&Path> {
        self.0.get(&role).map(PathBuf::as_path)
    }

    pub fn base_file(&self) -> Option<&Path> {
        self.get(FileRole::BaseFile)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileRole, &Path)> {
        self.0.iter().map(|(role, path)| (*role, path.as_path()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.0.values().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Lower-cased extension of the base file.
    pub fn base_extension(&self) -> Option<String> {
        self.base_file()
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// True when every referenced file exists on disk.
    pub fn all_exist(&self) -> bool {
        !self.is_empty() && self.paths().all(Path::exists)
    }
}

/// Message used when a boolean-typed option cannot be parsed.
pub const INVALID_BOOLEAN_MESSAGE: &str = "Must be a valid boolean.";

/// Parse a boolean-like form value, rejecting anything else with a validation
/// error that names `field`.
pub fn parse_bool_option(field: &str, value: &str) -> crate::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Ok(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Ok(false),
        _ => Err(crate::Error::validation(field, INVALID_BOOLEAN_MESSAGE)),
    }
}

/// Options accepted alongside an upload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Keep the uploaded files after a successful import.
    #[serde(default)]
    pub store_spatial_files: bool,
}

/// Field overrides applied to a copied resource.
pub type ResourceOverrides = serde_json::Map<String, serde_json::Value>;

/// Response from accepting an upload or copy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionAccepted {
    pub execution_id: String,
    pub status_url: String,
}
