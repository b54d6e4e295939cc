//! Data carried between pipeline steps.
//!
//! [`ExecutionInput`] is written once when an execution is accepted.
//! [`ExecutionOutput`] accumulates step results and is persisted after every
//! successful step, so a resumed execution sees what earlier steps produced.

use geoingest_core::{ExecutionId, ImportOptions, PublishedLayer, ResourceOverrides, UploadFiles};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInput {
    #[serde(default)]
    pub files: UploadFiles,
    #[serde(default)]
    pub options: ImportOptions,
    /// Staging directory holding the uploaded files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<PathBuf>,
    /// Resource being copied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_resource_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub overrides: ResourceOverrides,
}

impl ExecutionInput {
    pub fn for_import(files: UploadFiles, options: ImportOptions, upload_dir: Option<PathBuf>) -> Self {
        Self {
            files,
            options,
            upload_dir,
            ..Self::default()
        }
    }

    pub fn for_copy(source_resource_id: Uuid, overrides: ResourceOverrides) -> Self {
        Self {
            source_resource_id: Some(source_resource_id),
            overrides,
            ..Self::default()
        }
    }

    /// Title override, if one was supplied as a string.
    pub fn title_override(&self) -> Option<&str> {
        self.overrides
            .get("title")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Schema names of the imported (or copied) layers.
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub published: Vec<PublishedLayer>,
    #[serde(default)]
    pub resources: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter_output: Option<String>,
}

/// State handed to each step of one execution.
#[derive(Clone, Debug)]
pub struct StepContext {
    pub execution_id: ExecutionId,
    pub input: ExecutionInput,
    pub output: ExecutionOutput,
}

impl StepContext {
    pub fn new(execution_id: ExecutionId, input: ExecutionInput) -> Self {
        Self {
            execution_id,
            input,
            output: ExecutionOutput::default(),
        }
    }
}
