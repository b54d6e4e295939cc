//! Layer discovery.

use crate::command::{CommandRunner, CommandSpec, judge_output};
use crate::error::{ImportError, ImportResult};
use async_trait::async_trait;
use geoingest_core::config::{FailurePolicy, ImporterConfig};
use geoingest_core::{LayerMetadata, SourceField};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Lists the layers of a source file with their fields and geometry.
#[async_trait]
pub trait LayerInspector: Send + Sync {
    async fn inspect(&self, source: &str) -> ImportResult<Vec<LayerMetadata>>;
}

/// Inspects sources with `ogrinfo -json -so`.
pub struct OgrInfoInspector {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    timeout: Duration,
}

impl OgrInfoInspector {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &ImporterConfig) -> Self {
        Self {
            runner,
            program: config.ogrinfo_path.clone(),
            timeout: config.inspect_timeout(),
        }
    }

    fn command(&self, source: &str) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["-json", "-so", "-ro"])
            .arg(source)
    }
}

#[async_trait]
impl LayerInspector for OgrInfoInspector {
    async fn inspect(&self, source: &str) -> ImportResult<Vec<LayerMetadata>> {
        let spec = self.command(source);
        let output = self.runner.run(&spec, self.timeout).await?;
        // Inspection never writes anything, so only the exit status matters.
        let stdout = judge_output(&spec, output, FailurePolicy::ExitStatus).map_err(|e| {
            ImportError::Inspection {
                source_uri: source.to_string(),
                message: e.to_string(),
            }
        })?;
        let layers = parse_ogrinfo_json(&stdout).map_err(|e| ImportError::Inspection {
            source_uri: source.to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(source, layers = layers.len(), "inspected source layers");
        Ok(layers)
    }
}

#[derive(Debug, Deserialize)]
struct OgrInfoDocument {
    #[serde(default)]
    layers: Vec<OgrInfoLayer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OgrInfoLayer {
    name: String,
    #[serde(default)]
    fields: Vec<OgrInfoField>,
    #[serde(default)]
    geometry_fields: Vec<OgrInfoField>,
}

#[derive(Debug, Deserialize)]
struct OgrInfoField {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    type_name: String,
}

/// Parse the JSON document printed by `ogrinfo -json -so`.
///
/// Only the first geometry field of each layer is kept.
pub fn parse_ogrinfo_json(json: &str) -> Result<Vec<LayerMetadata>, serde_json::Error> {
    let document: OgrInfoDocument = serde_json::from_str(json)?;
    Ok(document
        .layers
        .into_iter()
        .map(|layer| {
            let geometry = layer.geometry_fields.into_iter().next();
            LayerMetadata {
                name: layer.name,
                fields: layer
                    .fields
                    .into_iter()
                    .map(|f| SourceField::new(f.name, f.type_name))
                    .collect(),
                geometry_column: geometry.as_ref().map(|g| g.name.clone()),
                geometry_type: geometry.map(|g| g.type_name),
            }
        })
        .collect())
}
