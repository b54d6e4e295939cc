//! Stand-ins for the external converter and the generic copy path.

use async_trait::async_trait;
use geoingest_core::{LayerMetadata, ResourceOverrides};
use geoingest_importer::{CommandOutput, CommandRunner, CommandSpec, ImportResult, LayerInspector};
use geoingest_metadata::models::ResourceRow;
use geoingest_server::{ApiResult, GenericCopier};
use std::sync::Mutex;
use std::time::Duration;

/// Succeeds on every command and records its arguments.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
}

#[allow(dead_code)]
impl FakeRunner {
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec, _timeout: Duration) -> ImportResult<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: "0...10...20...30...40...50...60...70...80...90...100 - done.".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }
}

/// Reports fixed layers for any source.
pub struct FakeInspector {
    layers: Vec<LayerMetadata>,
}

impl FakeInspector {
    pub fn new(layers: Vec<LayerMetadata>) -> Self {
        Self { layers }
    }
}

#[async_trait]
impl LayerInspector for FakeInspector {
    async fn inspect(&self, _source: &str) -> ImportResult<Vec<LayerMetadata>> {
        Ok(self.layers.clone())
    }
}

/// Records generic copy requests instead of performing them.
#[derive(Default)]
pub struct RecordingCopier {
    calls: Mutex<Vec<(ResourceRow, ResourceOverrides)>>,
}

#[allow(dead_code)]
impl RecordingCopier {
    pub fn calls(&self) -> Vec<(ResourceRow, ResourceOverrides)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenericCopier for RecordingCopier {
    async fn copy(
        &self,
        resource: &ResourceRow,
        overrides: &ResourceOverrides,
    ) -> ApiResult<ResourceRow> {
        self.calls
            .lock()
            .unwrap()
            .push((resource.clone(), overrides.clone()));
        Ok(resource.clone())
    }
}
