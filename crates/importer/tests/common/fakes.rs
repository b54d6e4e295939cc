//! In-process stand-ins for the external converter and inspector.

use async_trait::async_trait;
use geoingest_core::LayerMetadata;
use geoingest_importer::{CommandOutput, CommandRunner, CommandSpec, ImportResult, LayerInspector};
use std::sync::Mutex;
use std::time::Duration;

/// Records every command and answers with a scripted result.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failure: Mutex<Option<(i32, String)>>,
}

#[allow(dead_code)]
impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following run exit with `exit_code` and `stderr`.
    pub fn fail_with(&self, exit_code: i32, stderr: &str) {
        *self.failure.lock().unwrap() = Some((exit_code, stderr.to_string()));
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Argument values of every recorded call.
    pub fn call_args(&self) -> Vec<Vec<String>> {
        self.calls()
            .iter()
            .map(|c| c.arg_values().map(str::to_string).collect())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec, _timeout: Duration) -> ImportResult<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let (exit_code, stderr) = self
            .failure
            .lock()
            .unwrap()
            .clone()
            .unwrap_or((0, String::new()));
        Ok(CommandOutput {
            exit_code: Some(exit_code),
            stdout: if exit_code == 0 {
                "0...10...20...30...40...50...60...70...80...90...100 - done.".to_string()
            } else {
                String::new()
            },
            stderr,
            duration: Duration::from_millis(2),
        })
    }
}

/// Reports the same configured layers for any source.
#[derive(Default)]
pub struct FakeInspector {
    layers: Mutex<Vec<LayerMetadata>>,
    sources: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeInspector {
    pub fn new(layers: Vec<LayerMetadata>) -> Self {
        Self {
            layers: Mutex::new(layers),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn set_layers(&self, layers: Vec<LayerMetadata>) {
        *self.layers.lock().unwrap() = layers;
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl LayerInspector for FakeInspector {
    async fn inspect(&self, source: &str) -> ImportResult<Vec<LayerMetadata>> {
        self.sources.lock().unwrap().push(source.to_string());
        Ok(self.layers.lock().unwrap().clone())
    }
}
