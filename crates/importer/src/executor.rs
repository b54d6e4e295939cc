//! Format import executor.
//!
//! Loads source data into the spatial datastore by running `ogr2ogr` with a
//! PostgreSQL destination built from [`DatastoreConfig`].

use crate::command::{CommandArg, CommandRunner, CommandSpec, judge_output};
use crate::error::ImportResult;
use geoingest_core::config::{DatastoreConfig, FailurePolicy, ImporterConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Connection parameters for the datastore the converter writes into.
#[derive(Clone, Debug)]
pub struct DatastoreConnection {
    config: DatastoreConfig,
}

impl DatastoreConnection {
    pub fn new(config: DatastoreConfig) -> Self {
        Self { config }
    }

    pub fn schema(&self) -> Option<&str> {
        self.config.schema.as_deref().filter(|s| !s.is_empty())
    }

    fn descriptor(&self, password: &str) -> String {
        let mut target = format!(
            "PG:dbname='{}' host={} port={} user='{}' password='{}'",
            escape_quoted(&self.config.database),
            self.config.host,
            self.config.port,
            escape_quoted(&self.config.username),
            password,
        );
        if let Some(schema) = self.schema() {
            target.push_str(&format!(" active_schema={schema}"));
        }
        target
    }

    /// Destination descriptor, with the password redacted in its display form.
    pub fn to_ogr_target(&self) -> CommandArg {
        CommandArg::Sensitive {
            value: self.descriptor(&escape_quoted(&self.config.password)),
            redacted: self.descriptor("***"),
        }
    }

    /// Table reference as the converter sees it inside the datastore.
    pub fn qualified_table(&self, table: &str) -> String {
        match self.schema() {
            Some(schema) => format!("{schema}.{table}"),
            None => table.to_string(),
        }
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Optional layer selection for one converter run.
#[derive(Clone, Debug, Default)]
pub struct ConversionOptions {
    /// Only convert this layer of the source.
    pub source_layer: Option<String>,
    /// Name of the destination table (`-nln`).
    pub target_table: Option<String>,
}

/// Runs the converter against the datastore.
pub struct ImportExecutor {
    runner: Arc<dyn CommandRunner>,
    connection: DatastoreConnection,
    program: PathBuf,
    timeout: Duration,
    policy: FailurePolicy,
}

impl ImportExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        datastore: DatastoreConfig,
        config: &ImporterConfig,
    ) -> Self {
        Self {
            runner,
            connection: DatastoreConnection::new(datastore),
            program: config.ogr2ogr_path.clone(),
            timeout: config.command_timeout(),
            policy: config.failure_policy,
        }
    }

    pub fn connection(&self) -> &DatastoreConnection {
        &self.connection
    }

    fn base_command(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("-progress")
            .args(["--config", "PG_USE_COPY", "YES"])
            .args(["-f", "PostgreSQL"])
            .arg(self.connection.to_ogr_target())
    }

    /// Command line for loading `source` into the datastore.
    pub fn import_command(&self, source: &str, options: &ConversionOptions) -> CommandSpec {
        let mut spec = self.base_command().arg(source);
        if let Some(layer) = &options.source_layer {
            spec = spec.arg(layer.as_str());
        }
        spec = spec.args(["-lco", "DIM=2", "-overwrite"]);
        if let Some(table) = &options.target_table {
            spec = spec.args(["-nln", table.as_str()]);
        }
        spec
    }

    /// Load `source` into the datastore and return the converter's stdout.
    pub async fn run_import(&self, source: &str, options: &ConversionOptions) -> ImportResult<String> {
        let spec = self.import_command(source, options);
        self.execute(spec).await
    }

    /// Duplicate a datastore table under a new name.
    pub async fn copy_table(&self, source_table: &str, target_table: &str) -> ImportResult<String> {
        let spec = self
            .base_command()
            .arg(self.connection.to_ogr_target())
            .arg(self.connection.qualified_table(source_table))
            .args(["-lco", "DIM=2", "-overwrite"])
            .args(["-nln", target_table]);
        self.execute(spec).await
    }

    async fn execute(&self, spec: CommandSpec) -> ImportResult<String> {
        tracing::info!(command = %spec, "running converter");
        let output = self.runner.run(&spec, self.timeout).await?;
        let duration = output.duration;
        let stdout = judge_output(&spec, output, self.policy)?;
        tracing::info!(
            program = %spec.program_name(),
            duration_ms = duration.as_millis() as u64,
            "converter finished"
        );
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::error::ImportError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn datastore(schema: Option<&str>) -> DatastoreConfig {
        DatastoreConfig {
            host: "db.internal".to_string(),
            port: 5433,
            username: "loader".to_string(),
            password: "s3cret".to_string(),
            database: "geo data".to_string(),
            schema: schema.map(str::to_string),
        }
    }

    struct FakeRunner {
        calls: Mutex<Vec<CommandSpec>>,
        exit_code: i32,
        stderr: String,
    }

    impl FakeRunner {
        fn new(exit_code: i32, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                exit_code,
                stderr: stderr.to_string(),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec, _timeout: Duration) -> ImportResult<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok(CommandOutput {
                exit_code: Some(self.exit_code),
                stdout: "0...10...20...30...40...50...60...70...80...90...100 - done.".to_string(),
                stderr: self.stderr.clone(),
                duration: Duration::from_millis(3),
            })
        }
    }

    #[test]
    fn test_target_descriptor_redacts_password() {
        let target = DatastoreConnection::new(datastore(None)).to_ogr_target();
        assert_eq!(
            target.value(),
            "PG:dbname='geo data' host=db.internal port=5433 user='loader' password='s3cret'"
        );
        assert_eq!(
            target.display(),
            "PG:dbname='geo data' host=db.internal port=5433 user='loader' password='***'"
        );
    }

    #[test]
    fn test_target_descriptor_with_schema() {
        let conn = DatastoreConnection::new(datastore(Some("imports")));
        assert!(conn.to_ogr_target().value().ends_with(" active_schema=imports"));
        assert_eq!(conn.qualified_table("roads"), "imports.roads");
    }

    #[test]
    fn test_import_command_flags() {
        let executor = ImportExecutor::new(
            FakeRunner::new(0, ""),
            datastore(None),
            &ImporterConfig::default(),
        );
        let spec = executor.import_command(
            "/data/stili.gpkg",
            &ConversionOptions {
                source_layer: None,
                target_table: Some("stili".to_string()),
            },
        );
        let args: Vec<_> = spec.arg_values().collect();
        assert_eq!(&args[..6], &["-progress", "--config", "PG_USE_COPY", "YES", "-f", "PostgreSQL"]);
        assert_eq!(
            &args[7..],
            &["/data/stili.gpkg", "-lco", "DIM=2", "-overwrite", "-nln", "stili"]
        );
        assert!(!spec.to_string().contains("s3cret"));
    }

    #[tokio::test]
    async fn test_copy_table_reads_from_datastore() {
        let runner = FakeRunner::new(0, "");
        let executor =
            ImportExecutor::new(runner.clone(), datastore(None), &ImporterConfig::default());
        executor.copy_table("roads", "roads_1a2b3c4d").await.unwrap();

        let calls = runner.calls.lock().unwrap();
        let args: Vec<_> = calls[0].arg_values().collect();
        assert!(args[6].starts_with("PG:"));
        assert!(args[7].starts_with("PG:"));
        assert_eq!(args[8], "roads");
        assert_eq!(args.last(), Some(&"roads_1a2b3c4d"));
    }

    #[tokio::test]
    async fn test_stderr_policy_is_configurable() {
        let lenient = ImportExecutor::new(
            FakeRunner::new(0, "Warning 1: layer creation option ignored"),
            datastore(None),
            &ImporterConfig::default(),
        );
        let stdout = lenient
            .run_import("/data/a.gpkg", &ConversionOptions::default())
            .await
            .unwrap();
        assert!(stdout.ends_with("done."));

        let strict = ImportExecutor::new(
            FakeRunner::new(0, "Warning 1: layer creation option ignored"),
            datastore(None),
            &ImporterConfig {
                failure_policy: FailurePolicy::AnyStderr,
                ..ImporterConfig::default()
            },
        );
        let err = strict
            .run_import("/data/a.gpkg", &ConversionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::CommandFailed { .. }));
    }
}
