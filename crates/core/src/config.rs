//! Configuration types shared across crates.

use crate::mapping::DEFAULT_TEXT_MAX_LENGTH;
use crate::schema::DEFAULT_STORAGE_TARGET;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory where uploads are staged, one subdirectory per execution.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Maximum accepted multipart body size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_max_upload_bytes() -> usize {
    1024 * 1024 * 1024 // 1 GiB
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be greater than 0".to_string());
        }
        if self.upload_dir.as_os_str().is_empty() {
            return Err("server.upload_dir cannot be empty".to_string());
        }
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds. Advisory only: slow queries are logged,
        /// never cancelled.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over the individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer GEOINGEST_METADATA__PASSWORD over storing this in the file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds, enforced by the server.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// The spatial database the converter writes imported layers into.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    #[serde(default = "default_datastore_host")]
    pub host: String,
    #[serde(default = "default_datastore_port")]
    pub port: u16,
    #[serde(default = "default_datastore_username")]
    pub username: String,
    /// Prefer GEOINGEST_DATASTORE__PASSWORD over storing this in the file.
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_datastore_database")]
    pub database: String,
    /// Target PostgreSQL schema. When unset the converter uses the search path.
    #[serde(default)]
    pub schema: Option<String>,
}

fn default_datastore_host() -> String {
    "localhost".to_string()
}

fn default_datastore_port() -> u16 {
    5432
}

fn default_datastore_username() -> String {
    "geoingest".to_string()
}

fn default_datastore_database() -> String {
    "geoingest_data".to_string()
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            host: default_datastore_host(),
            port: default_datastore_port(),
            username: default_datastore_username(),
            password: String::new(),
            database: default_datastore_database(),
            schema: None,
        }
    }
}

// Keeps the password out of `{:?}` output and therefore out of logs.
impl std::fmt::Debug for DatastoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

impl DatastoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("datastore.host cannot be empty".to_string());
        }
        if self.database.trim().is_empty() {
            return Err("datastore.database cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("datastore.port cannot be 0".to_string());
        }
        Ok(())
    }
}

/// How the result of an external command is judged.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Non-zero exit status fails; stderr on success is logged as a warning.
    #[default]
    ExitStatus,
    /// Any stderr output fails, regardless of exit status.
    AnyStderr,
}

/// External converter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImporterConfig {
    #[serde(default = "default_ogr2ogr_path")]
    pub ogr2ogr_path: PathBuf,
    #[serde(default = "default_ogrinfo_path")]
    pub ogrinfo_path: PathBuf,
    /// Upper bound on a single bulk import, in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Upper bound on layer inspection, in seconds.
    #[serde(default = "default_inspect_timeout_secs")]
    pub inspect_timeout_secs: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Max length assigned to text fields.
    #[serde(default = "default_text_max_length")]
    pub text_max_length: i64,
    /// Storage target that schema definitions are keyed under.
    #[serde(default = "default_storage_target")]
    pub storage_target: String,
}

fn default_ogr2ogr_path() -> PathBuf {
    PathBuf::from("/usr/bin/ogr2ogr")
}

fn default_ogrinfo_path() -> PathBuf {
    PathBuf::from("/usr/bin/ogrinfo")
}

fn default_command_timeout_secs() -> u64 {
    3600
}

fn default_inspect_timeout_secs() -> u64 {
    120
}

fn default_text_max_length() -> i64 {
    DEFAULT_TEXT_MAX_LENGTH
}

fn default_storage_target() -> String {
    DEFAULT_STORAGE_TARGET.to_string()
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            ogr2ogr_path: default_ogr2ogr_path(),
            ogrinfo_path: default_ogrinfo_path(),
            command_timeout_secs: default_command_timeout_secs(),
            inspect_timeout_secs: default_inspect_timeout_secs(),
            failure_policy: FailurePolicy::default(),
            text_max_length: default_text_max_length(),
            storage_target: default_storage_target(),
        }
    }
}

impl ImporterConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.command_timeout_secs == 0 {
            return Err("importer.command_timeout_secs cannot be 0".to_string());
        }
        if self.inspect_timeout_secs == 0 {
            return Err("importer.inspect_timeout_secs cannot be 0".to_string());
        }
        if self.text_max_length <= 0 {
            return Err(format!(
                "importer.text_max_length must be positive, got {}",
                self.text_max_length
            ));
        }
        if self.storage_target.trim().is_empty() {
            return Err("importer.storage_target cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Background pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of workers consuming the step queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Re-enqueue unfinished executions when the server starts.
    #[serde(default = "default_resume_on_startup")]
    pub resume_on_startup: bool,
}

fn default_workers() -> usize {
    4
}

fn default_resume_on_startup() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resume_on_startup: default_resume_on_startup(),
        }
    }
}

impl PipelineConfig {
    /// Returns warnings for settings that are allowed but unusual.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        if self.workers == 0 {
            return Err("pipeline.workers cannot be 0; queued steps would never run".to_string());
        }
        let mut warnings = Vec::new();
        if self.workers > 64 {
            warnings.push(format!(
                "pipeline.workers={} is very high; each worker may hold an external converter process",
                self.workers
            ));
        }
        if !self.resume_on_startup {
            warnings.push(
                "pipeline.resume_on_startup=false leaves interrupted executions unfinished"
                    .to_string(),
            );
        }
        Ok(warnings)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,
    #[serde(default)]
    pub importer: ImporterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses SQLite metadata and a single pipeline worker.
    pub fn for_testing() -> Self {
        Self {
            pipeline: PipelineConfig {
                workers: 1,
                resume_on_startup: false,
            },
            ..Self::default()
        }
    }

    /// Validate every section. Returns the collected warnings on success.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        self.server.validate()?;
        self.metadata.validate()?;
        self.datastore.validate()?;
        self.importer.validate()?;
        self.pipeline.validate()
    }
}
