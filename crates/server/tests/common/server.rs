//! Server test utilities.

use super::fakes::{FakeInspector, FakeRunner};
use super::fixtures::stili_layer;
use geoingest_core::config::{AppConfig, MetadataConfig, ServerConfig};
use geoingest_core::{ExecutionId, ExecutionStatus};
use geoingest_importer::{HandlerRegistry, Orchestrator, VectorPipeline};
use geoingest_metadata::models::ExecutionRow;
use geoingest_metadata::{MetadataStore, SqliteStore};
use geoingest_server::{AppState, create_router};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A router wired to SQLite metadata, the real handlers and a fake converter.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub runner: Arc<FakeRunner>,
    pub temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::with_state(|_| {}, |state| state).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::with_state(modifier, |state| state).await
    }

    /// Create a test server, adjusting the config before the state is built
    /// and the state (e.g. its collaborators) before the router is built.
    pub async fn with_state<F, S>(modifier: F, customize: S) -> Self
    where
        F: FnOnce(&mut AppConfig),
        S: FnOnce(AppState) -> AppState,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            server: ServerConfig {
                upload_dir: temp_dir.path().join("uploads"),
                ..Default::default()
            },
            metadata: MetadataConfig::Sqlite {
                path: db_path,
                query_timeout_secs: None,
            },
            ..AppConfig::for_testing()
        };
        modifier(&mut config);

        let runner = Arc::new(FakeRunner::default());
        let pipeline = Arc::new(
            VectorPipeline::new(
                metadata.clone(),
                runner.clone(),
                config.datastore.clone(),
                &config.importer,
            )
            .with_inspector(Arc::new(FakeInspector::new(vec![stili_layer()]))),
        );
        let registry = Arc::new(HandlerRegistry::with_defaults(metadata.clone(), pipeline));
        let (orchestrator, _workers) =
            Orchestrator::start(registry, metadata.clone(), config.pipeline.workers);

        let state = customize(AppState::new(config, metadata, orchestrator));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            runner,
            temp_dir,
        }
    }

    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Poll until the execution reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: ExecutionId) -> ExecutionRow {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let row = self
                .metadata()
                .get_execution(*id.as_uuid())
                .await
                .expect("Failed to read execution")
                .expect("execution should exist");
            let status: ExecutionStatus = row.status.parse().expect("valid status");
            if status.is_terminal() {
                return row;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "execution {id} did not finish, last status {}",
                row.status
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
