//! A fully wired pipeline backed by SQLite and the fakes.

use super::fakes::{FakeInspector, FakeRunner};
use super::fixtures::stili_layer;
use geoingest_core::config::{DatastoreConfig, ImporterConfig};
use geoingest_core::{ExecutionId, ExecutionStatus};
use geoingest_importer::{
    ExecutionTracker, HandlerRegistry, ImportHandler, Orchestrator, VectorPipeline,
};
use geoingest_metadata::models::ExecutionRow;
use geoingest_metadata::{MetadataStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestPipeline {
    pub store: Arc<dyn MetadataStore>,
    pub runner: Arc<FakeRunner>,
    pub inspector: Arc<FakeInspector>,
    pub pipeline: Arc<VectorPipeline>,
    pub registry: Arc<HandlerRegistry>,
    pub orchestrator: Orchestrator,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestPipeline {
    pub async fn new() -> Self {
        Self::with_handlers(|_| Vec::new()).await
    }

    /// Build the default registry, then register the handlers `extra` returns
    /// on top of it (replacing built-ins of the same kind).
    pub async fn with_handlers(
        extra: impl FnOnce(Arc<VectorPipeline>) -> Vec<Arc<dyn ImportHandler>>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(dir.path().join("metadata.db"), None)
                .await
                .expect("Failed to create metadata store"),
        );
        let runner = Arc::new(FakeRunner::new());
        let inspector = Arc::new(FakeInspector::new(vec![stili_layer()]));

        let pipeline = Arc::new(
            VectorPipeline::new(
                store.clone(),
                runner.clone(),
                DatastoreConfig {
                    password: "secret".to_string(),
                    ..DatastoreConfig::default()
                },
                &ImporterConfig::default(),
            )
            .with_inspector(inspector.clone()),
        );

        let mut registry = HandlerRegistry::with_defaults(store.clone(), pipeline.clone());
        for handler in extra(pipeline.clone()) {
            registry.register(handler);
        }
        let registry = Arc::new(registry);
        let (orchestrator, _workers) = Orchestrator::start(registry.clone(), store.clone(), 2);

        Self {
            store,
            runner,
            inspector,
            pipeline,
            registry,
            orchestrator,
            dir,
        }
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        self.orchestrator.tracker()
    }

    /// Poll until the execution reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: ExecutionId) -> ExecutionRow {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let row = self
                .tracker()
                .require(id)
                .await
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
