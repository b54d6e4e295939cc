//! Application state shared across handlers.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use axum::response::Response;
use geoingest_core::config::AppConfig;
use geoingest_core::{ImportOptions, ResourceOverrides, UploadFiles};
use geoingest_importer::{HandlerRegistry, Orchestrator};
use geoingest_metadata::MetadataStore;
use geoingest_metadata::models::ResourceRow;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Receives uploads that no registered handler accepts.
#[async_trait]
pub trait FallbackUpload: Send + Sync {
    async fn handle(
        &self,
        files: &UploadFiles,
        options: &ImportOptions,
        staging_dir: &Path,
    ) -> ApiResult<Response>;
}

/// Rejects unmatched uploads with 415 and removes the staged files.
pub struct RejectUnsupported;

#[async_trait]
impl FallbackUpload for RejectUnsupported {
    async fn handle(
        &self,
        files: &UploadFiles,
        _options: &ImportOptions,
        staging_dir: &Path,
    ) -> ApiResult<Response> {
        if let Err(e) = tokio::fs::remove_dir_all(staging_dir).await {
            tracing::warn!(dir = %staging_dir.display(), error = %e, "failed to remove rejected upload");
        }
        let name = files
            .base_file()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Err(ApiError::UnsupportedFormat(format!(
            "no handler accepts '{name}'"
        )))
    }
}

/// Copies resources that carry no handler reference.
#[async_trait]
pub trait GenericCopier: Send + Sync {
    async fn copy(
        &self,
        resource: &ResourceRow,
        overrides: &ResourceOverrides,
    ) -> ApiResult<ResourceRow>;
}

/// Duplicates the catalog row only. The copy points at the source table.
pub struct MetadataCopier {
    metadata: Arc<dyn MetadataStore>,
}

impl MetadataCopier {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl GenericCopier for MetadataCopier {
    async fn copy(
        &self,
        resource: &ResourceRow,
        overrides: &ResourceOverrides,
    ) -> ApiResult<ResourceRow> {
        let resource_id = Uuid::new_v4();
        let short = resource_id.simple().to_string();
        let title = overrides
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| resource.title.clone());

        let row = ResourceRow {
            resource_id,
            execution_id: None,
            name: format!("{}_{}", resource.name, &short[..8]),
            title,
            table_name: resource.table_name.clone(),
            geometry_column: resource.geometry_column.clone(),
            geometry_type: resource.geometry_type.clone(),
            files_json: resource.files_json.clone(),
            source_resource_id: Some(resource.resource_id),
            created_at: OffsetDateTime::now_utc(),
        };
        Ok(self.metadata.create_resource(&row).await?)
    }
}

/// Watches the pipeline workers and reports any that stop.
///
/// Workers only return when the queue closes. A worker that finishes while
/// the server is running has panicked outside a step, and the pool is one
/// worker smaller until restart.
pub struct WorkerWatchdog {
    workers: Mutex<Vec<(usize, JoinHandle<()>)>>,
}

impl WorkerWatchdog {
    pub fn new(handles: Vec<JoinHandle<()>>) -> Self {
        Self {
            workers: Mutex::new(handles.into_iter().enumerate().collect()),
        }
    }

    /// Number of workers still running.
    pub async fn alive(&self) -> usize {
        self.workers
            .lock()
            .await
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Spawn a task that checks the workers every `interval`.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.check_workers().await;
            }
        })
    }

    async fn check_workers(&self) {
        let finished = {
            let mut workers = self.workers.lock().await;
            let (done, running): (Vec<_>, Vec<_>) = workers
                .drain(..)
                .partition(|(_, handle)| handle.is_finished());
            *workers = running;
            done
        };

        for (worker, handle) in finished {
            match handle.await {
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!(worker, panic = ?join_err, "pipeline worker panicked");
                }
                Err(join_err) => {
                    tracing::warn!(worker, error = ?join_err, "pipeline worker was cancelled");
                }
                Ok(()) => {
                    tracing::warn!(worker, "pipeline worker exited");
                }
            }
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Pipeline entry point.
    pub orchestrator: Orchestrator,
    pub fallback_upload: Arc<dyn FallbackUpload>,
    pub copier: Arc<dyn GenericCopier>,
}

impl AppState {
    /// Create the state with the default collaborators: unmatched uploads
    /// are rejected and handler-less copies duplicate the catalog row.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            copier: Arc::new(MetadataCopier::new(metadata.clone())),
            metadata,
            orchestrator,
            fallback_upload: Arc::new(RejectUnsupported),
        }
    }

    pub fn with_fallback_upload(mut self, fallback: Arc<dyn FallbackUpload>) -> Self {
        self.fallback_upload = fallback;
        self
    }

    pub fn with_copier(mut self, copier: Arc<dyn GenericCopier>) -> Self {
        self.copier = copier;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        self.orchestrator.registry()
    }
}
