//! Execution tracker.
//!
//! Every pipeline stage records progress through this type. Each call is a
//! single atomic update of status, step, stage and timestamp that also appends
//! one log line; a terminal record refuses further updates.

use crate::error::{ImportError, ImportResult};
use geoingest_core::{
    ExecutionAction, ExecutionId, ExecutionStatus, ExecutionStatusResponse, HandlerKind,
    ImportStage, PipelineStep,
};
use geoingest_metadata::{MetadataError, MetadataStore};
use geoingest_metadata::models::{ExecutionRow, ExecutionUpdate};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Clone)]
pub struct ExecutionTracker {
    metadata: Arc<dyn MetadataStore>,
}

impl ExecutionTracker {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Create the record for a newly accepted execution.
    pub async fn create(
        &self,
        id: ExecutionId,
        action: ExecutionAction,
        handler: Option<HandlerKind>,
        input: &serde_json::Value,
    ) -> ImportResult<()> {
        let now = OffsetDateTime::now_utc();
        let row = ExecutionRow {
            exec_id: *id.as_uuid(),
            action: action.as_str().to_string(),
            status: ExecutionStatus::Created.as_str().to_string(),
            step: String::new(),
            stage: ImportStage::Created.as_str().to_string(),
            handler: handler.map(|h| h.key().to_string()),
            input_json: serde_json::to_string(input)?,
            output_json: None,
            log: format!("{} execution accepted\n", action.as_str()),
            created_at: now,
            last_updated: now,
        };
        self.metadata.create_execution(&row).await?;
        crate::metrics::EXECUTIONS_CREATED
            .with_label_values(&[action.as_str()])
            .inc();
        tracing::info!(execution_id = %id, action = %action, "execution created");
        Ok(())
    }

    /// Record progress on a non-terminal execution.
    pub async fn update(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        step: PipelineStep,
        stage: ImportStage,
        message: &str,
    ) -> ImportResult<()> {
        self.write(id, status, step.as_str(), stage, message).await
    }

    /// Mark the execution FAILED with `error` as the final log line.
    pub async fn fail(&self, id: ExecutionId, step: Option<PipelineStep>, error: &str) -> ImportResult<()> {
        let step = step.map(|s| s.as_str()).unwrap_or_default();
        let message = if step.is_empty() {
            format!("failed: {error}")
        } else {
            format!("{step} failed: {error}")
        };
        self.write(id, ExecutionStatus::Failed, step, ImportStage::Failed, &message)
            .await
    }

    /// Mark the execution SUCCESS after its last step.
    pub async fn succeed(&self, id: ExecutionId, step: PipelineStep, message: &str) -> ImportResult<()> {
        self.write(id, ExecutionStatus::Success, step.as_str(), step.stage(), message)
            .await
    }

    pub async fn set_output(&self, id: ExecutionId, output: &serde_json::Value) -> ImportResult<()> {
        let json = serde_json::to_string(output)?;
        self.metadata
            .set_execution_output(*id.as_uuid(), &json, OffsetDateTime::now_utc())
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: ExecutionId) -> ImportResult<Option<ExecutionRow>> {
        Ok(self.metadata.get_execution(*id.as_uuid()).await?)
    }

    /// Like [`Self::get`] but a missing record is an error.
    pub async fn require(&self, id: ExecutionId) -> ImportResult<ExecutionRow> {
        self.get(id)
            .await?
            .ok_or_else(|| ImportError::ExecutionNotFound(id.to_string()))
    }

    pub async fn status(&self, id: ExecutionId) -> ImportResult<Option<ExecutionStatusResponse>> {
        self.get(id).await?.map(status_response).transpose()
    }

    pub async fn list(&self, limit: u32) -> ImportResult<Vec<ExecutionStatusResponse>> {
        self.metadata
            .list_executions(limit)
            .await?
            .into_iter()
            .map(status_response)
            .collect()
    }

    async fn write(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        step: &str,
        stage: ImportStage,
        message: &str,
    ) -> ImportResult<()> {
        // The store refuses writes to terminal rows on its own; backward moves
        // between live statuses are caught here.
        if let Some(row) = self.get(id).await? {
            let current: ExecutionStatus = row.status.parse()?;
            if !current.can_transition_to(status) {
                return Err(MetadataError::InvalidStateTransition {
                    from: current.to_string(),
                    to: status.to_string(),
                }
                .into());
            }
        }
        let update = ExecutionUpdate {
            status: status.as_str().to_string(),
            step: step.to_string(),
            stage: stage.as_str().to_string(),
            log_line: message.to_string(),
            last_updated: OffsetDateTime::now_utc(),
        };
        self.metadata.update_execution(*id.as_uuid(), &update).await?;
        tracing::debug!(
            execution_id = %id,
            status = %status,
            step,
            stage = %stage,
            message,
            "execution updated"
        );
        Ok(())
    }
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

/// Public view of an execution record.
pub fn status_response(row: ExecutionRow) -> ImportResult<ExecutionStatusResponse> {
    Ok(ExecutionStatusResponse {
        execution_id: row.exec_id.to_string(),
        action: row.action,
        status: row.status.parse()?,
        step: row.stage,
        handler: row.handler,
        created_at: format_timestamp(row.created_at),
        last_updated: format_timestamp(row.last_updated),
        log: row.log,
        input: serde_json::from_str(&row.input_json)?,
        output: row
            .output_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoingest_metadata::SqliteStore;

    async fn tracker() -> (tempfile::TempDir, ExecutionTracker) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("m.db"), None).await.unwrap();
        (dir, ExecutionTracker::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_lifecycle_appends_log() {
        let (_dir, tracker) = tracker().await;
        let id = ExecutionId::new();
        tracker
            .create(
                id,
                ExecutionAction::Import,
                Some(HandlerKind::GeoPackage),
                &serde_json::json!({"files": {}}),
            )
            .await
            .unwrap();

        let status = tracker.status(id).await.unwrap().unwrap();
        assert_eq!(status.status, ExecutionStatus::Created);
        assert_eq!(status.step, "created");

        tracker
            .update(
                id,
                ExecutionStatus::Running,
                PipelineStep::ImportResource,
                ImportStage::SchemaSetup,
                "building schema for layer roads",
            )
            .await
            .unwrap();
        tracker
            .succeed(id, PipelineStep::CreateResource, "import finished")
            .await
            .unwrap();

        let row = tracker.require(id).await.unwrap();
        assert_eq!(row.status, "success");
        assert_eq!(row.stage, "registered");
        let lines: Vec<_> = row.log.lines().collect();
        assert_eq!(
            lines,
            vec![
                "import execution accepted",
                "building schema for layer roads",
                "import finished"
            ]
        );
        assert!(row.last_updated >= row.created_at);
    }

    #[tokio::test]
    async fn test_failed_execution_is_terminal() {
        let (_dir, tracker) = tracker().await;
        let id = ExecutionId::new();
        tracker
            .create(id, ExecutionAction::Copy, None, &serde_json::json!({}))
            .await
            .unwrap();
        tracker
            .fail(id, Some(PipelineStep::CopyData), "ogr2ogr failed")
            .await
            .unwrap();

        let status = tracker.status(id).await.unwrap().unwrap();
        assert_eq!(status.status, ExecutionStatus::Failed);
        assert!(status.log.ends_with("copy_data failed: ogr2ogr failed\n"));

        let err = tracker
            .update(
                id,
                ExecutionStatus::Running,
                PipelineStep::CopyResource,
                ImportStage::Registered,
                "late",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Metadata(MetadataError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_running_execution_cannot_return_to_created() {
        let (_dir, tracker) = tracker().await;
        let id = ExecutionId::new();
        tracker
            .create(id, ExecutionAction::Import, None, &serde_json::json!({}))
            .await
            .unwrap();
        tracker
            .update(
                id,
                ExecutionStatus::Running,
                PipelineStep::StartImport,
                ImportStage::Created,
                "starting start_import",
            )
            .await
            .unwrap();

        let err = tracker
            .update(
                id,
                ExecutionStatus::Created,
                PipelineStep::StartImport,
                ImportStage::Created,
                "rewind",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Metadata(MetadataError::InvalidStateTransition { .. })
        ));
        let row = tracker.require(id).await.unwrap();
        assert_eq!(row.status, "running");
        assert!(!row.log.contains("rewind"));
    }

    #[tokio::test]
    async fn test_require_missing_execution() {
        let (_dir, tracker) = tracker().await;
        let err = tracker.require(ExecutionId::new()).await.unwrap_err();
        assert!(matches!(err, ImportError::ExecutionNotFound(_)));
    }
}
