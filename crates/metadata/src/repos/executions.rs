//! Execution request repository.

use crate::error::MetadataResult;
use crate::models::{ExecutionRow, ExecutionUpdate};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for execution tracking.
#[async_trait]
pub trait ExecutionRepo: Send + Sync {
    /// Insert a new execution record.
    async fn create_execution(&self, execution: &ExecutionRow) -> MetadataResult<()>;

    /// Get an execution by ID.
    async fn get_execution(&self, exec_id: Uuid) -> MetadataResult<Option<ExecutionRow>>;

    /// Most recent executions first.
    async fn list_executions(&self, limit: u32) -> MetadataResult<Vec<ExecutionRow>>;

    /// Set status, step, stage and timestamp and append one log line, in a
    /// single statement.
    ///
    /// Terminal rows are never changed: returns `InvalidStateTransition` when
    /// the execution already finished and `NotFound` when it does not exist.
    async fn update_execution(&self, exec_id: Uuid, update: &ExecutionUpdate)
    -> MetadataResult<()>;

    /// Replace the output document.
    async fn set_execution_output(
        &self,
        exec_id: Uuid,
        output_json: &str,
        last_updated: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Executions still `created` or `running`, oldest first.
    async fn get_unfinished_executions(&self) -> MetadataResult<Vec<ExecutionRow>>;
}
