//! Execution status endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use geoingest_core::{ExecutionId, ExecutionStatusResponse};
use serde::Deserialize;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct ListExecutionsParams {
    pub limit: Option<u32>,
}

/// GET /v1/executions/{execution_id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> ApiResult<Json<ExecutionStatusResponse>> {
    let id = ExecutionId::parse(&execution_id)?;
    let status = state
        .orchestrator
        .tracker()
        .status(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("execution {id} not found")))?;
    Ok(Json(status))
}

/// GET /v1/executions?limit=N - Most recent executions first.
pub async fn list_executions(
    State(state): State<AppState>,
    Query(params): Query<ListExecutionsParams>,
) -> ApiResult<Json<Vec<ExecutionStatusResponse>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(ApiError::validation(
            "limit",
            format!("Ensure this value is between 1 and {MAX_LIST_LIMIT}."),
        ));
    }
    let executions = state.orchestrator.tracker().list(limit).await?;
    Ok(Json(executions))
}
