//! Catalog resource endpoints.

use crate::error::{ApiError, ApiResult};
use crate::metrics::COPY_FALLBACKS;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use geoingest_core::ResourceOverrides;
use geoingest_core::files::ExecutionAccepted;
use geoingest_metadata::models::ResourceRow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Field carrying the copy overrides.
pub const COPY_DEFAULTS_FIELD: &str = "defaults";

/// A catalog resource as returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub resource_id: Uuid,
    pub execution_id: Option<Uuid>,
    pub name: String,
    pub title: String,
    pub table_name: String,
    pub geometry_column: Option<String>,
    pub geometry_type: Option<String>,
    pub files: Option<Value>,
    pub source_resource_id: Option<Uuid>,
    /// Key of the handler that imported the resource.
    pub handler: Option<String>,
    pub created_at: String,
}

impl ResourceResponse {
    fn from_row(row: ResourceRow, handler: Option<String>) -> Self {
        let files = row
            .files_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok());
        Self {
            resource_id: row.resource_id,
            execution_id: row.execution_id,
            name: row.name,
            title: row.title,
            table_name: row.table_name,
            geometry_column: row.geometry_column,
            geometry_type: row.geometry_type,
            files,
            source_resource_id: row.source_resource_id,
            handler,
            created_at: row
                .created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| row.created_at.to_string()),
        }
    }
}

/// Body of a copy request. `defaults` may be a JSON object or a string
/// holding one.
#[derive(Debug, Default, Deserialize)]
pub struct CopyRequest {
    #[serde(default)]
    pub defaults: Option<Value>,
}

/// Parse the optional copy body into resource overrides.
pub fn parse_copy_overrides(body: &[u8]) -> ApiResult<ResourceOverrides> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ResourceOverrides::new());
    }
    let request: CopyRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid copy request: {e}")))?;

    let defaults = match request.defaults {
        None | Some(Value::Null) => return Ok(ResourceOverrides::new()),
        Some(Value::String(raw)) if raw.trim().is_empty() => {
            return Ok(ResourceOverrides::new());
        }
        Some(Value::String(raw)) => serde_json::from_str::<Value>(&raw).map_err(|e| {
            ApiError::validation(COPY_DEFAULTS_FIELD, format!("Value must be valid JSON: {e}"))
        })?,
        Some(other) => other,
    };

    match defaults {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::validation(
            COPY_DEFAULTS_FIELD,
            "Value must be a JSON object.",
        )),
    }
}

/// GET /v1/resources/{resource_id}
pub async fn get_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
) -> ApiResult<Json<ResourceResponse>> {
    let row = state
        .metadata
        .get_resource(resource_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("resource {resource_id} not found")))?;
    let handler = state
        .metadata
        .get_handler_info(resource_id)
        .await?
        .map(|info| info.handler_key);
    Ok(Json(ResourceResponse::from_row(row, handler)))
}

/// PUT /v1/resources/{resource_id}/copy
///
/// A resource imported by a registered handler is copied by that handler's
/// pipeline and the response carries the execution id. Any other resource
/// goes to the generic copier and the response carries the new resource.
pub async fn copy_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Response> {
    let overrides = parse_copy_overrides(&body)?;

    let resource = state
        .metadata
        .get_resource(resource_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("resource {resource_id} not found")))?;

    if let Some(handler) = state.registry().handler_for_resource(resource_id).await? {
        let execution_id = state
            .orchestrator
            .dispatch_copy(handler.as_ref(), resource_id, overrides)
            .await?;
        tracing::info!(
            resource_id = %resource_id,
            execution_id = %execution_id,
            handler = %handler.kind(),
            "copy dispatched"
        );
        let body = ExecutionAccepted {
            execution_id: execution_id.to_string(),
            status_url: format!("/v1/executions/{execution_id}"),
        };
        return Ok(Json(body).into_response());
    }

    COPY_FALLBACKS.inc();
    let copy = state.copier.copy(&resource, &overrides).await?;
    tracing::info!(
        resource_id = %resource_id,
        copy_id = %copy.resource_id,
        "resource copied without a handler"
    );
    Ok(Json(ResourceResponse::from_row(copy, None)).into_response())
}
