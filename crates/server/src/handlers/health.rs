//! Liveness endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub handlers: Vec<&'static str>,
}

/// GET /v1/health - Health check.
///
/// Unauthenticated so probes and load balancers can reach it. Fails when the
/// metadata store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        handlers: state.registry().kinds().iter().map(|k| k.key()).collect(),
    }))
}
