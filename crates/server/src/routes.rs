//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
///
/// Each path answers only the methods routed here; any other method gets
/// 405 Method Not Allowed.
pub fn create_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/v1/uploads", post(handlers::create_upload))
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes));

    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/executions", get(handlers::list_executions))
        .route("/v1/executions/{execution_id}", get(handlers::get_execution))
        .route("/v1/resources/{resource_id}", get(handlers::get_resource))
        .route(
            "/v1/resources/{resource_id}/copy",
            put(handlers::copy_resource),
        );

    let mut router = Router::new().merge(upload_routes).merge(api_routes);

    // When enabled, /metrics should be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
