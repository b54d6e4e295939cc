//! Prometheus metrics for the geoingest server.
//!
//! Pipeline metrics (executions, step durations, converter runs, schemas) are
//! owned by `geoingest_importer::metrics` and registered here alongside the
//! HTTP boundary counters.
//!
//! The `/metrics` endpoint is unauthenticated. It exposes aggregate counts
//! only, but should still be network-restricted to the Prometheus scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REGISTER_ONCE: Once = Once::new();

pub static UPLOADS_ACCEPTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "geoingest_uploads_accepted_total",
            "Total number of uploads dispatched to a handler",
        ),
        &["handler"],
    )
    .expect("metric creation failed")
});

pub static UPLOADS_REJECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "geoingest_uploads_rejected_total",
            "Total number of uploads rejected by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static COPY_FALLBACKS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "geoingest_copy_fallbacks_total",
        "Total number of copies served by the generic copier",
    )
    .expect("metric creation failed")
});

/// Register all metrics with the global registry.
///
/// Idempotent: calls after the first are no-ops, so several routers may be
/// built in one process.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_ACCEPTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_REJECTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(COPY_FALLBACKS.clone()))
            .expect("metric registration failed");
        geoingest_importer::metrics::register_metrics(&REGISTRY)
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count a rejected upload.
pub fn record_upload_rejected(reason: &str) {
    UPLOADS_REJECTED.with_label_values(&[reason]).inc();
}
