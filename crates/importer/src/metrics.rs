//! Prometheus metrics for the import pipeline.
//!
//! Metrics live in the importer so pipeline workers can record them directly;
//! the server registers them with its exported registry via [`register_metrics`].

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::LazyLock;

pub static EXECUTIONS_CREATED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "geoingest_executions_created_total",
            "Total number of executions created by action",
        ),
        &["action"],
    )
    .expect("metric creation failed")
});

pub static EXECUTIONS_SUCCEEDED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "geoingest_executions_succeeded_total",
            "Total number of executions that finished successfully by action",
        ),
        &["action"],
    )
    .expect("metric creation failed")
});

pub static EXECUTIONS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "geoingest_executions_failed_total",
            "Total number of executions that failed by action",
        ),
        &["action"],
    )
    .expect("metric creation failed")
});

pub static EXECUTIONS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "geoingest_executions_in_flight",
        "Number of executions with a queued or running step",
    )
    .expect("metric creation failed")
});

pub static STEP_PANICS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "geoingest_pipeline_step_panics_total",
        "Total number of pipeline steps that panicked",
    )
    .expect("metric creation failed")
});

pub static STEP_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "geoingest_pipeline_step_duration_seconds",
            "Pipeline step duration by step and outcome",
        )
        .buckets(vec![
            0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0,
        ]),
        &["step", "outcome"],
    )
    .expect("metric creation failed")
});

pub static COMMAND_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "geoingest_external_command_duration_seconds",
            "External command wall time by program",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        &["program"],
    )
    .expect("metric creation failed")
});

pub static SCHEMAS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "geoingest_schemas_created_total",
        "Total number of schema definitions created",
    )
    .expect("metric creation failed")
});

pub static SCHEMAS_REUSED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "geoingest_schemas_reused_total",
        "Total number of schema lookups that found an existing definition",
    )
    .expect("metric creation failed")
});

/// Register every pipeline metric with `registry`.
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(EXECUTIONS_CREATED.clone()))?;
    registry.register(Box::new(EXECUTIONS_SUCCEEDED.clone()))?;
    registry.register(Box::new(EXECUTIONS_FAILED.clone()))?;
    registry.register(Box::new(EXECUTIONS_IN_FLIGHT.clone()))?;
    registry.register(Box::new(STEP_PANICS.clone()))?;
    registry.register(Box::new(STEP_DURATION.clone()))?;
    registry.register(Box::new(COMMAND_DURATION.clone()))?;
    registry.register(Box::new(SCHEMAS_CREATED.clone()))?;
    registry.register(Box::new(SCHEMAS_REUSED.clone()))?;
    Ok(())
}
