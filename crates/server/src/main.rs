//! geoingest server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use geoingest_core::config::AppConfig;
use geoingest_importer::{
    CommandRunner, HandlerRegistry, Orchestrator, SystemCommandRunner, VectorPipeline,
};
use geoingest_server::state::WorkerWatchdog;
use geoingest_server::{AppState, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// geoingest - geospatial upload and import service
#[derive(Parser, Debug)]
#[command(name = "geoingestd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "GEOINGEST_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from the optional file and `GEOINGEST_` env vars.
fn load_config(config_file: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(config_file);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %config_file, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_file));
    } else {
        tracing::debug!("No config file found at {}", config_file);
    }

    // GEOINGEST_CONFIG is only the path, not configuration.
    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("GEOINGEST_") && key != "GEOINGEST_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: geoingestd --config /path/to/config.toml\n  \
             2. Environment variables: GEOINGEST_SERVER__BIND=0.0.0.0:8080 \
             GEOINGEST_DATASTORE__PASSWORD=... geoingestd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set GEOINGEST_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    figment
        .merge(Env::prefixed("GEOINGEST_").split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("geoingest v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    let warnings = config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    for warning in warnings {
        tracing::warn!("Configuration warning: {}", warning);
    }

    geoingest_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = geoingest_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    tokio::fs::create_dir_all(&config.server.upload_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create upload directory {}",
                config.server.upload_dir.display()
            )
        })?;

    for program in [&config.importer.ogr2ogr_path, &config.importer.ogrinfo_path] {
        if !program.exists() {
            tracing::warn!(
                program = %program.display(),
                "converter binary not found, imports will fail until it is installed"
            );
        }
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let pipeline = Arc::new(VectorPipeline::new(
        metadata.clone(),
        runner,
        config.datastore.clone(),
        &config.importer,
    ));
    let registry = Arc::new(HandlerRegistry::with_defaults(metadata.clone(), pipeline));
    tracing::info!(handlers = ?registry.kinds(), "Import handlers registered");

    let (orchestrator, workers) =
        Orchestrator::start(registry, metadata.clone(), config.pipeline.workers);
    let _watchdog_handle = Arc::new(WorkerWatchdog::new(workers)).spawn(Duration::from_secs(10));
    tracing::info!("Pipeline worker watchdog spawned");

    if config.pipeline.resume_on_startup {
        let resumed = orchestrator
            .resume_unfinished()
            .await
            .context("failed to resume unfinished executions")?;
        tracing::info!(resumed, "Unfinished executions resumed");
    } else {
        tracing::info!("Resume of unfinished executions disabled");
    }

    let state = AppState::new(config.clone(), metadata, orchestrator);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
