// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  promsnap — cached single-flight Prometheus exporter
//
//  Scrape path:  axum on tokio, one route
//  Collection:   driven by whichever scrape request arrives first
//  Config:       YAML file + PROMSNAP_ env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use promsnap_core::ExporterConfig;
use promsnap_export::{CollectionCoordinator, scrape_response};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod self_metrics;
use self_metrics::SelfMetrics;

#[derive(Parser, Debug)]
#[command(name = "promsnap", version, about = "promsnap — Prometheus scrape endpoint")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/promsnap/promsnap.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone)]
struct AppState {
    coordinator: Arc<CollectionCoordinator>,
    pipeline: Arc<SelfMetrics>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "promsnap starting");

    // ── Config ──
    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        ExporterConfig::load(&cli.config)?
    } else {
        info!("No config file found, using defaults");
        ExporterConfig::default()
    };

    // ── Pipeline & coordinator ──
    let pipeline = Arc::new(SelfMetrics::new());
    let coordinator = Arc::new(CollectionCoordinator::new(
        pipeline.clone(),
        &config.collector,
    ));

    let state = AppState { coordinator, pipeline };
    let app = Router::new()
        .route(&config.server.path, get(metrics_handler))
        .with_state(state);

    info!(
        addr = %config.server.addr,
        path = %config.server.path,
        cache_window_ms = config.collector.cache_window_ms,
        "Scrape endpoint ready"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("promsnap stopped");
    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.pipeline.observe_scrape();
    let snapshot = state.coordinator.acquire().await;
    match scrape_response(&snapshot) {
        Ok(response) => response.map(Body::from),
        Err(err) => {
            error!(error = %err, "Failed to build scrape response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
}
