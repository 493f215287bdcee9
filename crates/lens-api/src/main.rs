//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lens_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // rustls 0.23+ needs a process-wide provider; an Err means one is already set
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("lens=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting lens-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let state = AppState::from_env(config.clone())
        .map_err(|e| anyhow::anyhow!("failed to create application state: {}", e))?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    // Health gauges
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = state
        .health
        .as_ref()
        .clone()
        .spawn_poller(state.pipeline.config().health_poll_interval, shutdown_rx);

    if std::env::var("LENS_AUTOSTART")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
    {
        if let Err(e) = state.pipeline.start().await {
            warn!(error = %e, "Autostart failed, waiting for POST /start");
        }
    }

    let pipeline = std::sync::Arc::clone(&state.pipeline);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    // Close the bus first so open SSE streams end and the server can drain
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            pipeline.shutdown().await;
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    let _ = poller.await;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
