//! eidafed-fd - Federated FDSN station and dataselect service
//!
//! Routes each client query to the data centers holding matching streams and
//! streams back one merged response.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eidafed_fd::api::health::BUILD;
use eidafed_fd::config::{Args, FederatorConfig};
use eidafed_fd::federation::{FederationLog, JsonLinesLog, TracingLog};
use eidafed_fd::{build_http_client, build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = FederatorConfig::try_from(args)?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "eidafed_fd={0},eidafed_common={0},tower_http=info",
                    config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting EIDA Federator (eidafed-fd) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        BUILD.git_hash,
        BUILD.timestamp,
        BUILD.profile
    );
    info!("Routing service: {}", config.routing_url);
    info!(
        "Federation: {} workers, {:?} leg timeout, {} retries, {} day windows",
        config.federation.workers,
        config.federation.leg_timeout,
        config.federation.leg_retries,
        config.federation.max_window.num_days()
    );

    let json_log = match &config.log_file {
        Some(path) => {
            let sink = JsonLinesLog::open(path)
                .await
                .with_context(|| format!("Failed to open operational log {}", path.display()))?;
            info!("Operational log: {}", path.display());
            Some(Arc::new(sink))
        }
        None => None,
    };
    let log: Arc<dyn FederationLog> = match &json_log {
        Some(sink) => sink.clone(),
        None => Arc::new(TracingLog),
    };

    let http_client = build_http_client().context("Failed to build HTTP client")?;
    let state = AppState::new(
        config.federation.clone(),
        http_client,
        config.routing_url.clone(),
        log,
    );
    let app = build_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("eidafed-fd listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(sink) = json_log {
        sink.flush().await;
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
