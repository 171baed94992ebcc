//! Mirror Gate - a caching, rate-limiting API gateway

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mirror_gate::api::create_router;
use mirror_gate::clock::SystemClock;
use mirror_gate::tasks::SweepHandle;
use mirror_gate::{AppState, Config};

/// Main entry point for the gateway.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build caches, limiters and the upstream client
/// 4. Start background expiry sweeps
/// 5. Serve HTTP until SIGINT/SIGTERM, then stop the sweeps
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror_gate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mirror Gate");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        port = config.server_port,
        api_url = %config.upstream.api_url,
        max_entries = config.cache.max_entries,
        sweep_interval_secs = config.cache.sweep_interval.as_secs(),
        compute_mode = ?config.cache.compute_mode,
        rate_limit = config.rate_limit.enabled,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config, SystemClock::shared()).context("failed to build gateway state")?;
    let sweepers = state.spawn_sweepers(config.cache.sweep_interval);
    info!(count = sweepers.len(), "Background sweep tasks started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(sweepers))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the sweeps.
async fn shutdown_signal(sweepers: Vec<SweepHandle>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for sweeper in &sweepers {
        sweeper.stop();
    }
    warn!(count = sweepers.len(), "Sweep tasks stopped");
}
