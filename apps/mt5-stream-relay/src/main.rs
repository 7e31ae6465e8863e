//! MT5 Stream Relay Binary
//!
//! Starts the HTTP relay in front of an MT5 terminal bridge.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin mt5-stream-relay
//! ```
//!
//! # Environment Variables
//!
//! All optional; unset variables fall back to defaults.
//!
//! - `MT5_BRIDGE_URL`: Bridge base URL (default: <http://127.0.0.1:5001>)
//! - `MT5_BRIDGE_TOKEN`: Bridge auth token, sent as `X-Bridge-Token`
//! - `RELAY_BIND_ADDR`: Listen address (default: 127.0.0.1:3000)
//! - `BRIDGE_HTTP_TIMEOUT_SECS`: Unary bridge request timeout (default: 10)
//! - `BRIDGE_CONNECT_TIMEOUT_SECS`: Bridge connect timeout (default: 10)
//! - `STREAM_IDLE_TIMEOUT_MS`: Bar stream idle watchdog (default: 20000)
//! - `RENDER_TICK_MS`: Chart render coalescing tick (default: 16)
//! - `STREAM_BOOTSTRAP_BARS`: Backfill length on subscribe (default: 300)
//! - `QUOTE_POLL_INTERVAL_MS`: Watchlist poll interval (default: 1000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: mt5-stream-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mt5_stream_relay::infrastructure::telemetry;
use mt5_stream_relay::{
    BridgeClient, HealthState, RelaySettings, create_router, health_router, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout. Open SSE streams never close on their
/// own, so shutdown is forced after this long.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting MT5 Stream Relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let settings = RelaySettings::from_env();
    log_config(&settings);

    let shutdown_token = CancellationToken::new();

    let bridge = Arc::new(BridgeClient::new(settings.bridge.client_config())?);

    let health_state = Arc::new(HealthState::new(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    ));
    let app = create_router(bridge).merge(health_router(health_state));

    let listener = tokio::net::TcpListener::bind(settings.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind_addr))?;
    tracing::info!(addr = %settings.server.bind_addr, "Relay listening");

    let server_token = shutdown_token.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "Relay server error");
        }
    });

    tracing::info!("Relay ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await.is_err() {
        tracing::warn!("Graceful shutdown timed out, aborting open streams");
    }

    tracing::info!("Relay stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration. The bridge token never appears here.
fn log_config(settings: &RelaySettings) {
    tracing::info!(
        bridge_url = %settings.bridge.url,
        bind_addr = %settings.server.bind_addr,
        token_configured = settings.bridge.token.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        idle_timeout = ?settings.stream.idle_timeout,
        render_tick = ?settings.stream.render_tick,
        bootstrap_bars = settings.stream.bootstrap_bars,
        poll_interval = ?settings.quotes.poll_interval,
        "Stream tuning"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
