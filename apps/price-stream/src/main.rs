//! Price Stream Binary
//!
//! Starts the price makers, the broadcast hub and the rates API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `PRICE_STREAM_API_TOKENS`: `login:token` pairs accepted on the stream endpoint
//!
//! ## Optional
//! - `PRICE_STREAM_API_PORT`: Rates API and WebSocket port (default: 8002)
//! - `PRICE_STREAM_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `PRICE_STREAM_ASSETS`: `name=price` seeds (default: `white_wool=45,black_wool=42`)
//! - `PRICE_STREAM_WRITE_DEADLINE_MS`: Per-write deadline for subscribers (default: 1000)
//! - `PRICE_STREAM_RATES_RPS`: `GET /rates` requests per second (default: 20)
//! - `PRICE_STREAM_STREAM_CONNECT_RPS`: Stream connects per second per login (default: 1)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: price-stream)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use price_stream::application::ports::{Authenticator, PriceStore};
use price_stream::application::services::start_price_makers;
use price_stream::infrastructure::auth::StaticTokenAuthenticator;
use price_stream::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
use price_stream::infrastructure::health::{HealthServer, HealthServerState};
use price_stream::infrastructure::http::{ApiServer, ApiState};
use price_stream::infrastructure::persistence::InMemoryPriceStore;
use price_stream::infrastructure::stream::ConnectionSettings;
use price_stream::infrastructure::telemetry;
use price_stream::{RateGovernor, ServiceConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting price stream");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Seed the price store
    let store: Arc<dyn PriceStore> = Arc::new(InMemoryPriceStore::with_assets(
        config
            .assets
            .iter()
            .map(|asset| (asset.name.clone(), asset.price)),
    )?);

    // Spawn the broadcast hub
    let (hub, hub_handle) = BroadcastHub::new(BroadcastConfig::from(config.broadcast));
    let hub_task = tokio::spawn(hub.run(shutdown_token.clone()));

    // Spawn one price maker per asset
    let makers = start_price_makers(
        Arc::clone(&store),
        hub_handle.ingress(),
        config.walk,
        &shutdown_token,
    )
    .await?;

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        hub_handle.clone(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Initialize API server
    let authenticator: Arc<dyn Authenticator> =
        Arc::new(StaticTokenAuthenticator::new(config.api_tokens.clone()));
    let api_state = ApiState {
        hub: hub_handle,
        store,
        authenticator,
        governor: Arc::new(RateGovernor::new()),
        limits: config.rate_limits,
        connection: ConnectionSettings::from(config.stream),
    };
    let api_server = ApiServer::new(config.server.api_port, api_state, shutdown_token.clone());

    // Spawn health server
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn API server
    let api_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "API server error");
            api_shutdown.cancel();
        }
    });

    tracing::info!("Price stream ready");

    await_shutdown(shutdown_token).await;

    let drain = async {
        for maker in makers {
            let _ = maker.await;
        }
        let _ = hub_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out waiting for tasks"
        );
    }

    tracing::info!("Price stream stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
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

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        api_port = config.server.api_port,
        health_port = config.server.health_port,
        assets = config.assets.len(),
        tokens = config.api_tokens.len(),
        write_deadline_ms = u64::try_from(config.stream.write_deadline.as_millis()).unwrap_or(u64::MAX),
        "Configuration loaded"
    );
    tracing::debug!(
        rates_rps = config.rate_limits.rates_per_second,
        stream_connect_rps = config.rate_limits.stream_connects_per_second,
        queue_capacity = config.broadcast.queue_capacity,
        max_swing = %config.walk.max_swing,
        "Tunables"
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
        () = shutdown_token.cancelled() => {
            tracing::warn!("Shutdown requested internally");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
