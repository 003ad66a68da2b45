//! Price Stream Relay Binary
//!
//! Starts the upstream feed client and the HTTP servers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required (TrueData provider)
//! - `TRUEDATA_USER`: TrueData user name
//! - `TRUEDATA_PASSWORD`: TrueData password
//!
//! ## Optional
//! - `FEED_PROVIDER`: truedata | simulated (default: truedata)
//! - `TRUEDATA_URL`: WebSocket endpoint (default: wss://push.truedata.in:8084)
//! - `SYMBOL_DIRECTORY_PATH`: JSON symbol directory (default: built-in NSE list)
//! - `RELAY_HTTP_PORT`: Application HTTP port (default: 5000)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use price_stream_relay::application::ports::FeedProvider;
use price_stream_relay::application::services::run_eviction;
use price_stream_relay::infrastructure::feed::{
    FeedClient, FeedClientConfig, SimulatedProvider, TrueDataProvider,
};
use price_stream_relay::infrastructure::health::{HealthServer, HealthServerState};
use price_stream_relay::infrastructure::http::{AppState, HttpServer};
use price_stream_relay::infrastructure::metrics::PrometheusObserver;
use price_stream_relay::infrastructure::telemetry;
use price_stream_relay::{
    MarketState, ProviderKind, RelayConfig, RiskLimitsStore, SubscriptionRegistry,
    SymbolDirectory, init_metrics,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err("failed to install rustls crypto provider".into());
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Price Stream Relay");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let directory = Arc::new(match &config.symbol_directory_path {
        Some(path) => SymbolDirectory::load(path)?,
        None => SymbolDirectory::nse_default(),
    });
    tracing::info!(instruments = directory.len(), "Symbol directory loaded");

    let shutdown_token = CancellationToken::new();

    let market = Arc::new(MarketState::new());
    let registry = Arc::new(SubscriptionRegistry::new());
    let limits = Arc::new(RiskLimitsStore::new());

    let provider = build_provider(&config, &directory)?;
    let provider_name = provider.name();

    let feed_client = FeedClient::new(
        provider,
        Arc::clone(&directory),
        Arc::clone(&market),
        FeedClientConfig::from_feed_settings(&config.feed),
        shutdown_token.clone(),
    );

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        provider_name,
        feed_client.state(),
        Arc::clone(&market),
        Arc::clone(&registry),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    let app_state = Arc::new(AppState::new(
        Arc::clone(&market),
        Arc::clone(&registry),
        Arc::clone(&directory),
        limits,
        config.streams.clone(),
        shutdown_token.clone(),
    ));
    let http_server = HttpServer::new(
        config.server.http_port,
        app_state,
        shutdown_token.clone(),
    );

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(feed_client.run()));

    tasks.push(tokio::spawn(run_eviction(
        Arc::clone(&registry),
        config.streams.subscription_ttl,
        config.streams.eviction_interval,
        Arc::new(PrometheusObserver),
        shutdown_token.clone(),
    )));

    let health_shutdown = shutdown_token.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
            health_shutdown.cancel();
        }
    }));

    let http_shutdown = shutdown_token.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "Application server error");
            http_shutdown.cancel();
        }
    }));

    tracing::info!("Price stream relay ready");

    await_shutdown(&shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Task ended abnormally");
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out with tasks still running"
        );
    }

    tracing::info!("Price stream relay stopped");
    Ok(())
}

/// Select the upstream provider named in the configuration.
fn build_provider(
    config: &RelayConfig,
    directory: &Arc<SymbolDirectory>,
) -> Result<Arc<dyn FeedProvider>, BoxError> {
    let key = config.feed.market_status_key.as_str();
    match config.provider {
        ProviderKind::TrueData => {
            let settings = config
                .truedata
                .as_ref()
                .ok_or("TrueData provider selected without credentials")?;
            let provider = TrueDataProvider::new(settings, key)?;
            tracing::info!(url = %provider.redacted_url(), "Using TrueData feed");
            Ok(Arc::new(provider))
        }
        ProviderKind::Simulated => {
            tracing::warn!("Using simulated feed; prices are synthetic");
            Ok(Arc::new(SimulatedProvider::new(Arc::clone(directory), key)))
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        provider = config.provider.as_str(),
        http_port = config.server.http_port,
        health_port = config.server.health_port,
        market_status_key = %config.feed.market_status_key,
        "Configuration loaded"
    );
    tracing::debug!(
        keepalive_secs = config.feed.keepalive_interval.as_secs(),
        idle_timeout_secs = config.feed.idle_timeout.as_secs(),
        dispatch_tick_ms = config.streams.dispatch_tick.as_millis(),
        status_every_ticks = config.streams.status_every_ticks,
        subscription_ttl_secs = config.streams.subscription_ttl.as_secs(),
        validate_symbols = config.streams.validate_symbols,
        "Feed and stream settings"
    );
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

/// Wait for shutdown signal (SIGTERM or SIGINT) or an internal cancellation.
async fn await_shutdown(shutdown_token: &CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
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
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
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
            tracing::warn!("Server failure, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
