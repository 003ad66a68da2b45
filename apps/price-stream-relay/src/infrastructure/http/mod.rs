//! Application HTTP Server
//!
//! Client-facing endpoints on the application port.
//!
//! # Endpoints
//!
//! - `POST /update-subscription` - Replace the caller's symbol list
//! - `GET /stock-updates` - SSE stream of the caller's subscribed prices and market status
//! - `GET /stock-stream?ids=A,B` - SSE stream of a fixed symbol list with named events
//! - `GET /api/values/get-values` - Current risk limit values
//! - `POST /api/values/set-values` - Partial update of risk limit values
//!
//! Clients are identified by peer IP address, so the router must be served
//! with connect info (see [`HttpServer::run`]).

mod handlers;
mod sse;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::Cadence;
use crate::domain::limits::RiskLimitsStore;
use crate::domain::market::MarketState;
use crate::domain::subscription::SubscriptionRegistry;
use crate::domain::symbols::SymbolDirectory;
use crate::infrastructure::config::StreamSettings;

pub use handlers::{ErrorResponse, SubscriptionResponse, UpdateSubscriptionRequest};

// =============================================================================
// Application State
// =============================================================================

/// Shared state for the application server.
pub struct AppState {
    market: Arc<MarketState>,
    registry: Arc<SubscriptionRegistry>,
    directory: Arc<SymbolDirectory>,
    limits: Arc<RiskLimitsStore>,
    streams: StreamSettings,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create application state.
    ///
    /// Every stream opened through this state is cancelled when `shutdown`
    /// fires.
    #[must_use]
    pub const fn new(
        market: Arc<MarketState>,
        registry: Arc<SubscriptionRegistry>,
        directory: Arc<SymbolDirectory>,
        limits: Arc<RiskLimitsStore>,
        streams: StreamSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            market,
            registry,
            directory,
            limits,
            streams,
            shutdown,
        }
    }

    /// Cadence of `/stock-updates`: prices every tick.
    #[must_use]
    pub const fn updates_cadence(&self) -> Cadence {
        Cadence::per_tick(self.streams.dispatch_tick, self.streams.status_every_ticks)
    }

    /// Cadence of `/stock-stream`: prices every 2 s, status every 5 s.
    ///
    /// Runs on its own 1 s tick, independent of the configured dispatch tick.
    #[must_use]
    pub const fn stream_cadence(&self) -> Cadence {
        Cadence::FIXED_LIST
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let values = Router::new()
        .route("/get-values", get(handlers::get_values))
        .route("/set-values", post(handlers::set_values));

    Router::new()
        .route("/update-subscription", post(handlers::update_subscription))
        .route("/stock-updates", get(handlers::stock_updates))
        .route("/stock-stream", get(handlers::stock_stream))
        .nest("/api/values", values)
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// Application HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new application server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server encounters a
    /// fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Application server listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(self.cancel.cancelled_owned())
        .await
        .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Application server stopped");
        Ok(())
    }
}

/// Application server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
