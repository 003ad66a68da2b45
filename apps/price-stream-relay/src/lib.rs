#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream Relay - Market Price Fan-out
//!
//! Maintains a single connection to an upstream NSE price feed, keeps the
//! latest price per symbol in memory, and serves each HTTP client a filtered
//! view of those prices over Server-Sent Events.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Shared stores and value types
//!   - `market`: Latest quote per symbol and market status
//!   - `subscription`: Per-client symbol lists
//!   - `symbols`: Upstream id → symbol directory
//!   - `limits`: Risk limit values
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream feed provider interface
//!   - `services`: Per-client stream dispatch, idle subscription eviction
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: TrueData and simulated providers, reconnecting ingestion client
//!   - `http`: Subscription updates and SSE streams
//!   - `config`: Environment configuration
//!   - `health`: Health check and metrics endpoint
//!
//! # Data Flow
//!
//! ```text
//!                      ┌──────────────┐     ┌────────────┐──► /stock-updates (client 1)
//! Upstream WS ──► FeedClient ──►│ MarketState  │◄────│ Dispatcher │──► /stock-updates (client 2)
//!                      └──────────────┘     └────────────┘──► /stock-stream  (client N)
//!                                                 ▲
//!                POST /update-subscription ──► SubscriptionRegistry
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Shared stores with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::limits::{RiskLimits, RiskLimitsStore};
pub use domain::market::{MarketState, MarketStatus, PriceEntry, QuoteValue};
pub use domain::subscription::{ClientId, SubscriptionRegistry};
pub use domain::symbols::{Symbol, SymbolDirectory, UpstreamId};

// Application
pub use application::ports::{FeedEvent, FeedProvider, FeedTick, RelayObserver};
pub use application::services::{Cadence, FrameStyle, StreamDispatcher, StreamEvent, SymbolSource};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ProviderKind, RelayConfig};

// Feed
pub use infrastructure::feed::{FeedClient, FeedClientConfig, SimulatedProvider, TrueDataProvider};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
