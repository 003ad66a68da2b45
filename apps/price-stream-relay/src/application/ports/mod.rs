//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedProvider`: a selectable upstream price feed (connect, subscribe,
//!   keep-alive, decode)
//! - `FeedConnection`: one live text-frame connection to that feed
//! - `RelayObserver`: counters for client streams and subscription upkeep

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::market::MarketStatus;
use crate::domain::symbols::{Symbol, UpstreamId};

// =============================================================================
// Feed Events
// =============================================================================

/// A price observation for one upstream instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTick {
    /// Upstream instrument id, resolved through the symbol directory.
    pub upstream_id: UpstreamId,
    /// Price, when the message carried one.
    pub price: Option<Decimal>,
}

/// A decoded upstream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Market status update.
    Status(MarketStatus),
    /// Initial batch sent after a subscribe request.
    Snapshot(Vec<FeedTick>),
    /// Single trade tick.
    Trade(FeedTick),
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that end a feed connection.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The configured endpoint is not a valid URL.
    #[error("invalid feed endpoint: {0}")]
    InvalidEndpoint(String),

    /// Could not establish the connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Transport-level failure on an open connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Nothing was received for longer than the idle timeout.
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    /// An outbound request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors decoding a single upstream message. Never fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Message is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message is JSON but not a recognised shape.
    #[error("unrecognised message: {0}")]
    Unrecognised(String),

    /// Message has a recognised shape with invalid contents.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

// =============================================================================
// Ports
// =============================================================================

/// A live connection that exchanges text frames with the feed.
#[async_trait]
pub trait FeedConnection: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), FeedError>;

    /// Wait for the next text frame.
    ///
    /// Returns `None` once the connection is closed.
    async fn next_text(&mut self) -> Option<Result<String, FeedError>>;
}

/// An upstream price feed implementation.
///
/// Exactly one provider is active per process, chosen by configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Short provider name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Open and authenticate a new connection.
    async fn connect(&self) -> Result<Box<dyn FeedConnection>, FeedError>;

    /// Build the request subscribing to `symbols`.
    fn subscribe_request(&self, symbols: &[Symbol]) -> Result<String, FeedError>;

    /// Build the periodic keep-alive / status poll request.
    fn keepalive_request(&self) -> Result<String, FeedError>;

    /// Decode one inbound text frame.
    fn decode(&self, text: &str) -> Result<FeedEvent, CodecError>;
}

// =============================================================================
// Observability
// =============================================================================

/// Kind of event a stream dispatcher emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    /// Price list.
    Prices,
    /// Market status.
    MarketStatus,
}

/// Receives stream lifecycle and subscription upkeep notifications.
///
/// Every method defaults to doing nothing.
pub trait RelayObserver: Send + Sync {
    /// A client stream started.
    fn stream_opened(&self) {}

    /// A client stream ended.
    fn stream_closed(&self) {}

    /// An event was handed to a client stream.
    fn event_sent(&self, _kind: StreamEventKind) {}

    /// An event was dropped because the client buffer was full.
    fn event_dropped(&self, _kind: StreamEventKind) {}

    /// An eviction sweep finished.
    fn clients_swept(&self, _evicted: usize, _remaining: usize) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RelayObserver for NoopObserver {}
