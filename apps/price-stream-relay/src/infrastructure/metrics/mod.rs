//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Feed**: Upstream messages, decode failures, reconnects, connection state
//! - **Market**: Number of cached quotes
//! - **Streams**: Open client streams, frames sent and dropped
//! - **Subscriptions**: Registered clients, updates, evictions
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::ports::{RelayObserver, StreamEventKind};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again after a successful install returns the existing handle.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "price_relay_feed_messages_total",
        "Total messages received from the upstream feed by kind"
    );
    describe_counter!(
        "price_relay_feed_decode_errors_total",
        "Total upstream messages that could not be decoded"
    );
    describe_counter!(
        "price_relay_unknown_instruments_total",
        "Total ticks for upstream ids missing from the symbol directory"
    );
    describe_counter!(
        "price_relay_feed_reconnects_total",
        "Total upstream reconnection attempts"
    );
    describe_gauge!(
        "price_relay_feed_connected",
        "1 while the upstream feed connection is streaming"
    );
    describe_histogram!(
        "price_relay_feed_processing_seconds",
        "Time to decode and apply one upstream message"
    );

    // Market
    describe_gauge!(
        "price_relay_cached_quotes",
        "Number of symbols with a cached price"
    );

    // Streams
    describe_gauge!(
        "price_relay_open_streams",
        "Number of open client streams"
    );
    describe_counter!(
        "price_relay_frames_sent_total",
        "Total frames handed to client streams"
    );
    describe_counter!(
        "price_relay_frames_dropped_total",
        "Total frames dropped because a client buffer was full"
    );

    // Subscriptions
    describe_gauge!(
        "price_relay_registered_clients",
        "Number of clients in the subscription registry"
    );
    describe_counter!(
        "price_relay_subscription_updates_total",
        "Total subscription update requests by outcome"
    );
    describe_counter!(
        "price_relay_clients_evicted_total",
        "Total idle clients evicted from the registry"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for upstream message kinds.
#[derive(Debug, Clone, Copy)]
pub enum FeedMessageKind {
    /// Market status update.
    Status,
    /// Post-subscribe snapshot.
    Snapshot,
    /// Trade tick.
    Trade,
}

impl FeedMessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Snapshot => "snapshot",
            Self::Trade => "trade",
        }
    }
}

const fn event_kind_label(kind: StreamEventKind) -> &'static str {
    match kind {
        StreamEventKind::Prices => "prices",
        StreamEventKind::MarketStatus => "market_status",
    }
}

/// Record a message received from the upstream feed.
pub fn record_feed_message(provider: &'static str, kind: FeedMessageKind) {
    counter!(
        "price_relay_feed_messages_total",
        "provider" => provider,
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record an upstream message that failed to decode.
pub fn record_decode_error(provider: &'static str) {
    counter!("price_relay_feed_decode_errors_total", "provider" => provider).increment(1);
}

/// Record a tick for an id the symbol directory does not know.
pub fn record_unknown_instrument() {
    counter!("price_relay_unknown_instruments_total").increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect(provider: &'static str) {
    counter!("price_relay_feed_reconnects_total", "provider" => provider).increment(1);
}

/// Update the upstream connection state.
pub fn set_feed_connected(provider: &'static str, connected: bool) {
    gauge!("price_relay_feed_connected", "provider" => provider)
        .set(if connected { 1.0 } else { 0.0 });
}

/// Record upstream message processing duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("price_relay_feed_processing_seconds").record(duration.as_secs_f64());
}

/// Update the number of cached quotes.
#[allow(clippy::cast_precision_loss)]
pub fn set_cached_quotes(count: usize) {
    gauge!("price_relay_cached_quotes").set(count as f64);
}

/// Record a client stream opening.
pub fn stream_opened() {
    gauge!("price_relay_open_streams").increment(1.0);
}

/// Record a client stream closing.
pub fn stream_closed() {
    gauge!("price_relay_open_streams").decrement(1.0);
}

/// Record a frame handed to a client stream.
pub fn record_frame_sent(kind: StreamEventKind) {
    counter!("price_relay_frames_sent_total", "kind" => event_kind_label(kind)).increment(1);
}

/// Record a frame dropped for a slow client.
pub fn record_frame_dropped(kind: StreamEventKind) {
    counter!("price_relay_frames_dropped_total", "kind" => event_kind_label(kind)).increment(1);
}

/// Update the registered client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_registered_clients(count: usize) {
    gauge!("price_relay_registered_clients").set(count as f64);
}

/// Record a subscription update request.
pub fn record_subscription_update(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    counter!("price_relay_subscription_updates_total", "outcome" => outcome).increment(1);
}

/// Record evicted clients.
pub fn record_clients_evicted(count: usize) {
    counter!("price_relay_clients_evicted_total").increment(count as u64);
}

// =============================================================================
// Observer Adapter
// =============================================================================

/// Records dispatcher and eviction notifications as Prometheus metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusObserver;

impl RelayObserver for PrometheusObserver {
    fn stream_opened(&self) {
        stream_opened();
    }

    fn stream_closed(&self) {
        stream_closed();
    }

    fn event_sent(&self, kind: StreamEventKind) {
        record_frame_sent(kind);
    }

    fn event_dropped(&self, kind: StreamEventKind) {
        record_frame_dropped(kind);
    }

    fn clients_swept(&self, evicted: usize, remaining: usize) {
        set_registered_clients(remaining);
        if evicted > 0 {
            record_clients_evicted(evicted);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_message_kind_as_str() {
        assert_eq!(FeedMessageKind::Status.as_str(), "status");
        assert_eq!(FeedMessageKind::Snapshot.as_str(), "snapshot");
        assert_eq!(FeedMessageKind::Trade.as_str(), "trade");
    }

    #[test]
    fn event_kind_labels() {
        assert_eq!(event_kind_label(StreamEventKind::Prices), "prices");
        assert_eq!(event_kind_label(StreamEventKind::MarketStatus), "market_status");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_feed_message("test", FeedMessageKind::Trade);
        record_frame_dropped(StreamEventKind::Prices);
        set_cached_quotes(3);
        stream_opened();
        stream_closed();
    }

    #[test]
    fn observer_without_recorder_is_noop() {
        let observer = PrometheusObserver;
        observer.stream_opened();
        observer.event_sent(StreamEventKind::MarketStatus);
        observer.clients_swept(2, 5);
        observer.stream_closed();
    }
}
