//! Feed connection state tracker, read by the health endpoint.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle of the upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection; waiting to (re)connect.
    #[default]
    Disconnected,
    /// Opening the connection.
    Connecting,
    /// Sending the subscription request.
    Subscribing,
    /// Processing inbound messages.
    Streaming,
}

impl ConnectionState {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
        }
    }
}

/// Shared view of the feed connection.
#[derive(Debug, Default)]
pub struct FeedState {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_message_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    connect_attempts: AtomicU64,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    decode_errors: AtomicU64,
}

impl FeedState {
    /// Create a tracker in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        match state {
            ConnectionState::Connecting => {
                self.connect_attempts.fetch_add(1, Ordering::Relaxed);
            }
            ConnectionState::Streaming => {
                *self.last_connected_at.write() = Some(Utc::now());
                self.reconnect_attempts.store(0, Ordering::Relaxed);
                *self.last_error.write() = None;
            }
            ConnectionState::Disconnected | ConnectionState::Subscribing => {}
        }
    }

    /// Record a connection failure and move to `Disconnected`.
    pub fn set_error(&self, message: String) {
        *self.state.write() = ConnectionState::Disconnected;
        *self.last_error.write() = Some(message);
    }

    /// Increment reconnect attempts since the last successful stream.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one inbound message.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        *self.last_message_at.write() = Some(Utc::now());
    }

    /// Record one message that failed to decode.
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the feed is currently streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            last_message_at: *self.last_message_at.read(),
            last_error: self.last_error.read().clone(),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`FeedState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// When the feed last reached streaming state.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// When the last inbound message arrived.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Last connection error.
    pub last_error: Option<String>,
    /// Total connection attempts since startup.
    pub connect_attempts: u64,
    /// Reconnect attempts since the last successful stream.
    pub reconnect_attempts: u32,
    /// Total inbound messages.
    pub messages_received: u64,
    /// Total messages that failed to decode.
    pub decode_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_clears_error_and_attempts() {
        let state = FeedState::new();
        state.set_state(ConnectionState::Connecting);
        state.set_error("refused".to_string());
        state.increment_reconnect_attempts();
        state.set_state(ConnectionState::Connecting);

        let snap = state.snapshot();
        assert_eq!(snap.state, ConnectionState::Connecting);
        assert_eq!(snap.connect_attempts, 2);
        assert_eq!(snap.reconnect_attempts, 1);
        assert_eq!(snap.last_error.as_deref(), Some("refused"));

        state.set_state(ConnectionState::Streaming);
        let snap = state.snapshot();
        assert!(state.is_streaming());
        assert_eq!(snap.reconnect_attempts, 0);
        assert!(snap.last_error.is_none());
        assert!(snap.last_connected_at.is_some());
    }

    #[test]
    fn counts_messages() {
        let state = FeedState::new();
        state.record_message();
        state.record_message();
        state.record_decode_error();

        let snap = state.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.decode_errors, 1);
        assert!(snap.last_message_at.is_some());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Streaming).unwrap(),
            "\"streaming\""
        );
        assert_eq!(ConnectionState::Subscribing.as_str(), "subscribing");
    }
}
