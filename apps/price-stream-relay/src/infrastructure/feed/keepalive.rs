//! Keep-alive Manager
//!
//! Drives the periodic status-poll request on a live feed connection and
//! detects a silent connection. One manager is spawned per connection; the
//! returned [`KeepAliveHandle`] cancels it when dropped, so a ticker never
//! outlives the connection that owns it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::infrastructure::config::FeedSettings;

/// Configuration for keep-alive behavior.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Interval between keep-alive requests.
    pub interval: Duration,
    /// Silence after which the connection is considered dead.
    pub idle_timeout: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl KeepAliveConfig {
    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &FeedSettings) -> Self {
        Self {
            interval: settings.keepalive_interval,
            idle_timeout: settings.idle_timeout,
        }
    }
}

/// Events emitted by the keep-alive manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepAliveEvent {
    /// Send the keep-alive request now.
    Poll,
    /// Nothing was received for the given duration.
    IdleTimeout(Duration),
}

/// Last-activity timestamp shared with the connection reader.
#[derive(Debug)]
pub struct ActivityTracker {
    last_seen: RwLock<Instant>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    /// Create a tracker that counts from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_seen: RwLock::new(Instant::now()),
        }
    }

    /// Record that data was received.
    pub fn record(&self) {
        *self.last_seen.write() = Instant::now();
    }

    /// Time since data was last received.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_seen.read().elapsed()
    }
}

/// Keep-alive ticker for one connection.
pub struct KeepAliveManager {
    config: KeepAliveConfig,
    activity: Arc<ActivityTracker>,
    event_tx: mpsc::Sender<KeepAliveEvent>,
    cancel: CancellationToken,
}

/// Owns a running keep-alive manager; dropping it stops the manager.
pub struct KeepAliveHandle {
    events: mpsc::Receiver<KeepAliveEvent>,
    activity: Arc<ActivityTracker>,
    _guard: DropGuard,
}

impl KeepAliveHandle {
    /// Wait for the next keep-alive event.
    pub async fn next_event(&mut self) -> Option<KeepAliveEvent> {
        self.events.recv().await
    }

    /// Record inbound activity on the connection.
    pub fn record_activity(&self) {
        self.activity.record();
    }
}

impl KeepAliveManager {
    /// Create a new keep-alive manager.
    #[must_use]
    pub const fn new(
        config: KeepAliveConfig,
        activity: Arc<ActivityTracker>,
        event_tx: mpsc::Sender<KeepAliveEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            activity,
            event_tx,
            cancel,
        }
    }

    /// Spawn a manager for a new connection.
    ///
    /// The first [`KeepAliveEvent::Poll`] is emitted immediately.
    #[must_use]
    pub fn spawn(config: KeepAliveConfig) -> KeepAliveHandle {
        let activity = Arc::new(ActivityTracker::new());
        let (event_tx, events) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let manager = Self::new(config, Arc::clone(&activity), event_tx, cancel.clone());
        tokio::spawn(manager.run());

        KeepAliveHandle {
            events,
            activity,
            _guard: cancel.drop_guard(),
        }
    }

    /// Run until cancelled, the receiver is dropped, or an idle timeout fires.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keep-alive manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if !self.check_and_poll().await {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `false` once the loop should exit.
    async fn check_and_poll(&self) -> bool {
        let idle = self.activity.idle_for();
        if idle > self.config.idle_timeout {
            tracing::warn!(
                idle_secs = idle.as_secs(),
                timeout_secs = self.config.idle_timeout.as_secs(),
                "Feed idle timeout detected"
            );
            let _ = self.event_tx.send(KeepAliveEvent::IdleTimeout(idle)).await;
            return false;
        }

        if self.event_tx.send(KeepAliveEvent::Poll).await.is_err() {
            tracing::debug!("Event channel closed, stopping keep-alive");
            return false;
        }

        true
    }
}
