//! Reconnection Policy
//!
//! Delay schedule between upstream connection attempts. The relay never gives
//! up on its feed, so the policy always yields a delay. With a multiplier of
//! `1.0` it is a fixed delay; above that it backs off exponentially up to a cap.
//! No delay is ever shorter than [`MIN_DELAY`], whatever the configuration.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::FeedSettings;

/// Shortest delay between two connection attempts.
pub const MIN_DELAY: Duration = Duration::from_millis(100);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (1.0 keeps the delay fixed; smaller values
    /// are treated as 1.0).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 1.0,
            jitter_factor: 0.1,
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &FeedSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: 0.1,
        }
    }

    /// Same configuration without jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Stateful delay generator for one reconnect loop.
///
/// # Example
///
/// ```rust
/// use price_stream_relay::infrastructure::feed::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(1),
///     multiplier: 2.0,
///     jitter_factor: 0.0,
/// });
///
/// assert_eq!(policy.next_delay(), Duration::from_millis(100));
/// assert_eq!(policy.next_delay(), Duration::from_millis(200));
///
/// // A connection that reached streaming state starts over.
/// policy.reset();
/// assert_eq!(policy.next_delay(), Duration::from_millis(100));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);

        let base = self.current_delay.min(self.config.max_delay).max(MIN_DELAY);
        let delay = self.apply_jitter(base).max(MIN_DELAY);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (base.as_millis() as f64 * self.config.multiplier.max(1.0)).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        delay
    }

    /// Reset after a connection reached streaming state.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
