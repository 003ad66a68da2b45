//! Idle subscription eviction.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::RelayObserver;
use crate::domain::subscription::SubscriptionRegistry;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically remove registry entries with no open stream that have been
/// idle for longer than `ttl`.
///
/// Each sweep is reported to `observer`. A zero `every` is raised to one
/// second. Runs until `cancel` fires.
pub async fn run_eviction(
    registry: Arc<SubscriptionRegistry>,
    ttl: Duration,
    every: Duration,
    observer: Arc<dyn RelayObserver>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every.max(MIN_SWEEP_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let evicted = registry.evict_idle(ttl);
                let stats = registry.stats();
                observer.clients_swept(evicted, stats.clients);
                if evicted > 0 {
                    tracing::info!(
                        evicted,
                        remaining = stats.clients,
                        open_streams = stats.open_streams,
                        "Evicted idle subscriptions"
                    );
                }
            }
        }
    }

    tracing::debug!("Subscription eviction stopped");
}
