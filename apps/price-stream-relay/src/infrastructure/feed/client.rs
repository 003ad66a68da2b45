//! Feed Client
//!
//! Owns the single upstream connection and writes every decoded price and
//! status into [`MarketState`].
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──► Connecting ──► Subscribing ──► Streaming
//!      ▲                │                             │
//!      └──── delay ◄────┴──── error / close / idle ◄──┘
//! ```
//!
//! Exactly one subscribe request is sent per successful connect. While
//! streaming, a keep-alive manager scoped to the connection issues the status
//! poll and reports silence. The loop only exits when the cancellation token
//! fires.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::keepalive::{KeepAliveConfig, KeepAliveEvent, KeepAliveManager};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ConnectionState, FeedState};
use crate::application::ports::{CodecError, FeedError, FeedEvent, FeedProvider, FeedTick};
use crate::domain::market::MarketState;
use crate::domain::symbols::SymbolDirectory;
use crate::infrastructure::config::FeedSettings;
use crate::infrastructure::metrics::{self, FeedMessageKind};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone, Default)]
pub struct FeedClientConfig {
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Keep-alive configuration.
    pub keepalive: KeepAliveConfig,
}

impl FeedClientConfig {
    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &FeedSettings) -> Self {
        Self {
            reconnect: ReconnectConfig::from_feed_settings(settings),
            keepalive: KeepAliveConfig::from_feed_settings(settings),
        }
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// Upstream ingestion loop.
pub struct FeedClient {
    provider: Arc<dyn FeedProvider>,
    directory: Arc<SymbolDirectory>,
    market: Arc<MarketState>,
    state: Arc<FeedState>,
    config: FeedClientConfig,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        provider: Arc<dyn FeedProvider>,
        directory: Arc<SymbolDirectory>,
        market: Arc<MarketState>,
        config: FeedClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            directory,
            market,
            state: Arc::new(FeedState::new()),
            config,
            cancel,
        }
    }

    /// Connection state tracker for health reporting.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run the connection loop until cancelled.
    pub async fn run(self) {
        let provider = self.provider.name();
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(provider, error = %e, "Feed connection lost");
                    self.state.set_error(e.to_string());
                    metrics::set_feed_connected(provider, false);

                    let delay = policy.next_delay();
                    self.state.increment_reconnect_attempts();
                    metrics::record_reconnect(provider);
                    tracing::info!(
                        provider,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to feed"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.state.set_state(ConnectionState::Disconnected);
        metrics::set_feed_connected(provider, false);
        tracing::info!(provider, "Feed client stopped");
    }

    /// Connect, subscribe, and stream until error or cancellation.
    ///
    /// Returns `Ok(())` only when cancelled.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedError> {
        let provider = self.provider.name();

        self.state.set_state(ConnectionState::Connecting);
        let mut conn = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            conn = self.provider.connect() => conn?,
        };

        self.state.set_state(ConnectionState::Subscribing);
        let symbols = self.directory.subscribe_list();
        conn.send_text(self.provider.subscribe_request(symbols)?).await?;
        tracing::info!(provider, symbols = symbols.len(), "Subscribed to feed");

        self.state.set_state(ConnectionState::Streaming);
        metrics::set_feed_connected(provider, true);
        policy.reset();

        // Dropped with this scope, so the ticker dies with the connection.
        let mut keepalive = KeepAliveManager::spawn(self.config.keepalive.clone());

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                event = keepalive.next_event() => match event {
                    Some(KeepAliveEvent::Poll) => {
                        conn.send_text(self.provider.keepalive_request()?).await?;
                    }
                    Some(KeepAliveEvent::IdleTimeout(idle)) => {
                        return Err(FeedError::IdleTimeout(idle));
                    }
                    None => {
                        return Err(FeedError::IdleTimeout(self.config.keepalive.idle_timeout));
                    }
                },
                frame = conn.next_text() => match frame {
                    Some(Ok(text)) => {
                        keepalive.record_activity();
                        self.handle_text(&text);
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(FeedError::ConnectionClosed),
                },
            }
        }
    }

    /// Decode and apply one inbound frame. Never fails the connection.
    fn handle_text(&self, text: &str) {
        let started = Instant::now();
        let provider = self.provider.name();
        self.state.record_message();

        match self.provider.decode(text) {
            Ok(event) => self.apply(event),
            Err(CodecError::Unrecognised(preview)) => {
                tracing::debug!(provider, %preview, "Ignoring unrecognised feed message");
            }
            Err(e) => {
                tracing::warn!(provider, error = %e, "Dropping malformed feed message");
                self.state.record_decode_error();
                metrics::record_decode_error(provider);
            }
        }

        metrics::record_processing_duration(started.elapsed());
    }

    fn apply(&self, event: FeedEvent) {
        let provider = self.provider.name();
        match event {
            FeedEvent::Status(status) => {
                metrics::record_feed_message(provider, FeedMessageKind::Status);
                tracing::debug!(status = %status.as_value(), "Market status updated");
                self.market.set_status(status);
            }
            FeedEvent::Snapshot(ticks) => {
                metrics::record_feed_message(provider, FeedMessageKind::Snapshot);
                let total = ticks.len();
                let applied = ticks.into_iter().filter(|t| self.apply_tick(t)).count();
                tracing::info!(total, applied, "Applied subscription snapshot");
            }
            FeedEvent::Trade(tick) => {
                metrics::record_feed_message(provider, FeedMessageKind::Trade);
                self.apply_tick(&tick);
            }
        }
        metrics::set_cached_quotes(self.market.quote_count());
    }

    /// Returns whether a quote was written.
    fn apply_tick(&self, tick: &FeedTick) -> bool {
        let Some(symbol) = self.directory.resolve(tick.upstream_id.as_str()) else {
            metrics::record_unknown_instrument();
            tracing::trace!(upstream_id = %tick.upstream_id, "Ignoring unknown instrument");
            return false;
        };
        let Some(price) = tick.price else {
            return false;
        };

        match self.market.set_quote(symbol.clone(), price) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "Rejected quote");
                false
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::ports::{FeedConnection, MockFeedProvider};
    use crate::domain::market::{MarketStatus, QuoteValue};
    use crate::infrastructure::feed::codec::TrueDataCodec;

    /// Connection driven by test channels.
    struct ScriptedConnection {
        inbound: mpsc::UnboundedReceiver<String>,
        sent: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl FeedConnection for ScriptedConnection {
        async fn send_text(&mut self, text: String) -> Result<(), FeedError> {
            self.sent.send(text).map_err(|_| FeedError::ConnectionClosed)
        }

        async fn next_text(&mut self) -> Option<Result<String, FeedError>> {
            self.inbound.recv().await.map(Ok)
        }
    }

    /// Test-side ends of one scripted connection.
    struct Script {
        inbound: mpsc::UnboundedSender<String>,
    }

    struct Harness {
        market: Arc<MarketState>,
        state: Arc<FeedState>,
        connects: Arc<AtomicUsize>,
        sent: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        /// `plan[i]` decides whether connect attempt `i` succeeds.
        fn start(plan: Vec<bool>, keepalive: KeepAliveConfig) -> (Self, Vec<Script>) {
            let (sent_tx, sent) = mpsc::unbounded_channel();
            let mut scripts = Vec::new();
            let mut outcomes = VecDeque::new();
            for ok in plan {
                if ok {
                    let (inbound_tx, inbound) = mpsc::unbounded_channel();
                    scripts.push(Script {
                        inbound: inbound_tx,
                    });
                    outcomes.push_back(Some(ScriptedConnection {
                        inbound,
                        sent: sent_tx.clone(),
                    }));
                } else {
                    outcomes.push_back(None);
                }
            }
            let outcomes = Mutex::new(outcomes);

            let connects = Arc::new(AtomicUsize::new(0));
            let codec = TrueDataCodec::default();
            let mut provider = MockFeedProvider::new();
            provider.expect_name().return_const("mock");
            let counter = Arc::clone(&connects);
            provider.expect_connect().returning(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                match outcomes.lock().pop_front().flatten() {
                    Some(conn) => Ok(Box::new(conn) as Box<dyn FeedConnection>),
                    None => Err(FeedError::ConnectionFailed("refused".to_string())),
                }
            });
            let c = codec.clone();
            provider
                .expect_subscribe_request()
                .returning(move |symbols| Ok(c.encode_subscribe(symbols)?));
            let c = codec.clone();
            provider
                .expect_keepalive_request()
                .returning(move || Ok(c.encode_market_status_request()?));
            provider
                .expect_decode()
                .returning(move |text| codec.decode(text));

            let directory = Arc::new(
                SymbolDirectory::from_entries([("100000737", "ITC"), ("100002285", "TCS")])
                    .unwrap(),
            );
            let market = Arc::new(MarketState::new());
            let cancel = CancellationToken::new();
            let config = FeedClientConfig {
                reconnect: ReconnectConfig {
                    initial_delay: Duration::from_millis(100),
                    max_delay: Duration::from_secs(1),
                    multiplier: 1.0,
                    jitter_factor: 0.0,
                },
                keepalive,
            };

            let client = FeedClient::new(
                Arc::new(provider),
                directory,
                Arc::clone(&market),
                config,
                cancel.clone(),
            );
            let state = client.state();
            let task = tokio::spawn(client.run());

            (
                Self {
                    market,
                    state,
                    connects,
                    sent,
                    cancel,
                    task,
                },
                scripts,
            )
        }

        async fn wait_for_quote(&self, symbol: &str) -> QuoteValue {
            tokio::time::timeout(Duration::from_secs(60), async {
                loop {
                    let quote = self.market.get_quote(symbol);
                    if !quote.is_pending() {
                        return quote;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("quote never arrived")
        }

        fn drain_sent(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(text) = self.sent.try_recv() {
                out.push(text);
            }
            out
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.task.await.unwrap();
        }
    }

    fn quiet_keepalive() -> KeepAliveConfig {
        KeepAliveConfig {
            interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
        }
    }

    fn subscribe_count(sent: &[String]) -> usize {
        sent.iter().filter(|s| s.contains("addsymbol")).count()
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_failures_and_subscribes_once() {
        let (mut harness, scripts) =
            Harness::start(vec![false, false, false, true], quiet_keepalive());

        scripts[0]
            .inbound
            .send(r#"{"trade":["100000737",null,"128.50"]}"#.to_string())
            .unwrap();

        let quote = harness.wait_for_quote("ITC").await;
        assert_eq!(quote.to_string(), "128.50");
        assert_eq!(harness.connects.load(Ordering::SeqCst), 4);

        let sent = harness.drain_sent();
        assert_eq!(subscribe_count(&sent), 1);
        assert_eq!(
            sent[0],
            r#"{"method":"addsymbol","symbols":["ITC","TCS"]}"#
        );
        assert!(sent[1..].iter().all(|s| s == r#"{"method":"getmarketstatus"}"#));

        let snap = harness.state.snapshot();
        assert_eq!(snap.state, ConnectionState::Streaming);
        assert_eq!(snap.connect_attempts, 4);
        assert_eq!(snap.reconnect_attempts, 0);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn resubscribes_after_connection_closes() {
        let (mut harness, mut scripts) = Harness::start(vec![true, true], quiet_keepalive());

        let second = scripts.pop().unwrap();
        let first = scripts.pop().unwrap();
        drop(first);

        second
            .inbound
            .send(r#"{"trade":["100002285",null,"3890.10"]}"#.to_string())
            .unwrap();
        assert_eq!(harness.wait_for_quote("TCS").await.to_string(), "3890.10");

        assert_eq!(harness.connects.load(Ordering::SeqCst), 2);
        assert_eq!(subscribe_count(&harness.drain_sent()), 2);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_and_unknown_messages_are_not_fatal() {
        let (harness, scripts) = Harness::start(vec![true], quiet_keepalive());
        let feed = &scripts[0].inbound;

        feed.send("{garbage".to_string()).unwrap();
        feed.send(r#"{"trade":["999999",null,"1.00"]}"#.to_string()).unwrap();
        feed.send(r#"{"success":true,"message":"welcome"}"#.to_string()).unwrap();
        feed.send(r#"{"trade":["100000737",null,"128.50"]}"#.to_string()).unwrap();

        assert_eq!(harness.wait_for_quote("ITC").await.to_string(), "128.50");
        assert_eq!(harness.connects.load(Ordering::SeqCst), 1);
        assert_eq!(harness.market.quote_count(), 1);

        let snap = harness.state.snapshot();
        assert_eq!(snap.messages_received, 4);
        assert_eq!(snap.decode_errors, 1);

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn applies_snapshot_and_status() {
        let (harness, scripts) = Harness::start(vec![true], quiet_keepalive());
        let feed = &scripts[0].inbound;

        feed.send(
            json!({
                "symbolsadded": 2,
                "symbollist": [
                    ["100000737", "ITC", "t", "128.45"],
                    ["100002285", "TCS", "t", null]
                ]
            })
            .to_string(),
        )
        .unwrap();
        feed.send(r#"{"NSE_EQ":"OPEN"}"#.to_string()).unwrap();

        assert_eq!(harness.wait_for_quote("ITC").await.to_string(), "128.45");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(harness.market.get_quote("TCS").is_pending());
        assert_eq!(
            harness.market.get_status(),
            MarketStatus::new(json!("OPEN"))
        );

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_is_replaced() {
        let keepalive = KeepAliveConfig {
            interval: Duration::from_millis(100),
            idle_timeout: Duration::from_millis(500),
        };
        let (mut harness, scripts) = Harness::start(vec![true, true], keepalive);

        // First connection stays silent; second delivers.
        scripts[1]
            .inbound
            .send(r#"{"trade":["100000737",null,"1.25"]}"#.to_string())
            .unwrap();

        assert_eq!(harness.wait_for_quote("ITC").await.to_string(), "1.25");
        assert_eq!(harness.connects.load(Ordering::SeqCst), 2);

        let sent = harness.drain_sent();
        assert_eq!(subscribe_count(&sent), 2);
        assert!(sent.iter().any(|s| s.contains("getmarketstatus")));

        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_reconnect_loop() {
        let (harness, _scripts) = Harness::start(vec![], quiet_keepalive());

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(harness.connects.load(Ordering::SeqCst) >= 3);
        assert!(harness.state.snapshot().last_error.is_some());

        let state = Arc::clone(&harness.state);
        harness.stop().await;
        assert_eq!(state.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn config_from_settings() {
        let settings = FeedSettings::default();
        let config = FeedClientConfig::from_feed_settings(&settings);
        assert_eq!(config.keepalive.interval, Duration::from_secs(5));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(5));
    }
}
