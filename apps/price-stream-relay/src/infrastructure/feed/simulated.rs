//! Simulated Feed Provider
//!
//! In-process stand-in for the TrueData service, used for local development
//! without credentials. It speaks the same JSON protocol, so the real codec and
//! client loop are exercised end to end:
//!
//! - `addsymbol` is answered with a `symbolsadded` snapshot
//! - `getmarketstatus` is answered with a status frame
//! - every tick one subscribed instrument moves by a small random step and a
//!   `trade` frame is emitted

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde_json::{Value, json};

use super::codec::TrueDataCodec;
use crate::application::ports::{CodecError, FeedConnection, FeedError, FeedEvent, FeedProvider};
use crate::domain::symbols::{Symbol, SymbolDirectory, UpstreamId};

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Feed provider backed by a random walk.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    directory: Arc<SymbolDirectory>,
    codec: TrueDataCodec,
    market_status_key: String,
    tick_interval: Duration,
}

impl SimulatedProvider {
    /// Create a simulated provider for the instruments in `directory`.
    #[must_use]
    pub fn new(directory: Arc<SymbolDirectory>, market_status_key: &str) -> Self {
        Self {
            directory,
            codec: TrueDataCodec::new(market_status_key),
            market_status_key: market_status_key.to_string(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Override the interval between trade frames.
    #[must_use]
    pub const fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }
}

#[async_trait]
impl FeedProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn connect(&self) -> Result<Box<dyn FeedConnection>, FeedError> {
        tracing::info!(
            instruments = self.directory.len(),
            tick_ms = self.tick_interval.as_millis(),
            "Starting simulated feed"
        );
        Ok(Box::new(SimulatedConnection::new(
            Arc::clone(&self.directory),
            self.market_status_key.clone(),
            self.tick_interval,
        )))
    }

    fn subscribe_request(&self, symbols: &[Symbol]) -> Result<String, FeedError> {
        Ok(self.codec.encode_subscribe(symbols)?)
    }

    fn keepalive_request(&self) -> Result<String, FeedError> {
        Ok(self.codec.encode_market_status_request()?)
    }

    fn decode(&self, text: &str) -> Result<FeedEvent, CodecError> {
        self.codec.decode(text)
    }
}

// =============================================================================
// Connection
// =============================================================================

#[derive(Debug)]
struct Instrument {
    id: UpstreamId,
    symbol: Symbol,
    /// Price in paise.
    paise: i64,
}

struct SimulatedConnection {
    directory: Arc<SymbolDirectory>,
    market_status_key: String,
    tick: tokio::time::Interval,
    rng: StdRng,
    instruments: Vec<Instrument>,
    outbox: VecDeque<String>,
}

impl SimulatedConnection {
    fn new(directory: Arc<SymbolDirectory>, market_status_key: String, tick_interval: Duration) -> Self {
        let mut tick = tokio::time::interval(tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self {
            directory,
            market_status_key,
            tick,
            rng: StdRng::from_rng(&mut rand::rng()),
            instruments: Vec::new(),
            outbox: VecDeque::new(),
        }
    }

    fn handle_request(&mut self, text: &str) -> Result<(), FeedError> {
        let request: Value =
            serde_json::from_str(text).map_err(|e| FeedError::Transport(e.to_string()))?;

        match request.get("method").and_then(Value::as_str) {
            Some("addsymbol") => {
                let wanted: Vec<&str> = request
                    .get("symbols")
                    .and_then(Value::as_array)
                    .map(|symbols| symbols.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                self.add_symbols(&wanted);
            }
            Some("getmarketstatus") => {
                let mut status = serde_json::Map::new();
                status.insert(self.market_status_key.clone(), Value::from("OPEN"));
                self.outbox.push_back(Value::Object(status).to_string());
            }
            other => tracing::debug!(method = ?other, "Simulated feed ignoring request"),
        }
        Ok(())
    }

    fn add_symbols(&mut self, wanted: &[&str]) {
        let ids: HashMap<&str, &UpstreamId> = self
            .directory
            .entries()
            .map(|(id, symbol)| (symbol.as_str(), id))
            .collect();

        let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let mut rows = Vec::new();
        for name in wanted {
            let Some(id) = ids.get(name) else { continue };
            if self.instruments.iter().any(|i| i.symbol.as_str() == *name) {
                continue;
            }
            let paise = self.rng.random_range(10_000..=300_000);
            rows.push(json!([id.as_str(), name, now, Decimal::new(paise, 2).to_string()]));
            self.instruments.push(Instrument {
                id: (*id).clone(),
                symbol: Symbol::from(*name),
                paise,
            });
        }

        let snapshot = json!({
            "success": true,
            "message": "symbols added",
            "symbolsadded": rows.len(),
            "symbollist": rows,
        });
        self.outbox.push_back(snapshot.to_string());
    }

    fn next_trade(&mut self) -> Option<String> {
        if self.instruments.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..self.instruments.len());
        let step: i64 = self.rng.random_range(-50..=50);
        let instrument = &mut self.instruments[index];
        instrument.paise = (instrument.paise + step).max(5);

        let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let frame = json!({
            "trade": [
                instrument.id.as_str(),
                now,
                Decimal::new(instrument.paise, 2).to_string(),
            ]
        });
        Some(frame.to_string())
    }
}

#[async_trait]
impl FeedConnection for SimulatedConnection {
    async fn send_text(&mut self, text: String) -> Result<(), FeedError> {
        self.handle_request(&text)
    }

    async fn next_text(&mut self) -> Option<Result<String, FeedError>> {
        loop {
            if let Some(frame) = self.outbox.pop_front() {
                return Some(Ok(frame));
            }
            self.tick.tick().await;
            if let Some(frame) = self.next_trade() {
                return Some(Ok(frame));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SimulatedProvider {
        let directory =
            SymbolDirectory::from_entries([("100000737", "ITC"), ("100002285", "TCS")]).unwrap();
        SimulatedProvider::new(Arc::new(directory), "NSE_EQ")
            .with_tick_interval(Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn answers_subscribe_with_snapshot_then_trades() {
        let provider = provider();
        let mut conn = provider.connect().await.unwrap();

        let request = provider
            .subscribe_request(&[Symbol::from("ITC"), Symbol::from("UNKNOWN")])
            .unwrap();
        conn.send_text(request).await.unwrap();

        let snapshot = conn.next_text().await.unwrap().unwrap();
        let FeedEvent::Snapshot(ticks) = provider.decode(&snapshot).unwrap() else {
            panic!("expected snapshot, got {snapshot}");
        };
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].upstream_id.as_str(), "100000737");
        assert!(ticks[0].price.is_some());

        for _ in 0..5 {
            let trade = conn.next_text().await.unwrap().unwrap();
            let FeedEvent::Trade(tick) = provider.decode(&trade).unwrap() else {
                panic!("expected trade, got {trade}");
            };
            assert_eq!(tick.upstream_id.as_str(), "100000737");
            assert!(tick.price.unwrap() > Decimal::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn answers_market_status_poll() {
        let provider = provider();
        let mut conn = provider.connect().await.unwrap();

        conn.send_text(provider.keepalive_request().unwrap())
            .await
            .unwrap();

        let frame = conn.next_text().await.unwrap().unwrap();
        assert!(matches!(
            provider.decode(&frame).unwrap(),
            FeedEvent::Status(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_until_subscribed() {
        let provider = provider();
        let mut conn = provider.connect().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), conn.next_text()).await;
        assert!(result.is_err());
    }
}
