//! Feed Ingestion Integration Tests
//!
//! Runs the feed client against the in-process simulated provider and checks
//! that quotes and market status land in the shared market state.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use price_stream_relay::infrastructure::config::FeedSettings;
use price_stream_relay::infrastructure::feed::ConnectionState;
use price_stream_relay::{
    FeedClient, FeedClientConfig, MarketState, SimulatedProvider, Symbol, SymbolDirectory,
};

fn directory() -> Arc<SymbolDirectory> {
    Arc::new(
        SymbolDirectory::from_entries([
            ("100000737", "ITC"),
            ("100002285", "TCS"),
            ("100001660", "INFY"),
        ])
        .unwrap(),
    )
}

fn start_client(
    market: &Arc<MarketState>,
    cancel: &CancellationToken,
) -> (
    tokio::task::JoinHandle<()>,
    Arc<price_stream_relay::infrastructure::feed::FeedState>,
) {
    let directory = directory();
    let provider = SimulatedProvider::new(Arc::clone(&directory), "NSE_EQ")
        .with_tick_interval(Duration::from_millis(5));
    let client = FeedClient::new(
        Arc::new(provider),
        directory,
        Arc::clone(market),
        FeedClientConfig::from_feed_settings(&FeedSettings::default()),
        cancel.clone(),
    );
    let state = client.state();
    (tokio::spawn(client.run()), state)
}

async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn simulated_feed_populates_every_subscribed_symbol() {
    let market = Arc::new(MarketState::new());
    let cancel = CancellationToken::new();
    let (handle, state) = start_client(&market, &cancel);

    wait_for("streaming state", || state.is_streaming()).await;
    wait_for("all quotes", || market.quote_count() == 3).await;

    let entries = market.price_entries(&[Symbol::from("ITC"), Symbol::from("TCS")]);
    assert!(entries.iter().all(|entry| !entry.price.is_pending()));

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(state.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn status_poll_answer_is_stored() {
    let market = Arc::new(MarketState::new());
    let cancel = CancellationToken::new();
    let (handle, _state) = start_client(&market, &cancel);

    wait_for("market status", || market.has_status()).await;
    assert_eq!(market.get_status().as_value(), &serde_json::json!("OPEN"));

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn trades_keep_updating_quotes() {
    let market = Arc::new(MarketState::new());
    let cancel = CancellationToken::new();
    let (handle, state) = start_client(&market, &cancel);

    wait_for("all quotes", || market.quote_count() == 3).await;
    let seen = state.snapshot().messages_received;
    wait_for("more trades", || state.snapshot().messages_received > seen + 10).await;

    assert_eq!(state.snapshot().decode_errors, 0);

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}
