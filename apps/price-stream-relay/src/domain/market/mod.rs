//! Shared Market State
//!
//! Latest price per symbol and the latest market status, shared between the
//! feed client (single writer class) and every stream dispatcher (readers).
//!
//! # Design
//!
//! Quotes live in a sharded concurrent map keyed by symbol. A write for one
//! symbol only locks that symbol's shard for the duration of a single insert,
//! so readers of other symbols are never blocked on it and a reader can never
//! observe a partially written quote. There is no cross-symbol snapshot; each
//! lookup is independently atomic.

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::domain::symbols::Symbol;

/// Placeholder reported for symbols that have never been quoted.
pub const PENDING: &str = "pending";

/// Market status reported before the feed has sent one.
pub const DEFAULT_MARKET_STATUS: &str = "CLOSED";

// =============================================================================
// Types
// =============================================================================

/// The last known price for a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// When the relay recorded the price.
    pub observed_at: DateTime<Utc>,
}

/// A quote lookup result: either a price or the pending sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteValue {
    /// A recorded price.
    Price(Decimal),
    /// No price has been recorded yet.
    Pending,
}

impl QuoteValue {
    /// Whether this is the pending sentinel.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The price, if one has been recorded.
    #[must_use]
    pub const fn price(&self) -> Option<Decimal> {
        match self {
            Self::Price(price) => Some(*price),
            Self::Pending => None,
        }
    }
}

impl fmt::Display for QuoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price(price) => write!(f, "{price}"),
            Self::Pending => f.write_str(PENDING),
        }
    }
}

impl Serialize for QuoteValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One `(symbol, price)` pair as delivered to stream clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceEntry {
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Price or pending sentinel.
    pub price: QuoteValue,
}

/// Opaque market status payload as sent by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MarketStatus(serde_json::Value);

impl MarketStatus {
    /// Wrap a raw status payload.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Borrow the raw payload.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consume into the raw payload.
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl Default for MarketStatus {
    fn default() -> Self {
        Self(serde_json::Value::String(DEFAULT_MARKET_STATUS.to_string()))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors from market state writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketStateError {
    /// Quotes must be keyed by a non-empty symbol.
    #[error("cannot store a quote for an empty symbol")]
    EmptySymbol,
}

// =============================================================================
// Market State
// =============================================================================

/// Concurrency-safe store of latest quotes and market status.
///
/// # Example
///
/// ```rust
/// use price_stream_relay::domain::market::{MarketState, QuoteValue};
/// use rust_decimal::Decimal;
///
/// let state = MarketState::new();
/// assert_eq!(state.get_quote("ITC"), QuoteValue::Pending);
///
/// state.set_quote("ITC".into(), Decimal::new(12850, 2)).unwrap();
/// assert_eq!(state.get_quote("ITC").to_string(), "128.50");
/// ```
#[derive(Debug, Default)]
pub struct MarketState {
    quotes: DashMap<Symbol, PriceQuote>,
    status: RwLock<Option<MarketStatus>>,
}

impl MarketState {
    /// Create an empty market state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored quote for `symbol`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`MarketStateError::EmptySymbol`] if `symbol` is empty.
    pub fn set_quote(&self, symbol: Symbol, price: Decimal) -> Result<(), MarketStateError> {
        self.set_quote_at(symbol, price, Utc::now())
    }

    /// Replace the stored quote for `symbol` with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`MarketStateError::EmptySymbol`] if `symbol` is empty.
    pub fn set_quote_at(
        &self,
        symbol: Symbol,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<(), MarketStateError> {
        if symbol.is_empty() {
            return Err(MarketStateError::EmptySymbol);
        }

        let quote = PriceQuote {
            symbol: symbol.clone(),
            price,
            observed_at,
        };
        self.quotes.insert(symbol, quote);
        Ok(())
    }

    /// Look up the latest price for `symbol`.
    #[must_use]
    pub fn get_quote(&self, symbol: &str) -> QuoteValue {
        self.quotes
            .get(symbol)
            .map_or(QuoteValue::Pending, |q| QuoteValue::Price(q.price))
    }

    /// Full quote record for `symbol`, if any.
    #[must_use]
    pub fn quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.quotes.get(symbol).map(|q| q.value().clone())
    }

    /// Price entries for `symbols`, in the order given.
    #[must_use]
    pub fn price_entries(&self, symbols: &[Symbol]) -> Vec<PriceEntry> {
        symbols
            .iter()
            .map(|symbol| PriceEntry {
                symbol: symbol.clone(),
                price: self.get_quote(symbol.as_str()),
            })
            .collect()
    }

    /// Replace the market status.
    pub fn set_status(&self, status: MarketStatus) {
        *self.status.write() = Some(status);
    }

    /// Current market status, or the closed default if none was received.
    #[must_use]
    pub fn get_status(&self) -> MarketStatus {
        self.status.read().clone().unwrap_or_default()
    }

    /// Whether the feed has reported a status yet.
    #[must_use]
    pub fn has_status(&self) -> bool {
        self.status.read().is_some()
    }

    /// Number of symbols with a recorded quote.
    #[must_use]
    pub fn quote_count(&self) -> usize {
        self.quotes.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
