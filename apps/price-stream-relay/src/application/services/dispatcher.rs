//! Stream Dispatcher
//!
//! One dispatcher runs per open client stream. On every tick it reads the
//! client's symbol list, looks up the latest quotes, and pushes events into a
//! small bounded channel drained by the transport. It never writes shared
//! state.
//!
//! # Cancellation
//!
//! The dispatcher stops when its cancellation token fires (the transport
//! dropped the response) or when the receiving side of the channel is gone,
//! whichever is noticed first. Both are checked at least once per tick.
//!
//! # Slow clients
//!
//! Events are offered with `try_send`. When a client has not drained its
//! buffer the event is dropped: the next tick carries fresher values anyway,
//! and a stalled client never holds up anything but its own stream.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{NoopObserver, RelayObserver, StreamEventKind};
use crate::domain::market::{MarketState, MarketStatus, PriceEntry};
use crate::domain::subscription::{ClientId, StreamLease, SubscriptionRegistry};
use crate::domain::symbols::Symbol;

// =============================================================================
// Cadence
// =============================================================================

/// Emission schedule, expressed in ticks of a base interval.
///
/// A schedule value of `0` disables that event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Base tick interval.
    pub tick: Duration,
    /// Emit prices on every tick divisible by this value.
    pub prices_every: u32,
    /// Emit market status on every tick divisible by this value.
    pub status_every: u32,
}

impl Cadence {
    /// Fixed-list schedule: prices every 2 s and status every 5 s from stream
    /// start, on its own 1 s base tick.
    pub const FIXED_LIST: Self = Self {
        tick: Duration::from_secs(1),
        prices_every: 2,
        status_every: 5,
    };

    /// Prices every tick, status every `status_every` ticks.
    #[must_use]
    pub const fn per_tick(tick: Duration, status_every: u32) -> Self {
        Self {
            tick,
            prices_every: 1,
            status_every,
        }
    }

    /// Whether prices are emitted on tick `n` (0-based).
    #[must_use]
    pub const fn prices_due(&self, n: u64) -> bool {
        self.prices_every != 0 && n % self.prices_every as u64 == 0
    }

    /// Whether status is emitted on tick `n` (0-based).
    #[must_use]
    pub const fn status_due(&self, n: u64) -> bool {
        self.status_every != 0 && n % self.status_every as u64 == 0
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::per_tick(Duration::from_secs(1), 5)
    }
}

// =============================================================================
// Symbol Source
// =============================================================================

/// Where a dispatcher gets its symbol list from.
#[derive(Debug)]
pub enum SymbolSource {
    /// Looked up in the registry on every tick.
    Registry(StreamLease),
    /// Fixed for the lifetime of the stream.
    Fixed(Vec<Symbol>),
}

impl SymbolSource {
    /// Registry-backed source; registers an open stream for `client`.
    #[must_use]
    pub fn registry(registry: &Arc<SubscriptionRegistry>, client: ClientId) -> Self {
        Self::Registry(registry.open_stream(client))
    }

    /// Symbol list for the current tick.
    #[must_use]
    pub fn current(&self) -> Vec<Symbol> {
        match self {
            Self::Registry(lease) => lease.registry().get_subscription(lease.client()),
            Self::Fixed(symbols) => symbols.clone(),
        }
    }
}

// =============================================================================
// Events and Frames
// =============================================================================

/// One event emitted to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Latest prices for the client's symbols.
    Prices(Vec<PriceEntry>),
    /// Current market status.
    MarketStatus(MarketStatus),
}

impl StreamEvent {
    /// Kind of this event.
    #[must_use]
    pub const fn kind(&self) -> StreamEventKind {
        match self {
            Self::Prices(_) => StreamEventKind::Prices,
            Self::MarketStatus(_) => StreamEventKind::MarketStatus,
        }
    }

    /// Render the event as a transport frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_frame(&self, style: FrameStyle) -> Result<StreamFrame, serde_json::Error> {
        #[derive(Serialize)]
        struct StatusEnvelope<'a> {
            market_status: &'a MarketStatus,
        }

        let frame = match (self, style) {
            (Self::Prices(entries), FrameStyle::Unnamed) => StreamFrame {
                event: None,
                data: serde_json::to_string(entries)?,
            },
            (Self::Prices(entries), FrameStyle::Named) => StreamFrame {
                event: Some("prices"),
                data: serde_json::to_string(entries)?,
            },
            (Self::MarketStatus(status), FrameStyle::Unnamed) => StreamFrame {
                event: None,
                data: serde_json::to_string(&StatusEnvelope {
                    market_status: status,
                })?,
            },
            (Self::MarketStatus(status), FrameStyle::Named) => StreamFrame {
                event: Some("market_status"),
                data: serde_json::to_string(status)?,
            },
        };
        Ok(frame)
    }
}

/// How events are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStyle {
    /// Plain `data:` frames; status wrapped as `{"market_status": ...}`.
    Unnamed,
    /// `event: prices` / `event: market_status` frames.
    Named,
}

/// A framework-independent server-push frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Event name, if any.
    pub event: Option<&'static str>,
    /// JSON payload.
    pub data: String,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Shortest base tick a dispatcher will run at.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Counters reported when a dispatcher exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Ticks processed.
    pub ticks: u64,
    /// Events handed to the transport.
    pub sent: u64,
    /// Events dropped because the client buffer was full.
    pub dropped: u64,
}

/// Per-client polling loop.
pub struct StreamDispatcher {
    id: Uuid,
    market: Arc<MarketState>,
    source: SymbolSource,
    cadence: Cadence,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    observer: Arc<dyn RelayObserver>,
    summary: DispatchSummary,
}

impl StreamDispatcher {
    /// Create a dispatcher writing into `tx`.
    #[must_use]
    pub fn new(
        market: Arc<MarketState>,
        source: SymbolSource,
        cadence: Cadence,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            market,
            source,
            cadence,
            tx,
            cancel,
            observer: Arc::new(NoopObserver),
            summary: DispatchSummary::default(),
        }
    }

    /// Report stream lifecycle and delivery to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RelayObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Spawn a dispatcher task and return its handle and event receiver.
    ///
    /// `buffer` is the number of undelivered events tolerated before new
    /// events are dropped.
    #[must_use]
    pub fn spawn(
        market: Arc<MarketState>,
        source: SymbolSource,
        cadence: Cadence,
        buffer: usize,
        cancel: CancellationToken,
    ) -> (JoinHandle<DispatchSummary>, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let dispatcher = Self::new(market, source, cadence, tx, cancel);
        (tokio::spawn(dispatcher.run()), rx)
    }

    /// Unique id of this stream, used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Run until cancelled or the receiver is dropped.
    ///
    /// A zero tick is raised to 1 ms.
    pub async fn run(mut self) -> DispatchSummary {
        let mut interval = tokio::time::interval(self.cadence.tick.max(MIN_TICK));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.observer.stream_opened();
        tracing::debug!(stream_id = %self.id, "Stream dispatcher started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            if self.tx.is_closed() || !self.dispatch_tick(self.summary.ticks) {
                break;
            }
            self.summary.ticks += 1;
        }

        self.observer.stream_closed();
        tracing::debug!(
            stream_id = %self.id,
            ticks = self.summary.ticks,
            sent = self.summary.sent,
            dropped = self.summary.dropped,
            "Stream dispatcher stopped"
        );
        self.summary
    }

    /// Emit the events due on tick `n`. Returns `false` once the client is gone.
    fn dispatch_tick(&mut self, n: u64) -> bool {
        if self.cadence.prices_due(n) {
            let symbols = self.source.current();
            let entries = self.market.price_entries(&symbols);
            if !self.deliver(StreamEvent::Prices(entries)) {
                return false;
            }
        }

        if self.cadence.status_due(n) && !self.deliver(StreamEvent::MarketStatus(self.market.get_status())) {
            return false;
        }

        true
    }

    fn deliver(&mut self, event: StreamEvent) -> bool {
        let kind = event.kind();
        match self.tx.try_send(event) {
            Ok(()) => {
                self.summary.sent += 1;
                self.observer.event_sent(kind);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.summary.dropped += 1;
                self.observer.event_dropped(kind);
                tracing::trace!(stream_id = %self.id, "Client buffer full, dropping frame");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
