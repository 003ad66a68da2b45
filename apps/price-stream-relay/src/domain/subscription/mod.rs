//! Subscription Registry
//!
//! Tracks which symbols each client wants to receive on its stream.
//!
//! # Design
//!
//! - Each client has exactly one symbol list; updates replace it wholesale.
//! - Entries are keyed by a connection-derived client id and stored in a
//!   sharded concurrent map, so one client's update never waits on another
//!   client's read.
//! - Readers receive an owned copy of the list. A dispatcher that already
//!   captured the list for its current tick is unaffected by a concurrent
//!   update; the next tick observes the new list.
//! - Open streams hold a [`StreamLease`]. Entries with no open stream and no
//!   recent activity can be evicted with [`SubscriptionRegistry::evict_idle`].

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::domain::symbols::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Identifier of a streaming client, derived from its network identity.
///
/// Not globally unique behind NAT, but used as the subscription key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Create a client id from an arbitrary string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientId {
    fn from(addr: IpAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct ClientEntry {
    symbols: Vec<Symbol>,
    last_active: Instant,
    open_streams: usize,
}

impl ClientEntry {
    fn new() -> Self {
        Self {
            symbols: Vec::new(),
            last_active: Instant::now(),
            open_streams: 0,
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of known clients.
    pub clients: usize,
    /// Number of currently open streams across all clients.
    pub open_streams: usize,
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Concurrency-safe map of client id → requested symbols.
///
/// # Example
///
/// ```rust
/// use price_stream_relay::domain::subscription::{ClientId, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
/// let client = ClientId::new("10.0.0.7");
///
/// registry.set_subscription(&client, vec!["ITC".into(), "TCS".into()]);
/// registry.set_subscription(&client, vec!["SBIN".into()]);
///
/// assert_eq!(registry.get_subscription(&client), vec!["SBIN".into()]);
/// assert!(registry.get_subscription(&ClientId::new("other")).is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    clients: DashMap<ClientId, ClientEntry>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `client`'s symbol list.
    pub fn set_subscription(&self, client: &ClientId, symbols: Vec<Symbol>) {
        let mut entry = self
            .clients
            .entry(client.clone())
            .or_insert_with(ClientEntry::new);
        entry.symbols = symbols;
        entry.last_active = Instant::now();
    }

    /// Current symbol list for `client`; empty if it never subscribed.
    #[must_use]
    pub fn get_subscription(&self, client: &ClientId) -> Vec<Symbol> {
        self.clients
            .get(client)
            .map(|entry| entry.symbols.clone())
            .unwrap_or_default()
    }

    /// Register an open stream for `client`.
    ///
    /// Creates the entry if the client has never subscribed. The entry is
    /// protected from eviction until the returned lease is dropped.
    #[must_use]
    pub fn open_stream(self: &Arc<Self>, client: ClientId) -> StreamLease {
        {
            let mut entry = self
                .clients
                .entry(client.clone())
                .or_insert_with(ClientEntry::new);
            entry.open_streams += 1;
            entry.last_active = Instant::now();
        }

        StreamLease {
            registry: Arc::clone(self),
            client,
        }
    }

    fn close_stream(&self, client: &ClientId) {
        if let Some(mut entry) = self.clients.get_mut(client) {
            entry.open_streams = entry.open_streams.saturating_sub(1);
            entry.last_active = Instant::now();
        }
    }

    /// Remove clients with no open stream and no activity within `ttl`.
    ///
    /// Returns the number of evicted clients.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.clients.len();
        self.clients
            .retain(|_, entry| entry.open_streams > 0 || entry.last_active.elapsed() < ttl);
        before.saturating_sub(self.clients.len())
    }

    /// Number of known clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Snapshot of registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.clients
            .iter()
            .fold(RegistryStats::default(), |mut stats, entry| {
                stats.clients += 1;
                stats.open_streams += entry.open_streams;
                stats
            })
    }
}

// =============================================================================
// Stream Lease
// =============================================================================

/// Marks a client as having an open stream; released on drop.
#[derive(Debug)]
pub struct StreamLease {
    registry: Arc<SubscriptionRegistry>,
    client: ClientId,
}

impl StreamLease {
    /// Client that owns this lease.
    #[must_use]
    pub const fn client(&self) -> &ClientId {
        &self.client
    }

    /// Registry the lease belongs to.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.registry.close_stream(&self.client);
    }
}

// =============================================================================
// Tests
// =============================================================================
