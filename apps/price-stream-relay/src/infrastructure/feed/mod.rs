//! Upstream Feed Adapters
//!
//! Implements the upstream side of the relay:
//!
//! - **Client**: Connection lifecycle, reconnect loop, and ingestion into market state
//! - **TrueData**: WebSocket provider for the TrueData real-time service (JSON codec)
//! - **Simulated**: In-process random-walk provider for local development

pub mod client;
pub mod codec;
pub mod keepalive;
pub mod reconnect;
pub mod simulated;
pub mod state;
pub mod truedata;

pub use client::{FeedClient, FeedClientConfig};
pub use codec::TrueDataCodec;
pub use keepalive::{
    ActivityTracker, KeepAliveConfig, KeepAliveEvent, KeepAliveHandle, KeepAliveManager,
};
pub use reconnect::{MIN_DELAY, ReconnectConfig, ReconnectPolicy};
pub use simulated::SimulatedProvider;
pub use state::{ConnectionState, FeedSnapshot, FeedState};
pub use truedata::{TrueDataProvider, WebSocketConnection};
