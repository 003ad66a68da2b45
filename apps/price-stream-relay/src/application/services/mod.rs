//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamDispatcher`: Per-client polling loop feeding one outbound stream
//! - `run_eviction`: Background removal of idle subscriptions

mod dispatcher;
mod eviction;

pub use dispatcher::{
    Cadence, DispatchSummary, FrameStyle, StreamDispatcher, StreamEvent, StreamFrame, SymbolSource,
};
pub use eviction::run_eviction;
