//! Domain Layer - Core market state types and stores.
//!
//! This layer contains the shared stores and value types of the relay. It has
//! no knowledge of the upstream protocol or of HTTP.

/// Market state: latest quote per symbol and market status.
pub mod market;

/// Risk limit values edited by the dashboard.
pub mod limits;

/// Per-client subscription tracking.
pub mod subscription;

/// Upstream id → canonical symbol directory.
pub mod symbols;
