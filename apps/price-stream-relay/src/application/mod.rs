//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (upstream price feed).
pub mod ports;

/// Application services for stream dispatch and subscription upkeep.
pub mod services;
