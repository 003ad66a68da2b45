//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surfaces.

/// Configuration loading from the environment.
pub mod config;

/// Upstream feed providers and the ingestion client.
pub mod feed;

/// Health check HTTP endpoint.
pub mod health;

/// Client-facing HTTP server (subscription updates and SSE streams).
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry export.
pub mod telemetry;
