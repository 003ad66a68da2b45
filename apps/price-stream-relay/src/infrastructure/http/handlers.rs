//! Request handlers for the application server.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response, Sse, sse::KeepAliveStream},
};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::sse::{self, DispatchStream};
use crate::application::services::{FrameStyle, SymbolSource};
use crate::domain::limits::RiskLimits;
use crate::domain::subscription::ClientId;
use crate::domain::symbols::Symbol;
use crate::infrastructure::metrics;

// =============================================================================
// Bodies
// =============================================================================

/// Body of `POST /update-subscription`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSubscriptionRequest {
    /// Full desired symbol list; replaces any previous list.
    pub symbols: Vec<String>,
}

/// Successful subscription update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    /// Always `"success"`.
    pub status: String,
    /// Symbols now stored for the caller.
    pub subscribed_symbols: Vec<Symbol>,
}

/// Rejected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `"error"`.
    pub status: String,
    /// Human-readable reason.
    pub message: String,
}

impl ErrorResponse {
    fn bad_request(message: impl Into<String>) -> Response {
        let body = Self {
            status: "error".to_string(),
            message: message.into(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct SetValuesResponse {
    success: bool,
    #[serde(flatten)]
    limits: RiskLimits,
}

#[derive(Debug, Deserialize)]
pub(super) struct StreamQuery {
    ids: Option<String>,
}

// =============================================================================
// Subscriptions and Streams
// =============================================================================

pub(super) async fn update_subscription(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Result<Json<UpdateSubscriptionRequest>, JsonRejection>,
) -> Response {
    let client = ClientId::from(peer.ip());

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(client = %client, error = %rejection, "Rejected subscription update");
            metrics::record_subscription_update(false);
            return ErrorResponse::bad_request(rejection.body_text());
        }
    };

    let symbols = normalize_symbols(request.symbols.iter().map(String::as_str));

    if state.streams.validate_symbols {
        let unknown: Vec<&str> = symbols
            .iter()
            .map(Symbol::as_str)
            .filter(|s| !state.directory.contains(s))
            .collect();
        if !unknown.is_empty() {
            metrics::record_subscription_update(false);
            return ErrorResponse::bad_request(format!("unknown symbols: {}", unknown.join(",")));
        }
    }

    state.registry.set_subscription(&client, symbols.clone());
    metrics::record_subscription_update(true);
    metrics::set_registered_clients(state.registry.client_count());

    tracing::info!(client = %client, count = symbols.len(), "Subscription updated");

    let body = SubscriptionResponse {
        status: "success".to_string(),
        subscribed_symbols: symbols,
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub(super) async fn stock_updates(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Sse<KeepAliveStream<DispatchStream>> {
    let client = ClientId::from(peer.ip());
    tracing::debug!(client = %client, "Opening subscription stream");

    let source = SymbolSource::registry(&state.registry, client);
    sse::open(&state, source, state.updates_cadence(), FrameStyle::Unnamed)
}

pub(super) async fn stock_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Sse<KeepAliveStream<DispatchStream>> {
    let symbols = query
        .ids
        .as_deref()
        .map(|ids| normalize_symbols(ids.split(',')))
        .unwrap_or_default();
    tracing::debug!(count = symbols.len(), "Opening fixed-list stream");

    sse::open(
        &state,
        SymbolSource::Fixed(symbols),
        state.stream_cadence(),
        FrameStyle::Named,
    )
}

/// Trim, drop blanks, and de-duplicate while keeping first-seen order.
fn normalize_symbols<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(*s))
        .map(Symbol::from)
        .collect()
}

// =============================================================================
// Risk Limit Values
// =============================================================================

pub(super) async fn get_values(State(state): State<Arc<AppState>>) -> Json<RiskLimits> {
    Json(state.limits.get())
}

pub(super) async fn set_values(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RiskLimits>, JsonRejection>,
) -> Response {
    let update = match body {
        Ok(Json(update)) => update,
        Err(rejection) => return ErrorResponse::bad_request(rejection.body_text()),
    };

    let limits = state.limits.apply(update);
    tracing::info!(
        max_loss = ?limits.max_loss,
        total_amount = ?limits.total_amount,
        "Risk limits updated"
    );

    Json(SetValuesResponse {
        success: true,
        limits,
    })
    .into_response()
}
