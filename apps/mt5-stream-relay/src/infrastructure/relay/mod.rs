//! Relay HTTP Surface (Driver Adapter)
//!
//! Axum routes fronting the bridge for browser clients:
//!
//! - `GET /api/market/stream`: validate the subscription, open the
//!   bridge's SSE stream, and pipe its bytes through untouched
//! - `POST /api/market`: unary historical/tick lookups wrapped in an
//!   `{ok, ...}` envelope
//! - `GET /api/market/symbols`: symbol directory passthrough
//!
//! The stream route never decodes frames and never reconnects; a
//! broken upstream ends the client response and the client decides
//! what to do next.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::application::ports::{GatewayError, MarketDataGateway};
use crate::domain::timeframe::Timeframe;
use crate::infrastructure::bridge::BridgeClient;
use crate::infrastructure::metrics::{self, RelayRoute};

/// Bootstrap size used when the client does not send a usable `bars`.
const DEFAULT_BOOTSTRAP_BARS: u32 = 300;

/// Largest accepted bootstrap request.
const MAX_BOOTSTRAP_BARS: u32 = 5000;

/// History page size when the client omits `count` or sends zero.
const DEFAULT_HISTORY_COUNT: u32 = 1000;

/// Shared state for the relay handlers.
#[derive(Clone)]
pub struct RelayState {
    /// Upstream bridge client.
    pub bridge: Arc<BridgeClient>,
}

/// Create the market relay router.
pub fn create_router(bridge: Arc<BridgeClient>) -> Router {
    Router::new()
        .route("/api/market/stream", get(stream_bars))
        .route("/api/market", post(market_request))
        .route("/api/market/symbols", get(symbol_directory))
        .with_state(RelayState { bridge })
}

// =============================================================================
// Stream Route
// =============================================================================

#[derive(Debug, Deserialize)]
struct StreamQuery {
    symbol: Option<String>,
    timeframe: Option<String>,
    bars: Option<String>,
}

async fn stream_bars(
    State(state): State<RelayState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    metrics::record_http_request(RelayRoute::Stream);

    let Some(symbol) = query
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "symbol is required" })),
        )
            .into_response();
    };

    let timeframe = Timeframe::normalize(query.timeframe.as_deref().unwrap_or("H1"));
    let bars = parse_bars(query.bars.as_deref());
    let stream_id = Uuid::new_v4();

    match state
        .bridge
        .open_raw_stream(symbol, timeframe.as_str(), bars)
        .await
    {
        Ok(upstream) => {
            tracing::info!(
                %stream_id,
                symbol,
                timeframe = %timeframe,
                bars,
                "bar stream opened"
            );
            let body = Body::from_stream(forward_bytes(upstream.bytes_stream(), stream_id));
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
                    (header::CACHE_CONTROL, "no-cache, no-transform"),
                    (header::CONNECTION, "keep-alive"),
                    (HeaderName::from_static("x-accel-buffering"), "no"),
                ],
                body,
            )
                .into_response()
        }
        Err(error) => {
            metrics::record_bridge_error(RelayRoute::Stream);
            tracing::warn!(%stream_id, symbol, %error, "bar stream open failed");
            let payload = match error {
                GatewayError::Upstream { status, body } => {
                    json!({ "error": "bridge_error", "status": status, "body": body })
                }
                // No upstream status exists for a connect failure; the
                // envelope keeps its shape with the relay's own 502.
                GatewayError::Transport { message } | GatewayError::Decode { message } => {
                    json!({ "error": "bridge_error", "status": 502, "body": message })
                }
            };
            (StatusCode::BAD_GATEWAY, Json(payload)).into_response()
        }
    }
}

/// Lenient `bars` parsing: unusable input falls back to the default,
/// numbers are clamped into the accepted window.
fn parse_bars(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map_or(DEFAULT_BOOTSTRAP_BARS, |n| {
            u32::try_from(n.clamp(1, i64::from(MAX_BOOTSTRAP_BARS)))
                .unwrap_or(DEFAULT_BOOTSTRAP_BARS)
        })
}

/// Pairs the active-stream gauge with the forwarding stream lifetime.
struct ForwardGuard {
    stream_id: Uuid,
    forwarded: u64,
}

impl ForwardGuard {
    fn new(stream_id: Uuid) -> Self {
        metrics::increment_active_streams();
        Self {
            stream_id,
            forwarded: 0,
        }
    }
}

impl Drop for ForwardGuard {
    fn drop(&mut self) {
        metrics::decrement_active_streams();
        tracing::info!(
            stream_id = %self.stream_id,
            bytes = self.forwarded,
            "bar stream closed"
        );
    }
}

/// Forward upstream bytes verbatim. Dropping the returned stream, as
/// happens when the client disconnects, drops the upstream connection
/// with it.
fn forward_bytes(
    upstream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    stream_id: Uuid,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let mut guard = ForwardGuard::new(stream_id);
    upstream.map(move |chunk| match chunk {
        Ok(bytes) => {
            let len = bytes.len() as u64;
            guard.forwarded += len;
            metrics::record_stream_bytes(len);
            Ok(bytes)
        }
        Err(error) => {
            tracing::warn!(stream_id = %guard.stream_id, %error, "bar stream interrupted");
            Err(std::io::Error::other(error))
        }
    })
}

// =============================================================================
// Unary Market Route
// =============================================================================

async fn market_request(State(state): State<RelayState>, body: Bytes) -> Response {
    metrics::record_http_request(RelayRoute::Market);

    let Ok(request) = serde_json::from_slice::<Value>(&body) else {
        return market_bad_request("invalid json");
    };
    let Some(kind) = request.get("type").and_then(Value::as_str) else {
        return market_bad_request("type is required");
    };

    match kind {
        "historical" => historical(&state, &request).await,
        "tick" => latest_tick(&state, &request).await,
        other => market_bad_request(&format!("unknown type {other}")),
    }
}

fn market_bad_request(error: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error": error })),
    )
        .into_response()
}

fn required_symbol(request: &Value) -> Option<&str> {
    request
        .get("symbol")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

async fn historical(state: &RelayState, request: &Value) -> Response {
    let Some(symbol) = required_symbol(request) else {
        return market_bad_request("symbol is required");
    };

    // The bridge expects its own uppercase codes here; unknown codes
    // come back as an upstream 400 rather than being folded to H1.
    let timeframe = request
        .get("timeframe")
        .and_then(Value::as_str)
        .unwrap_or("M1")
        .to_ascii_uppercase();

    let count = request
        .get("count")
        .and_then(Value::as_i64)
        .filter(|n| *n != 0)
        .map_or(DEFAULT_HISTORY_COUNT, |n| {
            u32::try_from(n.clamp(1, i64::from(MAX_BOOTSTRAP_BARS)))
                .unwrap_or(DEFAULT_HISTORY_COUNT)
        });

    match state.bridge.history(symbol, &timeframe, count).await {
        Ok(history) => {
            let body = serde_json::to_value(&history).unwrap_or_else(|_| json!({}));
            market_ok(body)
        }
        Err(error) => market_bridge_error(error),
    }
}

async fn latest_tick(state: &RelayState, request: &Value) -> Response {
    let Some(symbol) = required_symbol(request) else {
        return market_bad_request("symbol is required");
    };

    match state.bridge.latest_tick(symbol).await {
        Ok(snapshot) => {
            let body = serde_json::to_value(snapshot).unwrap_or_else(|_| json!({}));
            market_ok(body)
        }
        Err(error) => market_bridge_error(error),
    }
}

/// Merge `ok: true` into a successful upstream payload.
fn market_ok(mut body: Value) -> Response {
    if let Some(map) = body.as_object_mut() {
        map.insert("ok".to_string(), Value::Bool(true));
    }
    (StatusCode::OK, Json(body)).into_response()
}

/// Map a gateway failure onto the `{ok: false, ...}` envelope.
///
/// Upstream errors keep their status and body fields; transport and
/// decode failures become a 502.
fn market_bridge_error(error: GatewayError) -> Response {
    metrics::record_bridge_error(RelayRoute::Market);
    match error {
        GatewayError::Upstream { status, body } => {
            let mut payload = serde_json::from_str::<Value>(&body)
                .ok()
                .filter(Value::is_object)
                .unwrap_or_else(|| json!({}));
            if let Some(map) = payload.as_object_mut() {
                map.insert("ok".to_string(), Value::Bool(false));
            }
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(payload)).into_response()
        }
        GatewayError::Transport { message } | GatewayError::Decode { message } => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "ok": false, "error": message })),
        )
            .into_response(),
    }
}

// =============================================================================
// Symbol Directory Route
// =============================================================================

async fn symbol_directory(State(state): State<RelayState>) -> Response {
    metrics::record_http_request(RelayRoute::Symbols);

    match state.bridge.symbols_raw().await {
        Ok((status, body)) => {
            let code = if (200..300).contains(&status) {
                StatusCode::OK
            } else {
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
            };
            (code, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
        }
        Err(error) => {
            metrics::record_bridge_error(RelayRoute::Symbols);
            tracing::warn!(%error, "symbol directory fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "ok": false, "message": error.to_string() })),
            )
                .into_response()
        }
    }
}
