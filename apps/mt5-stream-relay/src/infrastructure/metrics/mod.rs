//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Stream events**: Decoded bar-stream frames by type
//! - **Drops**: Bars rejected, deduplicated, or conflated away
//! - **Quotes**: Poll outcomes and watchlist size
//! - **Relay**: HTTP requests, bridge errors, bridge latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the relay port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once or if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Stream counters
    describe_counter!(
        "mt5_relay_stream_events_total",
        "Total decoded bar-stream events by type"
    );
    describe_counter!(
        "mt5_relay_bars_dropped_total",
        "Total bars dropped before rendering, by reason"
    );
    describe_counter!(
        "mt5_relay_seq_gaps_total",
        "Total sequence gaps observed on the bar stream"
    );
    describe_counter!(
        "mt5_relay_stream_bytes_total",
        "Total bytes forwarded to streaming clients"
    );

    // Quote counters
    describe_counter!(
        "mt5_relay_quote_polls_total",
        "Total quote poll completions by outcome"
    );

    // Relay counters
    describe_counter!(
        "mt5_relay_http_requests_total",
        "Total relay HTTP requests by route"
    );
    describe_counter!(
        "mt5_relay_bridge_errors_total",
        "Total bridge failures surfaced to clients, by route"
    );

    // Gauges
    describe_gauge!(
        "mt5_relay_active_streams",
        "Number of bar streams currently being forwarded"
    );
    describe_gauge!(
        "mt5_relay_watchlist_size",
        "Number of symbols on the quote polling watchlist"
    );

    // Latency histograms
    describe_histogram!(
        "mt5_relay_bridge_request_seconds",
        "Bridge round-trip time for unary requests"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for bar-stream event types.
#[derive(Debug, Clone, Copy)]
pub enum StreamEventKind {
    /// Bootstrap snapshot.
    Bootstrap,
    /// In-place update of the forming bar.
    BarUpdate,
    /// Newly opened bar.
    BarNew,
    /// Upstream error frame.
    Error,
}

impl StreamEventKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::BarUpdate => "bar-update",
            Self::BarNew => "bar-new",
            Self::Error => "error",
        }
    }
}

/// Metric labels for dropped bars.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// Failed validation.
    Invalid,
    /// Identical to the previously rendered bar.
    Duplicate,
    /// Overwritten in the conflation slot before rendering.
    Conflated,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Duplicate => "duplicate",
            Self::Conflated => "conflated",
        }
    }
}

/// Metric labels for quote poll outcomes.
#[derive(Debug, Clone, Copy)]
pub enum QuotePollOutcome {
    /// Sanitized and delivered.
    Accepted,
    /// Valid response with no usable quote.
    Discarded,
    /// Transport or upstream failure.
    Failed,
}

impl QuotePollOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Discarded => "discarded",
            Self::Failed => "failed",
        }
    }
}

/// Metric labels for bridge endpoints.
#[derive(Debug, Clone, Copy)]
pub enum BridgeEndpoint {
    /// `GET /tick`.
    Tick,
    /// `GET /history`.
    History,
    /// `GET /symbols`.
    Symbols,
    /// `GET /stream-bars`.
    StreamBars,
}

impl BridgeEndpoint {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::History => "history",
            Self::Symbols => "symbols",
            Self::StreamBars => "stream-bars",
        }
    }
}

/// Metric labels for relay routes.
#[derive(Debug, Clone, Copy)]
pub enum RelayRoute {
    /// `GET /api/market/stream`.
    Stream,
    /// `POST /api/market`.
    Market,
    /// `GET /api/market/symbols`.
    Symbols,
}

impl RelayRoute {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Market => "market",
            Self::Symbols => "symbols",
        }
    }
}

/// Record a decoded bar-stream event.
pub fn record_stream_event(kind: StreamEventKind) {
    counter!(
        "mt5_relay_stream_events_total",
        "type" => kind.as_str()
    )
    .increment(1);
}

/// Record bars dropped before rendering.
pub fn record_bars_dropped(reason: DropReason, count: u64) {
    counter!(
        "mt5_relay_bars_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(count);
}

/// Record a sequence gap on the bar stream.
pub fn record_seq_gap() {
    counter!("mt5_relay_seq_gaps_total").increment(1);
}

/// Record bytes forwarded to a streaming client.
pub fn record_stream_bytes(count: u64) {
    counter!("mt5_relay_stream_bytes_total").increment(count);
}

/// Record a quote poll completion.
pub fn record_quote_poll(outcome: QuotePollOutcome) {
    counter!(
        "mt5_relay_quote_polls_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a relay HTTP request.
pub fn record_http_request(route: RelayRoute) {
    counter!(
        "mt5_relay_http_requests_total",
        "route" => route.as_str()
    )
    .increment(1);
}

/// Record a bridge failure surfaced to a client.
pub fn record_bridge_error(route: RelayRoute) {
    counter!(
        "mt5_relay_bridge_errors_total",
        "route" => route.as_str()
    )
    .increment(1);
}

/// Record a bridge round-trip.
pub fn record_bridge_request_duration(endpoint: BridgeEndpoint, duration: Duration) {
    histogram!(
        "mt5_relay_bridge_request_seconds",
        "endpoint" => endpoint.as_str()
    )
    .record(duration.as_secs_f64());
}

/// A stream started being forwarded.
pub fn increment_active_streams() {
    gauge!("mt5_relay_active_streams").increment(1.0);
}

/// A forwarded stream ended.
pub fn decrement_active_streams() {
    gauge!("mt5_relay_active_streams").decrement(1.0);
}

/// Update the quote watchlist size.
pub fn set_watchlist_size(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("mt5_relay_watchlist_size").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_kind_as_str() {
        assert_eq!(StreamEventKind::Bootstrap.as_str(), "bootstrap");
        assert_eq!(StreamEventKind::BarUpdate.as_str(), "bar-update");
        assert_eq!(StreamEventKind::BarNew.as_str(), "bar-new");
        assert_eq!(StreamEventKind::Error.as_str(), "error");
    }

    #[test]
    fn drop_reason_as_str() {
        assert_eq!(DropReason::Invalid.as_str(), "invalid");
        assert_eq!(DropReason::Duplicate.as_str(), "duplicate");
        assert_eq!(DropReason::Conflated.as_str(), "conflated");
    }

    #[test]
    fn quote_poll_outcome_as_str() {
        assert_eq!(QuotePollOutcome::Accepted.as_str(), "accepted");
        assert_eq!(QuotePollOutcome::Discarded.as_str(), "discarded");
        assert_eq!(QuotePollOutcome::Failed.as_str(), "failed");
    }

    #[test]
    fn relay_route_as_str() {
        assert_eq!(RelayRoute::Stream.as_str(), "stream");
        assert_eq!(RelayRoute::Market.as_str(), "market");
        assert_eq!(RelayRoute::Symbols.as_str(), "symbols");
    }

    #[test]
    fn bridge_endpoint_as_str() {
        assert_eq!(BridgeEndpoint::Tick.as_str(), "tick");
        assert_eq!(BridgeEndpoint::History.as_str(), "history");
        assert_eq!(BridgeEndpoint::Symbols.as_str(), "symbols");
        assert_eq!(BridgeEndpoint::StreamBars.as_str(), "stream-bars");
    }
}
