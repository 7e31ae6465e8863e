//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`MarketDataGateway`]: the upstream price provider (historical
//!   bars, point quotes, a typed bar-event stream)
//! - [`RenderSurface`]: the chart consumer (snapshot replace plus
//!   single-bar incremental updates)
//! - [`QuoteSink`]: the watchlist consumer of per-symbol quote deltas

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::domain::bar::Bar;
use crate::domain::quote::{QuoteFrame, TickSnapshot};
use crate::domain::streaming::{ConnectionStatus, StreamEvent};
use crate::domain::timeframe::Timeframe;

// =============================================================================
// Errors
// =============================================================================

/// Market data gateway error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Transport failed before or during a request.
    #[error("gateway transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// The upstream answered with a non-success status.
    #[error("gateway upstream status {status}")]
    Upstream {
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream response body, truncated for diagnostics.
        body: String,
    },

    /// The upstream payload could not be decoded.
    #[error("gateway decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Gateway Contracts
// =============================================================================

/// Parameters for opening one upstream bar stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarStreamRequest {
    /// Instrument symbol, non-empty.
    pub symbol: String,
    /// Canonical timeframe.
    pub timeframe: Timeframe,
    /// Bootstrap backfill length, already clamped by the caller.
    pub backfill: u32,
}

/// Historical bars response, ascending time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Symbol the bars are for.
    pub symbol: String,
    /// Timeframe code the upstream resolved.
    pub timeframe: String,
    /// Bars in ascending time order.
    pub bars: Vec<Bar>,
}

/// A typed bar-event stream. Terminates after the first `Err` item.
pub type BarEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>;

/// Port for the upstream price-data provider.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Open a bar stream: one bootstrap snapshot, then incremental
    /// `bar-update`/`bar-new` events until the transport closes.
    async fn open_bar_stream(
        &self,
        request: BarStreamRequest,
    ) -> Result<BarEventStream, GatewayError>;

    /// Fetch the latest point quote for a symbol.
    async fn latest_tick(&self, symbol: &str) -> Result<TickSnapshot, GatewayError>;

    /// Fetch historical bars. `timeframe` is passed through as given;
    /// the upstream rejects codes outside its own table.
    async fn history(
        &self,
        symbol: &str,
        timeframe: &str,
        count: u32,
    ) -> Result<HistoryResponse, GatewayError>;
}

// =============================================================================
// Consumer Contracts
// =============================================================================

/// Port for the rendering surface consuming one subscription's bars.
pub trait RenderSurface: Send + Sync {
    /// Replace all chart state with a bootstrap snapshot.
    fn replace_series(&self, bars: &[Bar]);

    /// Apply one incremental bar: same `time` bucket mutates the open
    /// candle, a greater `time` appends a new one.
    fn apply_bar(&self, bar: &Bar);

    /// Observe a connection-status change.
    fn status_changed(&self, status: ConnectionStatus);
}

/// Port for the watchlist consuming per-symbol quote deltas.
pub trait QuoteSink: Send + Sync {
    /// Observe an accepted quote with its flash/percent deltas.
    fn quote_updated(&self, symbol: &str, frame: &QuoteFrame);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_display() {
        let transport = GatewayError::Transport {
            message: "connection refused".to_string(),
        };
        assert_eq!(
            transport.to_string(),
            "gateway transport error: connection refused"
        );

        let upstream = GatewayError::Upstream {
            status: 404,
            body: "{\"detail\":\"no tick\"}".to_string(),
        };
        assert_eq!(upstream.to_string(), "gateway upstream status 404");
    }

    #[test]
    fn history_response_decodes_bridge_shape() {
        let response: HistoryResponse = serde_json::from_str(
            r#"{"symbol":"EURUSD","timeframe":"H1","bars":[{"time":1700000000,"open":1.0,"high":1.2,"low":0.9,"close":1.1,"volume":5}]}"#,
        )
        .unwrap();
        assert_eq!(response.symbol, "EURUSD");
        assert_eq!(response.bars.len(), 1);
    }
}
