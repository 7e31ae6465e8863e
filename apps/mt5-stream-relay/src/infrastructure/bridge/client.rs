//! MT5 Bridge HTTP Client
//!
//! Speaks the bridge's REST surface: unary lookups (`/tick`,
//! `/history`, `/symbols`) and the `/stream-bars` SSE endpoint. The
//! client serves two consumers with different needs:
//!
//! - the relay routes, which forward stream bytes verbatim and pass
//!   `/symbols` responses through with their upstream status
//! - the stream session and quote poller, which want decoded
//!   [`StreamEvent`]s and [`TickSnapshot`]s

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::application::ports::{
    BarEventStream, BarStreamRequest, GatewayError, HistoryResponse, MarketDataGateway,
};
use crate::domain::quote::TickSnapshot;
use crate::domain::streaming::StreamEvent;
use crate::infrastructure::bridge::codec::SseDecoder;
use crate::infrastructure::config::BridgeToken;
use crate::infrastructure::metrics::{self, BridgeEndpoint};

/// Cap on upstream bodies carried into error diagnostics.
const MAX_DIAGNOSTIC_CHARS: usize = 1000;

/// Decoded events buffered between the decode task and its consumer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Bridge connection settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL, e.g. `http://127.0.0.1:5001`.
    pub base_url: String,
    /// Shared secret sent as `X-Bridge-Token` when set.
    pub token: Option<BridgeToken>,
    /// Per-request timeout for unary endpoints. Streams are exempt.
    pub request_timeout: Duration,
    /// TCP connect timeout for all endpoints.
    pub connect_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001".to_string(),
            token: None,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the MT5 bridge.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    config: BridgeConfig,
}

impl BridgeClient {
    /// Build a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: BridgeConfig) -> Result<Self, GatewayError> {
        // No client-wide timeout: it would cut long-lived SSE streams.
        // Unary calls set a per-request timeout instead.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GatewayError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self.client.get(url);
        if let Some(token) = &self.config.token {
            request = request.header("X-Bridge-Token", token.as_str());
        }
        request
    }

    async fn get_json<T>(
        &self,
        endpoint: BridgeEndpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError>
    where
        T: serde::de::DeserializeOwned,
    {
        let started = Instant::now();
        let response = self
            .get(path)
            .query(query)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                message: e.to_string(),
            })?;
        metrics::record_bridge_request_duration(endpoint, started.elapsed());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body: truncate_diagnostic(&body),
            });
        }

        response.json().await.map_err(|e| GatewayError::Decode {
            message: e.to_string(),
        })
    }

    /// Open the upstream SSE response for a bar stream without
    /// decoding it. The relay forwards these bytes verbatim.
    ///
    /// # Errors
    ///
    /// Returns `Transport` when the bridge is unreachable and
    /// `Upstream` when it answers with a non-success status.
    pub async fn open_raw_stream(
        &self,
        symbol: &str,
        timeframe: &str,
        bars: u32,
    ) -> Result<reqwest::Response, GatewayError> {
        let started = Instant::now();
        let response = self
            .get("/stream-bars")
            .query(&[("symbol", symbol), ("timeframe", timeframe)])
            .query(&[("bars", bars)])
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                message: e.to_string(),
            })?;
        // times the open only; the stream itself is long-lived
        metrics::record_bridge_request_duration(BridgeEndpoint::StreamBars, started.elapsed());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body: truncate_diagnostic(&body),
            });
        }

        Ok(response)
    }

    /// Fetch the bridge symbol directory, passing any HTTP response
    /// through with its status. Unparseable bodies become `{}`.
    ///
    /// # Errors
    ///
    /// Only transport failures error; upstream error statuses are part
    /// of the passthrough.
    pub async fn symbols_raw(&self) -> Result<(u16, Value), GatewayError> {
        let started = Instant::now();
        let response = self
            .get("/symbols")
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                message: e.to_string(),
            })?;
        metrics::record_bridge_request_duration(BridgeEndpoint::Symbols, started.elapsed());

        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or_else(|_| json!({}));
        Ok((status, body))
    }
}

#[async_trait]
impl MarketDataGateway for BridgeClient {
    async fn open_bar_stream(
        &self,
        request: BarStreamRequest,
    ) -> Result<BarEventStream, GatewayError> {
        let response = self
            .open_raw_stream(
                &request.symbol,
                request.timeframe.as_str(),
                request.backfill,
            )
            .await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(decode_sse_response(response, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn latest_tick(&self, symbol: &str) -> Result<TickSnapshot, GatewayError> {
        self.get_json(
            BridgeEndpoint::Tick,
            "/tick",
            &[("symbol", symbol.to_string())],
        )
        .await
    }

    async fn history(
        &self,
        symbol: &str,
        timeframe: &str,
        count: u32,
    ) -> Result<HistoryResponse, GatewayError> {
        self.get_json(
            BridgeEndpoint::History,
            "/history",
            &[
                ("symbol", symbol.to_string()),
                ("timeframe", timeframe.to_string()),
                ("count", count.to_string()),
            ],
        )
        .await
    }
}

/// Drive one SSE response to completion, pushing decoded events into
/// the channel. Exits when the receiver is dropped, which also drops
/// the upstream connection.
async fn decode_sse_response(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamEvent, GatewayError>>,
) {
    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                decoder.extend(&bytes);
                while let Some(event) = decoder.next_event() {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                let _ = tx
                    .send(Err(GatewayError::Transport {
                        message: error.to_string(),
                    }))
                    .await;
                return;
            }
        }
    }
    // natural end of body; dropping the sender ends the event stream
}

/// Clip an upstream body for inclusion in an error payload.
fn truncate_diagnostic(body: &str) -> String {
    match body.char_indices().nth(MAX_DIAGNOSTIC_CHARS) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body.to_string(),
    }
}
