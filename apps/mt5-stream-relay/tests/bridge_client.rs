//! Bridge Client Integration Tests
//!
//! Exercises the HTTP/SSE bridge adapter against a mock bridge: query
//! and auth header wiring, typed decoding, upstream error mapping and
//! the SSE event pipeline.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mt5_stream_relay::{
    BarStreamRequest, BridgeClient, BridgeConfig, BridgeToken, GatewayError, MarketDataGateway,
    StreamEvent, Timeframe,
};

fn client_for(server: &MockServer, token: Option<BridgeToken>) -> BridgeClient {
    BridgeClient::new(BridgeConfig {
        base_url: server.uri(),
        token,
        request_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(2),
    })
    .unwrap()
}

#[tokio::test]
async fn test_open_bar_stream_decodes_sse_events() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"type\":\"bootstrap\",\"symbol\":\"EURUSD\",\"timeframe\":\"H1\",\"bars\":[{\"time\":100,\"open\":1.0,\"high\":1.2,\"low\":0.9,\"close\":1.1,\"volume\":5}],\"bootstrap\":300,\"_seq\":0}\n\n",
        ":hb\n\n",
        "data: {\"type\":\"bar-update\",\"bar\":{\"time\":100,\"open\":1.0,\"high\":1.25,\"low\":0.9,\"close\":1.2},\"_seq\":1}\n\n",
        "data: not json\n\n",
        "data: {\"type\":\"bar-new\",\"bar\":{\"time\":200,\"open\":1.2,\"high\":1.3,\"low\":1.1,\"close\":1.25},\"_seq\":2}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/stream-bars"))
        .and(query_param("symbol", "EURUSD"))
        .and(query_param("timeframe", "H1"))
        .and(query_param("bars", "300"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let mut stream = client
        .open_bar_stream(BarStreamRequest {
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::H1,
            backfill: 300,
        })
        .await
        .unwrap();

    let events = timeout(Duration::from_secs(2), async {
        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            events.push(item.expect("decoded event"));
        }
        events
    })
    .await
    .expect("stream should end with the response body");

    // Heartbeat comment and the undecodable frame are skipped.
    assert_eq!(events.len(), 3);
    assert!(matches!(
        &events[0],
        StreamEvent::Bootstrap { bars, seq: Some(0), .. } if bars.len() == 1
    ));
    assert!(matches!(
        &events[1],
        StreamEvent::BarUpdate { bar, seq: Some(1) } if bar.time == 100
    ));
    assert!(matches!(
        &events[2],
        StreamEvent::BarNew { bar, seq: Some(2) } if bar.time == 200
    ));
}

#[tokio::test]
async fn test_open_bar_stream_maps_upstream_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream-bars"))
        .respond_with(ResponseTemplate::new(503).set_body_string("bridge restarting"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let error = client
        .open_raw_stream("EURUSD", "H1", 300)
        .await
        .unwrap_err();

    let GatewayError::Upstream { status, body } = error else {
        panic!("expected upstream error, got {error:?}");
    };
    assert_eq!(status, 503);
    assert_eq!(body, "bridge restarting");
}

#[tokio::test]
async fn test_token_is_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tick"))
        .and(header("x-bridge-token", "sekret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "time": 1_700_000_000,
            "bid": 2301.5,
            "ask": 2301.9,
            "last": 2301.7,
            "volume": 12
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some(BridgeToken::new("sekret-token".to_string())));
    let tick = client.latest_tick("XAUUSD").await.unwrap();
    assert_eq!(tick.last, Some(2301.7));
    assert_eq!(tick.time, Some(1_700_000_000));
}

#[tokio::test]
async fn test_latest_tick_error_body_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tick"))
        .and(query_param("symbol", "UNKNOWN"))
        .respond_with(ResponseTemplate::new(404).set_body_string("x".repeat(1500)))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let error = client.latest_tick("UNKNOWN").await.unwrap_err();

    let GatewayError::Upstream { status, body } = error else {
        panic!("expected upstream error, got {error:?}");
    };
    assert_eq!(status, 404);
    assert_eq!(body.chars().count(), 1000);
}

#[tokio::test]
async fn test_history_passes_query_and_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .and(query_param("symbol", "EURUSD"))
        .and(query_param("timeframe", "M5"))
        .and(query_param("count", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "symbol": "EURUSD",
            "timeframe": "M5",
            "bars": [
                {"time": 100, "open": 1.0, "high": 1.2, "low": 0.9, "close": 1.1, "volume": 5},
                {"time": 400, "open": 1.1, "high": 1.3, "low": 1.0, "close": 1.2, "volume": 8}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let response = client.history("EURUSD", "M5", 500).await.unwrap();
    assert_eq!(response.symbol, "EURUSD");
    assert_eq!(response.timeframe, "M5");
    assert_eq!(response.bars.len(), 2);
    assert_eq!(response.bars[1].time, 400);
}

#[tokio::test]
async fn test_symbols_raw_passes_status_and_body_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/symbols"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "ok": false,
            "message": "terminal not connected"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let (status, body) = client.symbols_raw().await.unwrap();
    assert_eq!(status, 503);
    assert_eq!(body["message"], "terminal not connected");
}

#[tokio::test]
async fn test_symbols_raw_folds_unparseable_body_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/symbols"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let (status, body) = client.symbols_raw().await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn test_unreachable_bridge_is_a_transport_error() {
    let client = BridgeClient::new(BridgeConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        token: None,
        request_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_millis(500),
    })
    .unwrap();

    let error = client.latest_tick("EURUSD").await.unwrap_err();
    assert!(matches!(error, GatewayError::Transport { .. }));
}
