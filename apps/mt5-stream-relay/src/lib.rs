#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! MT5 Stream Relay - Live Chart Data Service
//!
//! A relay service that fronts an MT5 terminal bridge: it proxies the
//! bridge's Server-Sent-Events bar stream and unary market endpoints
//! over HTTP, and drives in-process chart/watchlist consumers through
//! a typed subscription session and a round-robin quote poller.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core market-data types with no external dependencies
//!   - `bar`: OHLCV candles, validation, series sanitizing
//!   - `quote`: Tick snapshots, flash/percent deltas
//!   - `streaming`: Bar stream events and the connection-status machine
//!   - `timeframe`: Canonical timeframe codes and alias folding
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Gateway, render-surface and quote-sink contracts
//!   - `session`: Generation-tagged bar subscription with coalescing
//!   - `quotes`: Round-robin watchlist quote poller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `bridge`: HTTP/SSE client for the MT5 bridge
//!   - `relay`: Axum routes fronting the bridge
//!   - `config`: Environment-driven settings
//!   - `health`: Health check HTTP endpoints
//!
//! # Data Flow
//!
//! ```text
//!                  ┌──────────────────┐      ┌───────────────┐
//! MT5 Bridge ─────►│   BridgeClient   │─────►│ StreamSession │──► chart surface
//! (HTTP + SSE)     │ (SSE bar events) │      │  QuotePoller  │──► watchlist sink
//!                  └──────────────────┘      └───────────────┘
//!
//! MT5 Bridge ◄──── Relay routes (axum) ◄──── HTTP clients
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market-data types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::bar::Bar;
pub use domain::quote::{FlashDirection, QuoteFrame, QuoteUpdate, TickSnapshot};
pub use domain::streaming::{ConnectionStatus, StreamEvent};
pub use domain::timeframe::Timeframe;

// Ports and use cases
pub use application::ports::{
    BarEventStream, BarStreamRequest, GatewayError, HistoryResponse, MarketDataGateway, QuoteSink,
    RenderSurface,
};
pub use application::quotes::QuotePoller;
pub use application::session::{StreamSession, StreamSessionConfig};

// Bridge client (for integration tests)
pub use infrastructure::bridge::{BridgeClient, BridgeConfig, SseDecoder};

// Infrastructure config
pub use infrastructure::config::{
    BridgeSettings, BridgeToken, QuoteSettings, RelaySettings, ServerSettings, StreamSettings,
};

// Relay and health routers
pub use infrastructure::health::{HealthState, health_router};
pub use infrastructure::relay::create_router;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
