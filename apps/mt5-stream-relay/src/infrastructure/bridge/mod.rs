//! MT5 Bridge Adapters
//!
//! HTTP access to the bridge plus the SSE codec for its bar stream:
//!
//! - **Client**: unary lookups, raw stream passthrough, and the typed
//!   [`MarketDataGateway`](crate::application::ports::MarketDataGateway) adapter
//! - **Codec**: incremental SSE frame decoding

pub mod client;
pub mod codec;

pub use client::{BridgeClient, BridgeConfig};
pub use codec::SseDecoder;
