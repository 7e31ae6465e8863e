//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    BridgeSettings, BridgeToken, QuoteSettings, RelaySettings, ServerSettings, StreamSettings,
};
