//! Relay Configuration Settings
//!
//! Configuration types for the stream relay, loaded from environment
//! variables. Everything has a default; there are no required
//! variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::application::session::StreamSessionConfig;
use crate::infrastructure::bridge::BridgeConfig;

/// Shared secret for the bridge, sent as `X-Bridge-Token`.
#[derive(Clone, PartialEq, Eq)]
pub struct BridgeToken(String);

impl BridgeToken {
    /// Wrap a token value.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Get the token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BridgeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BridgeToken").field(&"[REDACTED]").finish()
    }
}

/// Bridge connection settings.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Bridge base URL.
    pub url: String,
    /// Optional shared secret. Absent or empty means no header is sent.
    pub token: Option<BridgeToken>,
    /// Timeout for unary bridge requests.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5001".to_string(),
            token: None,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl BridgeSettings {
    /// Build the HTTP client configuration for these settings.
    #[must_use]
    pub fn client_config(&self) -> BridgeConfig {
        BridgeConfig {
            base_url: self.url.clone(),
            token: self.token.clone(),
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Relay HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Address the relay listens on.
    pub bind_addr: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

/// Streaming session settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Idle watchdog timeout. Zero disables the watchdog.
    pub idle_timeout: Duration,
    /// Render pump cadence.
    pub render_tick: Duration,
    /// Bars requested in the bootstrap snapshot.
    pub bootstrap_bars: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(20_000),
            render_tick: Duration::from_millis(16),
            bootstrap_bars: 300,
        }
    }
}

impl StreamSettings {
    /// Build a session configuration from these settings.
    #[must_use]
    pub const fn session_config(&self) -> StreamSessionConfig {
        StreamSessionConfig {
            bootstrap_bars: self.bootstrap_bars,
            idle_timeout: self.idle_timeout,
            render_tick: self.render_tick,
        }
    }
}

/// Quote polling settings.
#[derive(Debug, Clone)]
pub struct QuoteSettings {
    /// Requested polling interval. The poller floors it at its own
    /// minimum.
    pub poll_interval: Duration,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    /// Bridge connection settings.
    pub bridge: BridgeSettings,
    /// Relay server settings.
    pub server: ServerSettings,
    /// Streaming session settings.
    pub stream: StreamSettings,
    /// Quote polling settings.
    pub quotes: QuoteSettings,
}

impl RelaySettings {
    /// Create configuration from environment variables, falling back
    /// to defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let bridge = BridgeSettings {
            url: std::env::var("MT5_BRIDGE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| BridgeSettings::default().url),
            token: std::env::var("MT5_BRIDGE_TOKEN")
                .ok()
                .filter(|v| !v.is_empty())
                .map(BridgeToken::new),
            request_timeout: parse_env_duration_secs(
                "BRIDGE_HTTP_TIMEOUT_SECS",
                BridgeSettings::default().request_timeout,
            ),
            connect_timeout: parse_env_duration_secs(
                "BRIDGE_CONNECT_TIMEOUT_SECS",
                BridgeSettings::default().connect_timeout,
            ),
        };

        let server = ServerSettings {
            bind_addr: parse_env_socket_addr(
                "RELAY_BIND_ADDR",
                ServerSettings::default().bind_addr,
            ),
        };

        let stream = StreamSettings {
            idle_timeout: parse_env_duration_millis(
                "STREAM_IDLE_TIMEOUT_MS",
                StreamSettings::default().idle_timeout,
            ),
            render_tick: parse_env_duration_millis(
                "RENDER_TICK_MS",
                StreamSettings::default().render_tick,
            ),
            bootstrap_bars: parse_env_u32(
                "STREAM_BOOTSTRAP_BARS",
                StreamSettings::default().bootstrap_bars,
            ),
        };

        let quotes = QuoteSettings {
            poll_interval: parse_env_duration_millis(
                "QUOTE_POLL_INTERVAL_MS",
                QuoteSettings::default().poll_interval,
            ),
        };

        Self {
            bridge,
            server,
            stream,
            quotes,
        }
    }
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

fn parse_env_socket_addr(key: &str, default: SocketAddr) -> SocketAddr {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_token_redacted_debug() {
        let token = BridgeToken::new("hunter2".to_string());
        let debug = format!("{token:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn bridge_settings_defaults() {
        let settings = BridgeSettings::default();
        assert_eq!(settings.url, "http://127.0.0.1:5001");
        assert_eq!(settings.token, None);
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.bind_addr.port(), 3000);
        assert!(settings.bind_addr.ip().is_loopback());
    }

    #[test]
    fn stream_settings_defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.idle_timeout, Duration::from_millis(20_000));
        assert_eq!(settings.render_tick, Duration::from_millis(16));
        assert_eq!(settings.bootstrap_bars, 300);
    }

    #[test]
    fn stream_settings_map_onto_session_config() {
        let settings = StreamSettings {
            idle_timeout: Duration::from_secs(5),
            render_tick: Duration::from_millis(32),
            bootstrap_bars: 100,
        };
        let config = settings.session_config();
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.render_tick, Duration::from_millis(32));
        assert_eq!(config.bootstrap_bars, 100);
    }

    #[test]
    fn bridge_settings_map_onto_client_config() {
        let settings = BridgeSettings {
            url: "http://bridge:5001".to_string(),
            token: Some(BridgeToken::new("t".to_string())),
            ..BridgeSettings::default()
        };
        let config = settings.client_config();
        assert_eq!(config.base_url, "http://bridge:5001");
        assert!(config.token.is_some());
    }
}
