//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// MT5 bridge HTTP/SSE client adapter.
pub mod bridge;

/// Configuration and settings.
pub mod config;

/// Health check HTTP endpoints.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// HTTP relay routes fronting the bridge.
pub mod relay;

/// OpenTelemetry tracing integration.
pub mod telemetry;
