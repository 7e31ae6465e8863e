//! Domain Layer - Core market data types and business logic.
//!
//! This layer contains the core domain types for bar streaming and
//! quote polling with no external dependencies. All types here are
//! pure Rust with serialization support.

/// OHLCV bars: validity, deduplication, series sanitization.
pub mod bar;

/// Point quotes: tick sanitization and flash deltas.
pub mod quote;

/// Stream events and the connection-status state machine.
pub mod streaming;

/// Timeframe labels, canonical codes, and bucket arithmetic.
pub mod timeframe;
