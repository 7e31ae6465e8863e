//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the streaming session, the quote poller, and
//! the port interfaces the domain uses to reach external systems.

/// Port interfaces for the upstream gateway and downstream consumers.
pub mod ports;

/// Round-robin quote polling over a watchlist.
pub mod quotes;

/// Chart streaming session lifecycle.
pub mod session;
