//! Bar Stream Events and Connection Status
//!
//! Typed events for the bridge bar stream, plus the connection-status
//! state machine a client session runs over them.
//!
//! # Wire format
//!
//! One JSON object per SSE data frame, discriminated by `type`:
//!
//! ```json
//! {"type":"bootstrap","symbol":"EURUSD","timeframe":"H1","bars":[],"bootstrap":300,"_seq":0}
//! {"type":"bar-update","bar":{"time":1700000000,"open":1.1,"high":1.2,"low":1.0,"close":1.1},"_seq":7}
//! {"type":"bar-new","bar":{"time":1700003600,"open":1.2,"high":1.2,"low":1.2,"close":1.2},"_seq":8}
//! {"type":"error","message":"terminal failure"}
//! ```
//!
//! Keep-alive is the SSE comment `:hb`, which never reaches this layer.

use serde::{Deserialize, Serialize};

use crate::domain::bar::Bar;

// =============================================================================
// Stream Events
// =============================================================================

/// One event on a bar stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Wholesale snapshot: an ordered historical bar sequence that
    /// replaces any prior chart state.
    Bootstrap {
        /// Symbol the snapshot is for.
        #[serde(skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
        /// Canonical timeframe code the snapshot is for.
        #[serde(skip_serializing_if = "Option::is_none")]
        timeframe: Option<String>,
        /// Bars in ascending time order.
        #[serde(default)]
        bars: Vec<Bar>,
        /// Requested backfill count, echoed for diagnostics.
        #[serde(skip_serializing_if = "Option::is_none")]
        bootstrap: Option<u32>,
        /// Monotonic delivery sequence number.
        #[serde(rename = "_seq", skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    /// One bar mutating the currently open bucket.
    BarUpdate {
        /// The mutated bar.
        bar: Bar,
        /// Monotonic delivery sequence number.
        #[serde(rename = "_seq", skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    /// One bar opening a new bucket.
    BarNew {
        /// The freshly opened bar.
        bar: Bar,
        /// Monotonic delivery sequence number.
        #[serde(rename = "_seq", skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    /// Terminal upstream failure. No further events follow.
    Error {
        /// Diagnostic text, possibly empty.
        #[serde(default)]
        message: String,
    },
}

impl StreamEvent {
    /// Delivery sequence number, when the event carries one.
    #[must_use]
    pub const fn seq(&self) -> Option<u64> {
        match self {
            Self::Bootstrap { seq, .. }
            | Self::BarUpdate { seq, .. }
            | Self::BarNew { seq, .. } => *seq,
            Self::Error { .. } => None,
        }
    }

    /// True for `bar-update`/`bar-new`, the events that can move a
    /// session to [`ConnectionStatus::Live`].
    #[must_use]
    pub const fn is_incremental(&self) -> bool {
        matches!(self, Self::BarUpdate { .. } | Self::BarNew { .. })
    }
}

// =============================================================================
// Connection Status
// =============================================================================

/// Client-visible liveness of one logical subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Stream opened, no incremental bar accepted yet.
    #[default]
    Connecting,
    /// At least one incremental bar accepted this generation.
    Live,
    /// No decodable data frame within the idle window.
    Idle,
    /// Transport failed. A fresh subscribe is required to retry.
    Error,
}

impl ConnectionStatus {
    /// Lowercase wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Idle => "idle",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observations that can move the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusInput {
    /// An incremental bar (`bar-update`/`bar-new`) was accepted.
    Incremental,
    /// The idle watchdog elapsed with no decodable data frame.
    IdleElapsed,
    /// The transport failed (upstream close, network error, terminal
    /// error event).
    TransportFailed,
}

/// Status state machine for one subscription generation.
///
/// Transition table (anything not listed is a no-op):
///
/// | from                | input             | to      |
/// |---------------------|-------------------|---------|
/// | `connecting`/`idle` | `Incremental`     | `live`  |
/// | `connecting`/`live` | `IdleElapsed`     | `idle`  |
/// | any but `error`     | `TransportFailed` | `error` |
///
/// `live` fires at most once per machine: the first accepted
/// incremental bar marks the stream live, even when the idle watchdog
/// beat it there. Once live has fired, a later `idle` is sticky until
/// the transport fails. A bootstrap is deliberately not an input: a
/// snapshot can be served from a stale upstream, so only incremental
/// flow proves liveness. A fresh subscribe starts a new machine at
/// `connecting`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusMachine {
    current: ConnectionStatus,
    live_fired: bool,
}

impl StatusMachine {
    /// New machine in the `connecting` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: ConnectionStatus::Connecting,
            live_fired: false,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn current(&self) -> ConnectionStatus {
        self.current
    }

    /// Apply an observation. Returns the new status when it changed,
    /// `None` when the input was a no-op for the current state.
    pub const fn apply(&mut self, input: StatusInput) -> Option<ConnectionStatus> {
        let next = match (self.current, input) {
            (
                ConnectionStatus::Connecting | ConnectionStatus::Idle,
                StatusInput::Incremental,
            ) if !self.live_fired => {
                self.live_fired = true;
                ConnectionStatus::Live
            }
            (
                ConnectionStatus::Connecting | ConnectionStatus::Live,
                StatusInput::IdleElapsed,
            ) => ConnectionStatus::Idle,
            (
                ConnectionStatus::Connecting | ConnectionStatus::Live | ConnectionStatus::Idle,
                StatusInput::TransportFailed,
            ) => ConnectionStatus::Error,
            _ => return None,
        };
        self.current = next;
        Some(next)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn bar(time: i64) -> Bar {
        Bar {
            time,
            open: 1.0,
            high: 1.2,
            low: 0.9,
            close: 1.1,
            volume: 10,
        }
    }

    #[test]
    fn decodes_bootstrap_frame() {
        let json = r#"{"type":"bootstrap","symbol":"EURUSD","timeframe":"H1","bars":[{"time":1700000000,"open":1.0,"high":1.2,"low":0.9,"close":1.1,"volume":10}],"bootstrap":300,"_seq":0}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();

        let StreamEvent::Bootstrap {
            symbol,
            timeframe,
            bars,
            bootstrap,
            seq,
        } = event
        else {
            panic!("expected bootstrap, got {event:?}");
        };
        assert_eq!(symbol.as_deref(), Some("EURUSD"));
        assert_eq!(timeframe.as_deref(), Some("H1"));
        assert_eq!(bars, vec![bar(1_700_000_000)]);
        assert_eq!(bootstrap, Some(300));
        assert_eq!(seq, Some(0));
    }

    #[test]
    fn decodes_incremental_frames() {
        let update: StreamEvent = serde_json::from_str(
            r#"{"type":"bar-update","bar":{"time":1700000000,"open":1.0,"high":1.2,"low":0.9,"close":1.1,"volume":10},"_seq":7}"#,
        )
        .unwrap();
        assert!(update.is_incremental());
        assert_eq!(update.seq(), Some(7));

        let new: StreamEvent = serde_json::from_str(
            r#"{"type":"bar-new","bar":{"time":1700003600,"open":1.0,"high":1.2,"low":0.9,"close":1.1}}"#,
        )
        .unwrap();
        assert!(new.is_incremental());
        assert_eq!(new.seq(), None);
    }

    #[test]
    fn decodes_error_frame_with_and_without_message() {
        let with: StreamEvent =
            serde_json::from_str(r#"{"type":"error","message":"mt5 gone"}"#).unwrap();
        assert_eq!(
            with,
            StreamEvent::Error {
                message: "mt5 gone".to_string()
            }
        );
        assert!(!with.is_incremental());

        let without: StreamEvent = serde_json::from_str(r#"{"type":"error"}"#).unwrap();
        assert_eq!(
            without,
            StreamEvent::Error {
                message: String::new()
            }
        );
    }

    #[test]
    fn rejects_untyped_and_unknown_frames() {
        assert!(serde_json::from_str::<StreamEvent>("{}").is_err());
        assert!(serde_json::from_str::<StreamEvent>(r#"{"type":"quote"}"#).is_err());
    }

    #[test]
    fn serialized_frames_match_wire_names() {
        let event = StreamEvent::BarNew {
            bar: bar(1_700_003_600),
            seq: Some(8),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "bar-new");
        assert_eq!(json["_seq"], 8);
        assert_eq!(json["bar"]["time"], 1_700_003_600);
    }

    #[test]
    fn status_serializes_lowercase() {
        for status in [
            ConnectionStatus::Connecting,
            ConnectionStatus::Live,
            ConnectionStatus::Idle,
            ConnectionStatus::Error,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    // Full transition table, one row per (state, live_fired, input).
    #[test_case(ConnectionStatus::Connecting, false, StatusInput::Incremental, Some(ConnectionStatus::Live); "connecting goes live on incremental")]
    #[test_case(ConnectionStatus::Connecting, false, StatusInput::IdleElapsed, Some(ConnectionStatus::Idle); "connecting goes idle")]
    #[test_case(ConnectionStatus::Connecting, false, StatusInput::TransportFailed, Some(ConnectionStatus::Error); "connecting goes error")]
    #[test_case(ConnectionStatus::Live, true, StatusInput::Incremental, None; "live stays live on incremental")]
    #[test_case(ConnectionStatus::Live, true, StatusInput::IdleElapsed, Some(ConnectionStatus::Idle); "live goes idle")]
    #[test_case(ConnectionStatus::Live, true, StatusInput::TransportFailed, Some(ConnectionStatus::Error); "live goes error")]
    #[test_case(ConnectionStatus::Idle, false, StatusInput::Incremental, Some(ConnectionStatus::Live); "idle before live goes live on first incremental")]
    #[test_case(ConnectionStatus::Idle, true, StatusInput::Incremental, None; "idle after live stays idle")]
    #[test_case(ConnectionStatus::Idle, false, StatusInput::IdleElapsed, None; "idle stays idle")]
    #[test_case(ConnectionStatus::Idle, false, StatusInput::TransportFailed, Some(ConnectionStatus::Error); "idle goes error")]
    #[test_case(ConnectionStatus::Error, false, StatusInput::Incremental, None; "error ignores incremental")]
    #[test_case(ConnectionStatus::Error, false, StatusInput::IdleElapsed, None; "error ignores idle")]
    #[test_case(ConnectionStatus::Error, true, StatusInput::TransportFailed, None; "error is absorbing")]
    fn transition_table(
        from: ConnectionStatus,
        live_fired: bool,
        input: StatusInput,
        expected: Option<ConnectionStatus>,
    ) {
        let mut machine = StatusMachine {
            current: from,
            live_fired,
        };
        assert_eq!(machine.apply(input), expected);
        assert_eq!(machine.current(), expected.unwrap_or(from));
    }

    #[test]
    fn live_happens_once_per_machine() {
        let mut machine = StatusMachine::new();
        assert_eq!(machine.current(), ConnectionStatus::Connecting);

        assert_eq!(
            machine.apply(StatusInput::Incremental),
            Some(ConnectionStatus::Live)
        );
        // Further incrementals report no change.
        assert_eq!(machine.apply(StatusInput::Incremental), None);
        assert_eq!(machine.apply(StatusInput::Incremental), None);
        assert_eq!(machine.current(), ConnectionStatus::Live);
    }

    #[test]
    fn idle_after_live_is_sticky() {
        let mut machine = StatusMachine::new();
        machine.apply(StatusInput::Incremental);
        machine.apply(StatusInput::IdleElapsed);
        assert_eq!(machine.current(), ConnectionStatus::Idle);

        // live already fired this generation, so data does not re-emit it.
        assert_eq!(machine.apply(StatusInput::Incremental), None);
        assert_eq!(machine.current(), ConnectionStatus::Idle);
    }

    #[test]
    fn idle_before_live_recovers_on_first_incremental() {
        let mut machine = StatusMachine::new();
        machine.apply(StatusInput::IdleElapsed);
        assert_eq!(machine.current(), ConnectionStatus::Idle);

        assert_eq!(
            machine.apply(StatusInput::Incremental),
            Some(ConnectionStatus::Live)
        );
        assert_eq!(machine.current(), ConnectionStatus::Live);
    }
}
