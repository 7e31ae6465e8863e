//! Chart Timeframe Vocabulary
//!
//! UI timeframe labels and the bridge's canonical codes are two
//! representations of the same thing, related by a closed many-to-one
//! normalization table. The bridge only serves two hourly resolutions,
//! so hour labels fold down to H1/H4 on purpose.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical bridge timeframe code.
///
/// The wire form is the variant name (`"M1"`, `"H4"`, `"MN1"`, ...), both
/// in stream subscriptions and in history requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    /// One minute.
    M1,
    /// Five minutes.
    M5,
    /// Fifteen minutes.
    M15,
    /// Thirty minutes.
    M30,
    /// One hour.
    #[default]
    H1,
    /// Four hours.
    H4,
    /// One day.
    D1,
    /// One week.
    W1,
    /// One month (approximated as 30 days for bucket math).
    MN1,
}

impl Timeframe {
    /// Every canonical code, shortest bucket first.
    pub const ALL: [Self; 9] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
        Self::W1,
        Self::MN1,
    ];

    /// Canonical code as sent to the bridge.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
            Self::W1 => "W1",
            Self::MN1 => "MN1",
        }
    }

    /// Bucket width in seconds.
    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::M30 => 1_800,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
            Self::W1 => 604_800,
            Self::MN1 => 2_592_000,
        }
    }

    /// Floor an epoch-seconds timestamp to the start of its bucket.
    #[must_use]
    pub const fn bucket_start(self, unix_secs: i64) -> i64 {
        unix_secs - unix_secs.rem_euclid(self.seconds())
    }

    /// Map a user-facing timeframe label to its canonical code.
    ///
    /// Total and pure: unrecognized input falls back to [`Timeframe::H1`].
    /// Lowercase minute labels are matched before the uppercase fold, so
    /// `"1m"` (one minute) and `"1M"` (one month) stay distinct. Hour
    /// labels fold to the nearest supported bucket: `1h`/`2h` become H1,
    /// `4h`/`8h`/`12h` become H4. Canonical codes pass through unchanged,
    /// which makes the mapping idempotent.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let label = raw.trim();

        // Minute labels are case-sensitive: "1M" means one month.
        match label {
            "1m" => return Self::M1,
            "5m" => return Self::M5,
            "15m" => return Self::M15,
            "30m" => return Self::M30,
            _ => {}
        }

        match label.to_ascii_uppercase().as_str() {
            "M1" => Self::M1,
            "M5" => Self::M5,
            "M15" => Self::M15,
            "M30" => Self::M30,
            "4H" | "8H" | "12H" | "H4" => Self::H4,
            "1D" | "D1" => Self::D1,
            "1W" | "W1" => Self::W1,
            "1M" | "MN1" | "1MON" => Self::MN1,
            // "1H", "2H", the canonical "H1", and everything unrecognized.
            _ => Self::H1,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
