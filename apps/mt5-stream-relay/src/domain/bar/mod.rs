//! OHLC Bar Type
//!
//! A bar is a fixed-duration price aggregate keyed by its bucket start
//! time. Bars arrive from the bridge over JSON and are forwarded to the
//! rendering surface; anything that fails the validity invariant is
//! dropped at ingestion instead of corrupting the chart.

use serde::{Deserialize, Serialize};

/// One OHLC aggregate for a single time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start, epoch seconds.
    pub time: i64,
    /// Opening price.
    pub open: f64,
    /// Bucket high.
    pub high: f64,
    /// Bucket low.
    pub low: f64,
    /// Latest price in the bucket.
    pub close: f64,
    /// Accumulated tick volume. Not part of the dedup identity.
    #[serde(default)]
    pub volume: i64,
}

impl Bar {
    /// Check the bar invariant: positive bucket time, four finite
    /// positive prices, and `low <= min(open,close) <= max(open,close)
    /// <= high`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if self.time <= 0 || prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        self.low <= body_low && body_high <= self.high
    }

    /// Whether `other` is a redundant delivery of this bar: same time
    /// bucket and bit-identical OHLC. Volume is ignored, it keeps
    /// accumulating between otherwise identical updates.
    #[must_use]
    pub fn is_duplicate_of(&self, other: &Self) -> bool {
        self.time == other.time
            && self.open.to_bits() == other.open.to_bits()
            && self.high.to_bits() == other.high.to_bits()
            && self.low.to_bits() == other.low.to_bits()
            && self.close.to_bits() == other.close.to_bits()
    }
}

/// Drop malformed bars from a bootstrap series and restore ascending
/// time order. The relative order of equal timestamps is preserved.
#[must_use]
pub fn sanitize_series(bars: Vec<Bar>) -> Vec<Bar> {
    let mut kept: Vec<Bar> = bars.into_iter().filter(Bar::is_valid).collect();
    kept.sort_by_key(|bar| bar.time);
    kept
}
