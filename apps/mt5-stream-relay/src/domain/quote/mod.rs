//! Point Quote Types
//!
//! Raw tick snapshots from the bridge are noisy: any of the price fields
//! can be null, zero, or garbage depending on instrument and session.
//! Sanitization keeps a field only when it is finite and positive, folds
//! the best available price by `last > bid > ask` priority, and discards
//! the snapshot entirely when no usable time or price remains.

use serde::{Deserialize, Serialize};

/// Raw `/tick` payload as the bridge reports it. Every field is
/// optional; validation happens in [`QuoteUpdate::sanitize`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TickSnapshot {
    /// Tick time, epoch seconds.
    #[serde(default)]
    pub time: Option<i64>,
    /// Bid price.
    #[serde(default)]
    pub bid: Option<f64>,
    /// Ask price.
    #[serde(default)]
    pub ask: Option<f64>,
    /// Last traded price (the bridge may substitute a recent close).
    #[serde(default)]
    pub last: Option<f64>,
    /// Tick volume.
    #[serde(default)]
    pub volume: Option<i64>,
}

/// A sanitized, accepted quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteUpdate {
    /// Best available price (`last`, else `bid`, else `ask`).
    pub last: f64,
    /// Bid, when it was usable.
    pub bid: Option<f64>,
    /// Ask, when it was usable.
    pub ask: Option<f64>,
    /// Tick time, epoch seconds.
    pub time: i64,
}

impl QuoteUpdate {
    /// Validate a raw snapshot into an accepted quote.
    ///
    /// Returns `None` when the snapshot has no positive time or no
    /// usable price; that outcome is expected noise, not an error.
    #[must_use]
    pub fn sanitize(snapshot: &TickSnapshot) -> Option<Self> {
        let last = snapshot.last.filter(|p| usable_price(*p));
        let bid = snapshot.bid.filter(|p| usable_price(*p));
        let ask = snapshot.ask.filter(|p| usable_price(*p));
        let time = snapshot.time.filter(|t| *t > 0)?;
        let best = last.or(bid).or(ask)?;

        Some(Self {
            last: best,
            bid,
            ask,
            time,
        })
    }
}

const fn usable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Direction of a quote move relative to the prior accepted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashDirection {
    /// Strictly higher than the prior value.
    Up,
    /// Strictly lower than the prior value.
    Down,
}

/// Compare against the prior accepted value; ties and missing priors
/// produce no flash.
#[must_use]
pub fn flash_direction(prior: Option<f64>, next: f64) -> Option<FlashDirection> {
    let prior = prior?;
    if next > prior {
        Some(FlashDirection::Up)
    } else if next < prior {
        Some(FlashDirection::Down)
    } else {
        None
    }
}

/// Signed percent change from `prior` to `next`.
#[must_use]
pub fn percent_change(prior: f64, next: f64) -> f64 {
    ((next - prior) / prior) * 100.0
}

/// An accepted quote together with its deltas against the previous
/// accepted value for the same symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteFrame {
    /// The accepted quote.
    pub update: QuoteUpdate,
    /// Flash direction, `None` on tie or first observation.
    pub flash: Option<FlashDirection>,
    /// Percent delta vs the prior accepted value, `None` on first
    /// observation.
    pub change_pct: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        time: Option<i64>,
        bid: Option<f64>,
        ask: Option<f64>,
        last: Option<f64>,
    ) -> TickSnapshot {
        TickSnapshot {
            time,
            bid,
            ask,
            last,
            volume: None,
        }
    }

    #[test]
    fn sanitize_prefers_last_over_bid_over_ask() {
        let all = snapshot(Some(100), Some(1.0), Some(1.2), Some(1.1));
        assert_eq!(QuoteUpdate::sanitize(&all).unwrap().last, 1.1);

        let no_last = snapshot(Some(100), Some(1.0), Some(1.2), None);
        assert_eq!(QuoteUpdate::sanitize(&no_last).unwrap().last, 1.0);

        let ask_only = snapshot(Some(100), None, Some(1.2), None);
        assert_eq!(QuoteUpdate::sanitize(&ask_only).unwrap().last, 1.2);
    }

    #[test]
    fn sanitize_drops_unusable_fields_but_keeps_quote() {
        let tick = snapshot(Some(100), Some(0.0), Some(-3.0), Some(1.5));
        let quote = QuoteUpdate::sanitize(&tick).unwrap();
        assert_eq!(quote.last, 1.5);
        assert_eq!(quote.bid, None);
        assert_eq!(quote.ask, None);
        assert_eq!(quote.time, 100);
    }

    #[test]
    fn sanitize_requires_time_and_some_price() {
        // No time.
        assert_eq!(
            QuoteUpdate::sanitize(&snapshot(None, Some(1.0), None, None)),
            None
        );
        // Zero time.
        assert_eq!(
            QuoteUpdate::sanitize(&snapshot(Some(0), Some(1.0), None, None)),
            None
        );
        // No usable price at all.
        assert_eq!(
            QuoteUpdate::sanitize(&snapshot(Some(100), Some(0.0), None, Some(f64::NAN))),
            None
        );
    }

    #[test]
    fn flash_direction_rules() {
        assert_eq!(flash_direction(None, 1.0), None);
        assert_eq!(flash_direction(Some(1.0), 1.0), None);
        assert_eq!(flash_direction(Some(1.0), 1.5), Some(FlashDirection::Up));
        assert_eq!(flash_direction(Some(1.5), 1.0), Some(FlashDirection::Down));
    }

    #[test]
    fn percent_change_matches_display_rounding() {
        let pct = percent_change(1.1000, 1.1010);
        assert!((pct - 0.0909).abs() < 0.001);
        assert_eq!(format!("{pct:+.2}%"), "+0.09%");

        let flat = percent_change(1.1010, 1.1010);
        assert!(flat.abs() < f64::EPSILON);
    }

    #[test]
    fn decodes_bridge_tick_json_with_nulls() {
        let tick: TickSnapshot = serde_json::from_str(
            r#"{"time":1700000000,"bid":null,"ask":1.2002,"last":0.0,"volume":3}"#,
        )
        .unwrap();
        assert_eq!(tick.bid, None);
        assert_eq!(tick.ask, Some(1.2002));
        assert_eq!(tick.last, Some(0.0));

        let quote = QuoteUpdate::sanitize(&tick).unwrap();
        assert_eq!(quote.last, 1.2002);
    }
}
