//! Quote Polling Scheduler
//!
//! Round-robin poller over a watchlist: each tick issues exactly one
//! point-quote request for the symbol at the cursor, cancelling any
//! request still in flight from the previous tick. Single-flight is
//! the one backpressure device here; upstream load stays at one
//! request regardless of watchlist size or tick rate.
//!
//! Accepted quotes are delivered with directional flash and percent
//! deltas computed against the previously accepted value for the same
//! symbol. Prior values survive `stop()`/`start()` so a paused
//! watchlist resumes without losing its deltas.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{GatewayError, MarketDataGateway, QuoteSink};
use crate::domain::quote::{QuoteFrame, QuoteUpdate, TickSnapshot, flash_direction, percent_change};
use crate::infrastructure::metrics::{self, QuotePollOutcome};

/// Lower bound on the polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(300);

// =============================================================================
// Poller
// =============================================================================

#[derive(Default)]
struct PollerState {
    symbols: Vec<String>,
    cursor: usize,
    loop_cancel: Option<CancellationToken>,
    inflight: Option<CancellationToken>,
}

struct PollerInner {
    gateway: Arc<dyn MarketDataGateway>,
    sink: Arc<dyn QuoteSink>,
    state: Mutex<PollerState>,
    /// Last accepted price per symbol. Deliberately outlives
    /// `stop()`/`start()` cycles.
    prices: Mutex<HashMap<String, f64>>,
}

/// Round-robin quote poller over a symbol watchlist.
pub struct QuotePoller {
    inner: Arc<PollerInner>,
}

impl QuotePoller {
    /// Create a poller over a gateway and a quote sink.
    #[must_use]
    pub fn new(gateway: Arc<dyn MarketDataGateway>, sink: Arc<dyn QuoteSink>) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                gateway,
                sink,
                state: Mutex::new(PollerState::default()),
                prices: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start polling `symbols`, one request per `interval` tick.
    ///
    /// The first cycle fires immediately; the interval is floored at
    /// [`MIN_POLL_INTERVAL`]. A no-op while already running: use
    /// [`set_symbols`](Self::set_symbols) to change the watchlist.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self, symbols: Vec<String>, interval: Duration) {
        let mut state = self.inner.state.lock();
        if state.loop_cancel.is_some() {
            return;
        }

        metrics::set_watchlist_size(symbols.len());
        state.symbols = symbols;
        state.cursor = 0;

        let cancel = CancellationToken::new();
        state.loop_cancel = Some(cancel.clone());
        tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            cancel,
            interval.max(MIN_POLL_INTERVAL),
        ));
    }

    /// Stop polling and cancel any in-flight request. Idempotent.
    /// Accepted prices are retained for the next `start`.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if let Some(cancel) = state.loop_cancel.take() {
            cancel.cancel();
        }
        if let Some(inflight) = state.inflight.take() {
            inflight.cancel();
        }
    }

    /// Replace the watchlist and restart the round-robin from the
    /// front. Takes effect on the next tick.
    pub fn set_symbols(&self, symbols: Vec<String>) {
        let mut state = self.inner.state.lock();
        metrics::set_watchlist_size(symbols.len());
        state.symbols = symbols;
        state.cursor = 0;
    }

    /// Whether the polling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().loop_cancel.is_some()
    }
}

impl Drop for QuotePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Polling Loop
// =============================================================================

async fn poll_loop(inner: Arc<PollerInner>, cancel: CancellationToken, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => poll_once(&inner),
        }
    }
}

/// Issue one request for the symbol at the cursor, superseding any
/// request still in flight.
fn poll_once(inner: &Arc<PollerInner>) {
    let (symbol, token) = {
        let mut state = inner.state.lock();
        if state.symbols.is_empty() {
            return;
        }
        let symbol = state.symbols[state.cursor % state.symbols.len()].clone();
        state.cursor = state.cursor.wrapping_add(1);

        if let Some(prior) = state.inflight.take() {
            prior.cancel();
        }
        let token = CancellationToken::new();
        state.inflight = Some(token.clone());
        (symbol, token)
    };

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tokio::select! {
            // superseded or stopped; not an error, not logged
            () = token.cancelled() => {}
            result = inner.gateway.latest_tick(&symbol) => {
                inner.handle_result(&symbol, result);
            }
        }
    });
}

impl PollerInner {
    fn handle_result(&self, symbol: &str, result: Result<TickSnapshot, GatewayError>) {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(error) => {
                metrics::record_quote_poll(QuotePollOutcome::Failed);
                tracing::debug!(symbol, %error, "quote poll failed");
                return;
            }
        };

        let Some(update) = QuoteUpdate::sanitize(&snapshot) else {
            // no usable time or price; expected noise
            metrics::record_quote_poll(QuotePollOutcome::Discarded);
            tracing::debug!(symbol, "quote snapshot discarded");
            return;
        };

        let prior = self.prices.lock().insert(symbol.to_string(), update.last);
        let frame = QuoteFrame {
            update,
            flash: flash_direction(prior, update.last),
            change_pct: prior.map(|prior| percent_change(prior, update.last)),
        };

        metrics::record_quote_poll(QuotePollOutcome::Accepted);
        self.sink.quote_updated(symbol, &frame);
    }
}

// =============================================================================
// Tests
// =============================================================================
