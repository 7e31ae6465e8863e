//! Client Stream Session
//!
//! Owns one logical bar subscription: generation-tagged
//! connect/resubscribe, an idle watchdog, the connection-status state
//! machine, deduplication, and update coalescing toward the rendering
//! surface.
//!
//! # Generation discipline
//!
//! Every `subscribe`/`unsubscribe` call bumps a monotonic generation
//! counter. Tasks spawned for an older generation check the counter
//! before every surface callback, so rapid symbol or timeframe
//! switching can never deliver a stale bar or status to a newer chart
//! state, even while the old transport is still draining.
//!
//! # Coalescing
//!
//! Incremental bars can arrive faster than a chart should repaint.
//! The reader parks at most one pending bar in a single-slot mailbox
//! (latest value wins) and a render pump drains it once per rendering
//! tick.
//!
//! Surface callbacks run on session tasks and must not call back into
//! the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BarStreamRequest, MarketDataGateway, RenderSurface};
use crate::domain::bar::{Bar, sanitize_series};
use crate::domain::streaming::{ConnectionStatus, StatusInput, StatusMachine, StreamEvent};
use crate::domain::timeframe::Timeframe;
use crate::infrastructure::metrics::{self, DropReason, StreamEventKind};

// =============================================================================
// Configuration
// =============================================================================

/// Tuning for a [`StreamSession`].
#[derive(Debug, Clone)]
pub struct StreamSessionConfig {
    /// Backfill length requested on every subscribe.
    pub bootstrap_bars: u32,
    /// Mark the stream `idle` after this long without a decodable data
    /// frame. Zero disables the watchdog.
    pub idle_timeout: Duration,
    /// How often the render pump flushes at most one coalesced bar.
    pub render_tick: Duration,
}

impl Default for StreamSessionConfig {
    fn default() -> Self {
        Self {
            bootstrap_bars: 300,
            idle_timeout: Duration::from_millis(20_000),
            render_tick: Duration::from_millis(16),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// A task-local handle to the session's generation counter.
#[derive(Clone)]
struct Generation {
    counter: Arc<AtomicU64>,
    value: u64,
}

impl Generation {
    fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.value
    }
}

struct ActiveSubscription {
    symbol: String,
    timeframe: Timeframe,
    cancel: CancellationToken,
}

/// One logical bar subscription across resubscribes.
///
/// `subscribe` supersedes any prior subscription; the session never
/// reconnects on its own. After an `error` status the caller must
/// issue a fresh `subscribe` to retry.
pub struct StreamSession {
    gateway: Arc<dyn MarketDataGateway>,
    surface: Arc<dyn RenderSurface>,
    config: StreamSessionConfig,
    generation: Arc<AtomicU64>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl StreamSession {
    /// Create a session over a gateway and a rendering surface.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn MarketDataGateway>,
        surface: Arc<dyn RenderSurface>,
        config: StreamSessionConfig,
    ) -> Self {
        Self {
            gateway,
            surface,
            config,
            generation: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        }
    }

    /// Open a new subscription, superseding any prior one.
    ///
    /// Emits `connecting`, then spawns a reader task and a render-pump
    /// task for the new generation. A blank symbol still supersedes
    /// the prior subscription but opens nothing and emits no status.
    ///
    /// Must be called within a Tokio runtime.
    pub fn subscribe(&self, symbol: &str, timeframe: Timeframe) {
        let mut active = self.active.lock();
        let generation = Generation {
            counter: Arc::clone(&self.generation),
            value: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        };
        if let Some(prior) = active.take() {
            prior.cancel.cancel();
        }

        let symbol = symbol.trim();
        if symbol.is_empty() {
            return;
        }

        self.surface.status_changed(ConnectionStatus::Connecting);

        let cancel = CancellationToken::new();
        let slot = Arc::new(ConflatedBarSlot::default());

        let worker = SubscriptionWorker {
            gateway: Arc::clone(&self.gateway),
            surface: Arc::clone(&self.surface),
            slot: Arc::clone(&slot),
            generation: generation.clone(),
            cancel: cancel.clone(),
            request: BarStreamRequest {
                symbol: symbol.to_string(),
                timeframe,
                backfill: self.config.bootstrap_bars,
            },
            idle_timeout: self.config.idle_timeout,
            machine: StatusMachine::new(),
            last_pushed: None,
            last_seq: None,
        };
        tokio::spawn(worker.run());

        // interval panics on a zero period
        let tick = self.config.render_tick.max(Duration::from_millis(1));
        tokio::spawn(render_pump(
            Arc::clone(&self.surface),
            slot,
            generation,
            cancel.clone(),
            tick,
        ));

        *active = Some(ActiveSubscription {
            symbol: symbol.to_string(),
            timeframe,
            cancel,
        });
    }

    /// Cancel the current subscription without emitting a status.
    ///
    /// Idempotent; prior generations' callbacks become inert
    /// immediately, before their transports finish closing.
    pub fn unsubscribe(&self) {
        let mut active = self.active.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(prior) = active.take() {
            prior.cancel.cancel();
        }
    }

    /// Symbol and timeframe of the current subscription, if any.
    #[must_use]
    pub fn current_subscription(&self) -> Option<(String, Timeframe)> {
        self.active
            .lock()
            .as_ref()
            .map(|active| (active.symbol.clone(), active.timeframe))
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// =============================================================================
// Reader
// =============================================================================

struct SubscriptionWorker {
    gateway: Arc<dyn MarketDataGateway>,
    surface: Arc<dyn RenderSurface>,
    slot: Arc<ConflatedBarSlot>,
    generation: Generation,
    cancel: CancellationToken,
    request: BarStreamRequest,
    idle_timeout: Duration,
    machine: StatusMachine,
    last_pushed: Option<Bar>,
    last_seq: Option<u64>,
}

impl SubscriptionWorker {
    async fn run(mut self) {
        let mut stream = match self.gateway.open_bar_stream(self.request.clone()).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(symbol = %self.request.symbol, %error, "bar stream open failed");
                self.emit(StatusInput::TransportFailed);
                return;
            }
        };

        let idle_enabled = !self.idle_timeout.is_zero();
        let watchdog = tokio::time::sleep(self.idle_timeout);
        tokio::pin!(watchdog);
        let mut watchdog_armed = idle_enabled;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = &mut watchdog, if watchdog_armed => {
                    // stays disarmed until the next decoded frame
                    watchdog_armed = false;
                    self.emit(StatusInput::IdleElapsed);
                }
                event = stream.next() => {
                    match event {
                        Some(Ok(event)) => {
                            if idle_enabled {
                                watchdog
                                    .as_mut()
                                    .reset(tokio::time::Instant::now() + self.idle_timeout);
                                watchdog_armed = true;
                            }
                            self.handle_event(event);
                        }
                        Some(Err(error)) => {
                            tracing::warn!(
                                symbol = %self.request.symbol,
                                %error,
                                "bar stream transport error"
                            );
                            self.emit(StatusInput::TransportFailed);
                            break;
                        }
                        None => {
                            tracing::debug!(symbol = %self.request.symbol, "bar stream ended");
                            self.emit(StatusInput::TransportFailed);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Run a status input through the machine and forward the change,
    /// unless a newer generation exists.
    fn emit(&mut self, input: StatusInput) {
        if let Some(status) = self.machine.apply(input)
            && self.generation.is_current()
        {
            tracing::debug!(symbol = %self.request.symbol, %status, "stream status changed");
            self.surface.status_changed(status);
        }
    }

    fn handle_event(&mut self, event: StreamEvent) {
        self.track_seq(event.seq());

        match event {
            StreamEvent::Bootstrap { bars, .. } => {
                metrics::record_stream_event(StreamEventKind::Bootstrap);
                let received = bars.len();
                let clean = sanitize_series(bars);
                let dropped = received - clean.len();
                if dropped > 0 {
                    metrics::record_bars_dropped(
                        DropReason::Invalid,
                        u64::try_from(dropped).unwrap_or(u64::MAX),
                    );
                    tracing::debug!(
                        symbol = %self.request.symbol,
                        dropped,
                        "dropped malformed bootstrap bars"
                    );
                }
                if self.generation.is_current() {
                    self.surface.replace_series(&clean);
                }
            }
            StreamEvent::BarUpdate { bar, .. } => {
                metrics::record_stream_event(StreamEventKind::BarUpdate);
                self.handle_incremental(bar);
            }
            StreamEvent::BarNew { bar, .. } => {
                metrics::record_stream_event(StreamEventKind::BarNew);
                self.handle_incremental(bar);
            }
            StreamEvent::Error { message } => {
                // terminal for the upstream; the transport close that
                // follows produces the error status
                metrics::record_stream_event(StreamEventKind::Error);
                tracing::warn!(symbol = %self.request.symbol, %message, "upstream error event");
            }
        }
    }

    fn handle_incremental(&mut self, bar: Bar) {
        if !bar.is_valid() {
            metrics::record_bars_dropped(DropReason::Invalid, 1);
            tracing::debug!(symbol = %self.request.symbol, time = bar.time, "dropped malformed bar");
            return;
        }

        self.emit(StatusInput::Incremental);

        if let Some(last) = &self.last_pushed {
            if bar.is_duplicate_of(last) {
                metrics::record_bars_dropped(DropReason::Duplicate, 1);
                return;
            }
        }
        self.last_pushed = Some(bar);

        if self.slot.push(bar) {
            metrics::record_bars_dropped(DropReason::Conflated, 1);
        }
    }

    /// Sequence numbers are delivery diagnostics only; a gap is
    /// counted, never acted on.
    fn track_seq(&mut self, seq: Option<u64>) {
        let Some(seq) = seq else { return };
        if let Some(prev) = self.last_seq {
            if seq != prev.wrapping_add(1) {
                metrics::record_seq_gap();
                tracing::debug!(
                    symbol = %self.request.symbol,
                    prev,
                    seq,
                    "sequence gap in bar stream"
                );
            }
        }
        self.last_seq = Some(seq);
    }
}

// =============================================================================
// Render Pump
// =============================================================================

/// Single-slot mailbox for incremental bars: latest value wins.
#[derive(Debug, Default)]
struct ConflatedBarSlot {
    pending: Mutex<Option<Bar>>,
}

impl ConflatedBarSlot {
    /// Park a bar for the next flush. Returns `true` when an
    /// undelivered bar was replaced.
    fn push(&self, bar: Bar) -> bool {
        self.pending.lock().replace(bar).is_some()
    }

    fn take(&self) -> Option<Bar> {
        self.pending.lock().take()
    }
}

/// Flush at most one pending bar per rendering tick.
async fn render_pump(
    surface: Arc<dyn RenderSurface>,
    slot: Arc<ConflatedBarSlot>,
    generation: Generation,
    cancel: CancellationToken,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                // stale bars are drained and discarded
                if let Some(bar) = slot.take()
                    && generation.is_current()
                {
                    surface.apply_bar(&bar);
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, close: f64) -> Bar {
        Bar {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1,
        }
    }

    #[test]
    fn config_defaults() {
        let config = StreamSessionConfig::default();
        assert_eq!(config.bootstrap_bars, 300);
        assert_eq!(config.idle_timeout, Duration::from_millis(20_000));
        assert_eq!(config.render_tick, Duration::from_millis(16));
    }

    #[test]
    fn slot_latest_value_wins() {
        let slot = ConflatedBarSlot::default();
        assert!(slot.take().is_none());

        assert!(!slot.push(bar(100, 1.0)));
        assert!(slot.push(bar(100, 1.1)));
        assert!(slot.push(bar(100, 1.2)));

        assert_eq!(slot.take(), Some(bar(100, 1.2)));
        assert!(slot.take().is_none());
    }

    #[test]
    fn generation_tracks_counter() {
        let counter = Arc::new(AtomicU64::new(1));
        let generation = Generation {
            counter: Arc::clone(&counter),
            value: 1,
        };
        assert!(generation.is_current());

        counter.fetch_add(1, Ordering::SeqCst);
        assert!(!generation.is_current());
    }
}
