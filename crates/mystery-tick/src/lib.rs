//! Tick scheduling and deadline timers for Mystery Online.
//!
//! Two cadences drive the client:
//!
//! - a high-frequency [`TickScheduler`] (60 Hz by default) that pumps
//!   transport I/O and message dispatch, and
//! - seconds-scale timers ([`RepeatingTimer`], [`OneShotTimer`]) that the
//!   liveness monitor uses for keepalive pings and their timeout.
//!
//! Timers never sleep on their own. They hold a deadline and are checked
//! against an explicit `now` on every tick, which keeps all of the client's
//! state on one task and makes time fully controllable in tests.
//!
//! # Integration
//!
//! ```ignore
//! let mut scheduler = TickScheduler::new(TickConfig::default());
//! loop {
//!     let tick = scheduler.wait_for_tick().await;
//!     client.pump(tick.now)?;
//!     scheduler.record_tick_end();
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tick scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Tick rate in Hz. 0 = the scheduler never fires.
    pub tick_rate_hz: u32,
    /// Budget warning threshold (0.0–1.0). A tracing warning is emitted
    /// when one tick's work exceeds this fraction of the tick budget.
    pub budget_warn_threshold: f64,
    /// Random jitter (0–max µs) added to the first tick.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            budget_warn_threshold: 0.80,
            initial_jitter_us: 0,
        }
    }
}

impl TickConfig {
    /// Maximum supported tick rate.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Create a config for a specific tick rate with defaults otherwise.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of a single tick. `None` when the rate is 0.
    pub fn tick_duration(&self) -> Option<Duration> {
        if self.tick_rate_hz == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / self.tick_rate_hz as f64))
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Information about a tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, Copy)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// When the tick fired. Pass this to timers.
    pub now: Instant,
    /// Ticks skipped because the previous one ran late.
    pub ticks_skipped: u64,
}

/// Fixed-rate tick source.
///
/// Late ticks are never replayed: when the caller falls behind, the
/// schedule restarts from the moment the late tick fired.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Option<Duration>,
    tick_count: u64,
    next_tick: Option<Instant>,
    tick_start: Option<Instant>,
    total_skipped: u64,
}

impl TickScheduler {
    /// Create a new scheduler from config.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let next_tick = tick_duration.map(|d| {
            let jitter = if config.initial_jitter_us > 0 {
                let us = rand::rng().random_range(0..config.initial_jitter_us);
                Duration::from_micros(us)
            } else {
                Duration::ZERO
            };
            Instant::now() + d + jitter
        });

        debug!(
            rate_hz = config.tick_rate_hz,
            budget_ms = ?tick_duration.map(|d| d.as_secs_f64() * 1000.0),
            "tick scheduler created"
        );

        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick,
            tick_start: None,
            total_skipped: 0,
        }
    }

    /// Create a scheduler for a specific tick rate.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Wait until the next tick is due.
    ///
    /// With a rate of 0 this future pends forever, so it
    /// can sit in a `tokio::select!` next to other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, tick_dur) = match (self.next_tick, self.tick_duration) {
            (Some(next), Some(dur)) => (next, dur),
            _ => return std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let ticks_skipped = (late_by.as_nanos() / tick_dur.as_nanos()) as u64;
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
            self.total_skipped += ticks_skipped;
        }
        self.next_tick = Some(now + tick_dur);

        trace!(tick = self.tick_count, "tick fired");

        TickInfo {
            tick: self.tick_count,
            now,
            ticks_skipped,
        }
    }

    /// Record that the work for the current tick has finished, warning if
    /// it used too much of the tick budget.
    pub fn record_tick_end(&mut self) {
        let (Some(start), Some(budget)) = (self.tick_start.take(), self.tick_duration) else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = budget.as_secs_f64() * 1000.0,
                "tick approaching budget limit"
            );
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Total ticks skipped because of overruns.
    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_duration(&self) -> Option<Duration> {
        self.tick_duration
    }
}

// ---------------------------------------------------------------------------
// Deadline timers
// ---------------------------------------------------------------------------

/// A timer that fires every `period` until cancelled.
#[derive(Debug, Clone)]
pub struct RepeatingTimer {
    period: Duration,
    next: Option<Instant>,
}

impl RepeatingTimer {
    /// Creates a stopped timer.
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// (Re)starts the timer so the next firing is one full period after
    /// `now`. Any pending firing is discarded.
    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns `true` if the timer is due at `now`, and schedules the next
    /// firing one period later. Missed periods collapse into one firing.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next {
            Some(deadline) if now >= deadline => {
                self.next = Some(now + self.period);
                true
            }
            _ => false,
        }
    }
}

/// A timer that fires once after `delay` unless cancelled first.
#[derive(Debug, Clone)]
pub struct OneShotTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl OneShotTimer {
    /// Creates a disarmed timer.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Arms the timer to fire `delay` after `now`, replacing any deadline
    /// that was already armed.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Disarms the timer. Returns `true` if it was armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once, on the first poll at or after the
    /// deadline, and disarms the timer.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
