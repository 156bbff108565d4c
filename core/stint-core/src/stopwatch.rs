//! The stint stopwatch: a tick-driven state machine with wall-clock resync.
//!
//! The stopwatch counts scheduler ticks (tenths of a second) as its fast
//! path and periodically snaps the counter back to `now - started_at`, so
//! scheduler drift stays bounded over arbitrarily long runs. Missed ticks
//! are never replayed: resuming after a suspend recomputes the counter from
//! absolute time instead.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::{Result, StintError};
use crate::types::{OpenStint, StintRecord};

/// Scheduler ticks per second of wall-clock time.
pub const TICKS_PER_SECOND: u64 = 10;
/// Nominal delay between tick deliveries.
pub const TICK_INTERVAL_MS: u64 = 100;

const TICKS_PER_MINUTE: u64 = 60 * TICKS_PER_SECOND;
const TICKS_PER_HOUR: u64 = 60 * TICKS_PER_MINUTE;
// Snap the counter back to the wall clock this often; between snaps the
// accumulated scheduler error stays under ~2 seconds.
const RESYNC_INTERVAL_TICKS: u64 = 20;

/// Normalized display value for one tick. Hours are unbounded; minutes and
/// seconds wrap at 60.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReadout {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl TickReadout {
    pub fn from_ticks(ticks: u64) -> Self {
        Self {
            hours: ticks / TICKS_PER_HOUR,
            minutes: (ticks / TICKS_PER_MINUTE) % 60,
            seconds: (ticks / TICKS_PER_SECOND) % 60,
        }
    }

    pub fn from_whole_seconds(seconds: i64) -> Self {
        Self::from_ticks(seconds.max(0) as u64 * TICKS_PER_SECOND)
    }
}

impl std::fmt::Display for TickReadout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds
        )
    }
}

/// Callbacks the stopwatch delivers synchronously on every transition.
///
/// The stopwatch only ever calls out through this interface; it never
/// receives input from it. Each transition produces exactly one callback
/// invocation; nothing is queued or coalesced.
pub trait StopwatchObserver {
    fn on_tick(&self, readout: TickReadout);
    fn on_running_changed(&self, running: bool);
}

pub struct Stopwatch {
    tag: Option<String>,
    running: bool,
    ticks: u64,
    started_at: Option<DateTime<Utc>>,
    observer: Box<dyn StopwatchObserver + Send>,
}

impl Stopwatch {
    pub fn new(observer: Box<dyn StopwatchObserver + Send>) -> Self {
        Self {
            tag: None,
            running: false,
            ticks: 0,
            started_at: None,
            observer,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn readout(&self) -> TickReadout {
        TickReadout::from_ticks(self.ticks)
    }

    /// Begin a new run. Returns `Ok(false)` without touching any state if a
    /// run is already active.
    pub fn start(&mut self, tag: &str, now: DateTime<Utc>) -> Result<bool> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(StintError::EmptyTag);
        }
        if self.running {
            return Ok(false);
        }

        self.tag = Some(tag.to_string());
        self.started_at = Some(now);
        self.ticks = 0;
        self.running = true;
        self.observer.on_running_changed(true);
        Ok(true)
    }

    /// Advance the counter by one scheduler tick.
    ///
    /// Every `RESYNC_INTERVAL_TICKS` ticks the counter is replaced with the
    /// wall-clock elapsed value, so a slow or stalled scheduler cannot
    /// accumulate unbounded error. A no-op unless running.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if !self.running {
            return;
        }

        self.ticks += 1;
        if self.ticks % RESYNC_INTERVAL_TICKS == 0 {
            if let Some(started_at) = self.started_at {
                let resynced = wall_clock_ticks(started_at, now);
                trace!(counted = self.ticks, resynced, "tick resync");
                self.ticks = resynced;
            }
        }

        self.observer.on_tick(self.readout());
    }

    /// Finish the active run and hand back the completed record for the
    /// caller to persist. Returns `None` if nothing is running.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<StintRecord> {
        if !self.running {
            return None;
        }
        let started_at = match self.started_at.take() {
            Some(value) => value,
            None => return None,
        };

        self.running = false;
        let tag = self.tag.take().unwrap_or_default();
        let duration_secs = elapsed_whole_seconds(started_at, now);
        self.observer.on_running_changed(false);

        Some(StintRecord {
            started_at,
            ended_at: now,
            duration_secs,
            tag,
        })
    }

    /// Reconstruct a run recovered from the store, without the
    /// start-persistence side effect.
    ///
    /// Emits one immediate tick with the recovered value so displays catch
    /// up before the periodic schedule resumes, then the running-state
    /// callback.
    pub fn resume(&mut self, open: OpenStint, now: DateTime<Utc>) {
        self.ticks = wall_clock_ticks(open.started_at, now);
        self.started_at = Some(open.started_at);
        self.tag = Some(open.tag);
        self.running = true;
        self.observer.on_tick(self.readout());
        self.observer.on_running_changed(true);
    }
}

/// Elapsed ticks between two instants, rounded to the nearest tick and
/// clamped at zero when the clock has moved backward.
fn wall_clock_ticks(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = now.signed_duration_since(started_at).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis as u64 + TICK_INTERVAL_MS / 2) / TICK_INTERVAL_MS
}

/// Whole elapsed seconds, floored, clamped at zero.
fn elapsed_whole_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(started_at).num_seconds().max(0)
}
