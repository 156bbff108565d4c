//! The composed timer service: stopwatch, run ledger, and tick schedule
//! behind one lock.
//!
//! One logical owner per timer: every start/stop/tick/resume serializes on
//! the stopwatch mutex. The in-memory stopwatch is the source of truth for
//! the live session; the ledger only has to make "a run was active"
//! durable, so persistence failures during start degrade crash recovery
//! without aborting the run.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use stint_daemon_protocol::StatusPayload;

use stint_core::{OpenStint, Result, StintError, StintRecord, Stopwatch};

use crate::db::Db;
use crate::observer::TraceObserver;
use crate::ticker::Ticker;

pub struct StintService {
    db: Db,
    stopwatch: Mutex<Stopwatch>,
    ticker: Mutex<Option<Ticker>>,
    tick_interval: Duration,
    // Handed to each spawned ticker so tick threads never keep the service
    // alive on their own.
    weak_self: Weak<StintService>,
}

pub enum ToggleOutcome {
    Started(StatusPayload),
    Stopped(StintRecord),
}

impl StintService {
    pub fn new(db: Db, tick_interval: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            db,
            stopwatch: Mutex::new(Stopwatch::new(Box::new(TraceObserver))),
            ticker: Mutex::new(None),
            tick_interval,
            weak_self: weak.clone(),
        })
    }

    /// The becameActive edge: reconstruct a run from the open row, if any.
    ///
    /// Runs at daemon startup and on an explicit resume request. A
    /// malformed or unreadable row skips recovery entirely; the timer
    /// starts fresh rather than crashing on bad state.
    pub fn resume(&self) {
        match self.db.open_stint() {
            Ok(Some(open)) => {
                let mut stopwatch = self.lock_stopwatch();
                info!(
                    tag = %open.tag,
                    started_at = %open.started_at.to_rfc3339(),
                    "Resuming open stint"
                );
                stopwatch.resume(open, Utc::now());
                drop(stopwatch);
                self.restart_ticker();
            }
            Ok(None) => {
                // No durable row, but a live in-memory run can still exist
                // if arming the ledger failed at start; keep it ticking.
                let running = self.lock_stopwatch().is_running();
                if running {
                    self.restart_ticker();
                }
            }
            Err(err) => {
                warn!(error = %err, "Skipping stint recovery");
            }
        }
    }

    pub fn start(&self, tag: &str) -> Result<StatusPayload> {
        let now = Utc::now();
        let mut stopwatch = self.lock_stopwatch();
        if !stopwatch.start(tag, now)? {
            // Already running; report the current state unchanged.
            return Ok(snapshot(&stopwatch));
        }

        let open = OpenStint {
            started_at: now,
            tag: stopwatch.tag().unwrap_or_default().to_string(),
        };
        if let Err(err) = self.db.begin_stint(&open) {
            // The live session keeps running from memory; only recovery
            // after a crash is lost.
            warn!(error = %err, "Failed to arm open stint");
        }

        let status = snapshot(&stopwatch);
        drop(stopwatch);
        // The open row is durable before the first tick is delivered.
        self.restart_ticker();
        info!(tag = %open.tag, "Stint started");
        Ok(status)
    }

    pub fn stop(&self) -> Result<Option<StintRecord>> {
        self.cancel_ticker();

        let mut stopwatch = self.lock_stopwatch();
        let record = match stopwatch.stop(Utc::now()) {
            Some(record) => record,
            None => return Ok(None),
        };
        drop(stopwatch);

        // A failure here leaves the open row armed; the run will be
        // re-surfaced on next startup instead of silently vanishing.
        self.db
            .finish_stint(&record)
            .map_err(StintError::Store)?;
        info!(
            tag = %record.tag,
            duration_secs = record.duration_secs,
            "Stint finished"
        );
        Ok(Some(record))
    }

    pub fn toggle(&self, tag: &str) -> Result<ToggleOutcome> {
        let running = self.lock_stopwatch().is_running();
        if running {
            match self.stop()? {
                Some(record) => Ok(ToggleOutcome::Stopped(record)),
                // A stop racing us already closed the run; report a fresh
                // start instead.
                None => Ok(ToggleOutcome::Started(self.start(tag)?)),
            }
        } else {
            Ok(ToggleOutcome::Started(self.start(tag)?))
        }
    }

    /// The enteredBackground edge: halt the schedule, leave the open row
    /// armed so the run can be reconstructed later.
    pub fn suspend(&self) {
        self.cancel_ticker();
        let stopwatch = self.lock_stopwatch();
        if stopwatch.is_running() {
            info!(tag = ?stopwatch.tag(), "Stint schedule suspended");
        }
    }

    pub fn status(&self) -> StatusPayload {
        snapshot(&self.lock_stopwatch())
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        self.db.list_tags().map_err(StintError::Store)
    }

    pub fn list_stints(&self, tag: Option<&str>, limit: usize) -> Result<Vec<StintRecord>> {
        self.db.list_stints(tag, limit).map_err(StintError::Store)
    }

    /// One scheduler tick. Invoked by the ticker thread; serialized with
    /// every other operation by the stopwatch lock.
    pub fn tick(&self) {
        self.lock_stopwatch().tick(Utc::now());
    }

    fn restart_ticker(&self) {
        let mut slot = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = Some(Ticker::spawn(self.weak_self.clone(), self.tick_interval));
    }

    fn cancel_ticker(&self) {
        let mut slot = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(active) = slot.take() {
            active.cancel();
        }
    }

    fn lock_stopwatch(&self) -> MutexGuard<'_, Stopwatch> {
        self.stopwatch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn snapshot(stopwatch: &Stopwatch) -> StatusPayload {
    let readout = stopwatch.readout();
    StatusPayload {
        running: stopwatch.is_running(),
        tag: stopwatch.tag().map(str::to_string),
        started_at: stopwatch.started_at().map(|value| value.to_rfc3339()),
        hours: readout.hours,
        minutes: readout.minutes,
        seconds: readout.seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::thread::sleep;
    use std::time::Duration;

    fn test_service(interval_ms: u64) -> (tempfile::TempDir, Arc<StintService>) {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(temp_dir.path().join("stint.db")).expect("db init");
        let service = StintService::new(db, Duration::from_millis(interval_ms));
        (temp_dir, service)
    }

    #[test]
    fn start_then_stop_persists_record_and_clears_open_row() {
        let (_guard, service) = test_service(100);

        let status = service.start("deep-work").expect("start");
        assert!(status.running);
        assert_eq!(status.tag.as_deref(), Some("deep-work"));

        let record = service.stop().expect("stop").expect("record");
        assert_eq!(record.tag, "deep-work");
        assert_eq!(record.duration_secs, 0);

        assert!(service.db.open_stint().expect("open stint").is_none());
        let stints = service.list_stints(None, 10).expect("list stints");
        assert_eq!(stints.len(), 1);
        assert!(!service.status().running);
    }

    #[test]
    fn start_arms_the_open_row_before_ticks_flow() {
        let (_guard, service) = test_service(100);

        service.start("deep-work").expect("start");

        let open = service
            .db
            .open_stint()
            .expect("query open stint")
            .expect("open row exists");
        assert_eq!(open.tag, "deep-work");

        service.stop().expect("stop");
    }

    #[test]
    fn empty_tag_fails_without_side_effects() {
        let (_guard, service) = test_service(100);

        let err = service.start("   ").unwrap_err();
        assert!(matches!(err, StintError::EmptyTag));
        assert!(!service.status().running);
        assert!(service.db.open_stint().expect("open stint").is_none());
    }

    #[test]
    fn second_start_is_a_noop_keeping_the_first_run() {
        let (_guard, service) = test_service(100);

        service.start("deep-work").expect("first start");
        let status = service.start("other").expect("second start");
        assert_eq!(status.tag.as_deref(), Some("deep-work"));

        let open = service
            .db
            .open_stint()
            .expect("query open stint")
            .expect("open row exists");
        assert_eq!(open.tag, "deep-work");

        service.stop().expect("stop");
    }

    #[test]
    fn ticker_drives_the_counter_until_stop() {
        let (_guard, service) = test_service(20);

        service.start("deep-work").expect("start");
        sleep(Duration::from_millis(200));

        let ticked = {
            let stopwatch = service.lock_stopwatch();
            stopwatch.ticks()
        };
        assert!(ticked > 0, "expected ticks, got {}", ticked);

        service.stop().expect("stop");
        let frozen = {
            let stopwatch = service.lock_stopwatch();
            stopwatch.ticks()
        };
        sleep(Duration::from_millis(100));
        let after = {
            let stopwatch = service.lock_stopwatch();
            stopwatch.ticks()
        };
        assert_eq!(frozen, after, "ticks must not advance after stop");
    }

    #[test]
    fn resume_reconstructs_a_run_from_the_open_row() {
        let (_guard, service) = test_service(100);

        let started_at = Utc::now() - ChronoDuration::seconds(125);
        service
            .db
            .begin_stint(&OpenStint {
                started_at,
                tag: "deep-work".to_string(),
            })
            .expect("begin stint");

        service.resume();

        let status = service.status();
        assert!(status.running);
        assert_eq!(status.tag.as_deref(), Some("deep-work"));
        assert_eq!(status.hours, 0);
        assert_eq!(status.minutes, 2);

        // The open row survives the resume untouched.
        let open = service
            .db
            .open_stint()
            .expect("query open stint")
            .expect("open row exists");
        assert_eq!(open.started_at, started_at);

        service.stop().expect("stop");
    }

    #[test]
    fn malformed_open_row_skips_recovery() {
        let (_guard, service) = test_service(100);

        service
            .db
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO open_stint (id, started_at, tag) \
                     VALUES (0, 'garbage', 'deep-work')",
                    [],
                )
                .map_err(|err| format!("Failed to insert bad row: {}", err))?;
                Ok(())
            })
            .expect("insert bad row");

        service.resume();
        assert!(!service.status().running);
    }

    #[test]
    fn suspend_leaves_the_open_row_armed() {
        let (_guard, service) = test_service(100);

        service.start("deep-work").expect("start");
        service.suspend();

        let open = service
            .db
            .open_stint()
            .expect("query open stint")
            .expect("open row exists");
        assert_eq!(open.tag, "deep-work");

        // Resume picks the same run back up.
        service.resume();
        let status = service.status();
        assert!(status.running);
        assert_eq!(status.tag.as_deref(), Some("deep-work"));

        service.stop().expect("stop");
    }

    #[test]
    fn toggle_round_trip() {
        let (_guard, service) = test_service(100);

        match service.toggle("deep-work").expect("toggle on") {
            ToggleOutcome::Started(status) => {
                assert!(status.running);
            }
            ToggleOutcome::Stopped(_) => panic!("expected a start"),
        }

        match service.toggle("deep-work").expect("toggle off") {
            ToggleOutcome::Stopped(record) => {
                assert_eq!(record.tag, "deep-work");
            }
            ToggleOutcome::Started(_) => panic!("expected a stop"),
        }

        assert!(!service.status().running);
    }

    #[test]
    fn stop_when_idle_reports_nothing_to_do() {
        let (_guard, service) = test_service(100);
        assert!(service.stop().expect("stop").is_none());
    }

    #[test]
    fn tags_stay_clean_while_a_run_is_armed() {
        let (_guard, service) = test_service(100);

        service.start("deep-work").expect("start");
        assert!(service.list_tags().expect("tags").is_empty());

        service.stop().expect("stop");
        assert_eq!(
            service.list_tags().expect("tags"),
            vec!["deep-work".to_string()]
        );
    }
}
