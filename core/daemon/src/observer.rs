//! The daemon's sink for stopwatch callbacks: structured log lines.

use stint_core::{StopwatchObserver, TickReadout};
use tracing::{debug, info};

pub struct TraceObserver;

impl StopwatchObserver for TraceObserver {
    fn on_tick(&self, readout: TickReadout) {
        debug!(elapsed = %readout, "tick");
    }

    fn on_running_changed(&self, running: bool) {
        info!(running, "Stopwatch running state changed");
    }
}
