//! Periodic tick delivery with O(1) cancellation.
//!
//! One dedicated thread sleeps on a channel and delivers a tick to the
//! service on every timeout. Canceling drops the sender, which wakes the
//! sleeping thread immediately; no in-flight tick is waited on, and a tick
//! racing a stop sees the stopped state under the service lock and no-ops.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread;
use std::time::Duration;

use crate::service::StintService;

/// Handle to the single active tick schedule. The service owns at most one
/// and cancels it before replacement.
pub struct Ticker {
    cancel: Sender<()>,
}

impl Ticker {
    pub fn spawn(service: Weak<StintService>, interval: Duration) -> Self {
        let (cancel, wakeups) = mpsc::channel::<()>();

        thread::spawn(move || loop {
            match wakeups.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let service = match service.upgrade() {
                        Some(service) => service,
                        None => break,
                    };
                    service.tick();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self { cancel }
    }

    /// Halt future deliveries. Consumes the handle; the loop observes the
    /// disconnect on its next wakeup.
    pub fn cancel(self) {
        drop(self.cancel);
    }
}
