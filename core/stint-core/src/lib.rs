//! # stint-core
//!
//! Core timer state machine for Stint, shared by the daemon and its clients.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Callers schedule ticks
//!   themselves and can wrap with async if needed.
//! - **No I/O**: Persistence and clocks live outside this crate. Every
//!   operation takes `now` explicitly, so tests drive time deterministically.
//! - **Not thread-safe**: Clients provide their own synchronization
//!   (`Mutex`, single-threaded loop).

pub mod error;
pub mod stopwatch;
pub mod types;

pub use error::{Result, StintError};
pub use stopwatch::{
    Stopwatch, StopwatchObserver, TickReadout, TICKS_PER_SECOND, TICK_INTERVAL_MS,
};
pub use types::{parse_rfc3339, OpenStint, StintRecord};
