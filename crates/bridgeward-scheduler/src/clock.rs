//! Wall-clock sources.
//!
//! Punishment records store absolute UTC timestamps, but timers run on
//! tokio's monotonic clock. [`TokioClock`] ties the two together so tests
//! with paused time see the wall clock advance along with the timers.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall clock derived from `tokio::time::Instant`.
///
/// Reads as `anchor + (tokio now - tokio anchor)`. Under
/// `tokio::time::pause` it only moves when tokio time does.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall_anchor: DateTime<Utc>,
    tokio_anchor: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Starts the clock at `wall`. Must be called inside a tokio runtime.
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall_anchor: wall,
            tokio_anchor: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.tokio_anchor.elapsed())
            .ok()
            .and_then(|elapsed| self.wall_anchor.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
