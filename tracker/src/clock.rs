//! Time sources for the engine.
//!
//! The engine never reads the system time directly. Production code uses
//! [`TokioClock`], which honours `tokio::time::pause`, and tests drive a
//! [`ManualClock`] forward explicitly.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of monotonic and wall-clock time.
pub trait Clock {
    /// Monotonic time used for all timers.
    fn now(&self) -> Instant;

    /// Wall-clock time stamped onto committed items.
    fn wall(&self) -> DateTime<Utc>;
}

/// Clock backed by the tokio timer and the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
struct ManualTime {
    instant: Instant,
    wall: DateTime<Utc>,
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualTime>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualTime {
                instant: Instant::now(),
                wall: Utc::now(),
            })),
        }
    }

    /// Moves both the monotonic and the wall clock forward.
    pub fn advance(&self, by: Duration) {
        let mut time = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        time.instant += by;
        time.wall += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .instant
    }

    fn wall(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let shared = clock.clone();
        let start = clock.now();
        let wall_start = clock.wall();

        shared.advance_ms(1500);

        assert_eq!(clock.now() - start, Duration::from_millis(1500));
        assert_eq!((clock.wall() - wall_start).num_milliseconds(), 1500);
    }
}
