//! Deadline-based debounce timer.
//!
//! The engine is driven by a single event loop, so instead of owning a
//! background task each debounce is a deadline that the loop checks. Every
//! [`poke`](DebounceTimer::poke) cancels the pending deadline and starts a
//! fresh one, so the timer only fires after a quiet period.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tokio::time::Instant;
//! use feedmark_tracker::utils::debounce::DebounceTimer;
//!
//! let start = Instant::now();
//! let mut timer = DebounceTimer::new(Duration::from_millis(500));
//!
//! timer.poke(start);
//! timer.poke(start + Duration::from_millis(400));
//!
//! // The second poke pushed the deadline out.
//! assert!(!timer.fire(start + Duration::from_millis(600)));
//! assert!(timer.fire(start + Duration::from_millis(900)));
//! assert!(!timer.is_armed());
//! ```

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct DebounceTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancels any pending deadline and schedules a new one `interval` from `now`.
    pub fn poke(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    /// Schedules the deadline at `at` unless one is already pending later.
    pub fn extend_to(&mut self, at: Instant) {
        self.deadline = Some(match self.deadline {
            Some(current) if current > at => current,
            _ => at,
        });
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns true and disarms the timer if its deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
