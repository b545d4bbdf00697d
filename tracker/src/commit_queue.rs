//! Read commit queue.
//!
//! Accumulates read candidates and flushes them as a single batch once
//! candidates stop arriving for the debounce window (500ms by default):
//!
//! - Candidate ids are deduplicated and keep their arrival order
//! - Each new candidate cancels and reschedules the pending flush
//! - A flush snapshots and clears the pending set atomically
//! - Failed batches are re-queued ahead of newer candidates and retried
//!   after a backoff governed by [`RetryPolicy`]
//!
//! The queue does no I/O itself. [`take_due`](ReadCommitQueue::take_due)
//! hands out a batch and the caller reports the outcome back through
//! [`complete_success`](ReadCommitQueue::complete_success) or
//! [`complete_failure`](ReadCommitQueue::complete_failure).

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::types::ItemId;
use crate::utils::debounce::DebounceTimer;

/// Default debounce window in milliseconds.
pub const DEFAULT_COMMIT_DEBOUNCE_MS: u64 = 500;

/// Default backoff ceiling for failed commits in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Default number of consecutive failures before the failure is escalated.
pub const DEFAULT_RETRY_ALERT_AFTER: u32 = 10;

/// Jitter factor applied to backoff delays (±25%).
const DEFAULT_JITTER_FACTOR: f64 = 0.25;

/// Backoff applied between retries of failed commit batches.
///
/// Retries are unbounded: ids are never dropped because the backend is
/// unreachable. `alert_after` only controls when a persistent failure is
/// reported as such.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Relative jitter, e.g. `0.25` for ±25%.
    pub jitter: f64,
    /// Consecutive failures after which the failure is escalated.
    pub alert_after: Option<u32>,
}

impl RetryPolicy {
    /// Retries on every debounce window with no growth and no jitter.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
            alert_after: Some(DEFAULT_RETRY_ALERT_AFTER),
        }
    }

    /// Exponential backoff without jitter, for deterministic tests.
    #[must_use]
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter: 0.0,
            alert_after: Some(DEFAULT_RETRY_ALERT_AFTER),
        }
    }

    #[must_use]
    pub fn with_alert_after(mut self, alert_after: Option<u32>) -> Self {
        self.alert_after = alert_after;
        self
    }

    /// Base delay before the retry following `failures` consecutive failures.
    #[must_use]
    pub fn base_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() {
            Duration::from_secs_f64(capped.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// Delay with jitter applied, never shorter than `initial_delay`.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        let base = self.base_delay(failures);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let range = base.as_secs_f64() * self.jitter;
        let offset = rand::rng().random_range(-range..=range);
        Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0)).max(self.initial_delay)
    }

    /// Returns true when `failures` reaches the alert threshold.
    #[must_use]
    pub fn should_alert(&self, failures: u32) -> bool {
        self.alert_after.is_some_and(|n| n > 0 && failures >= n)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_COMMIT_DEBOUNCE_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            multiplier: 2.0,
            jitter: DEFAULT_JITTER_FACTOR,
            alert_after: Some(DEFAULT_RETRY_ALERT_AFTER),
        }
    }
}

/// What happened to a failed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryScheduled {
    /// Consecutive failures so far, including this one.
    pub attempt: u32,
    /// Delay until the retry flush.
    pub retry_in: Duration,
    /// True once the failure count reached the policy's alert threshold.
    pub alert: bool,
}

#[derive(Debug)]
pub struct ReadCommitQueue {
    pending: Vec<ItemId>,
    members: HashSet<ItemId>,
    flush_timer: DebounceTimer,
    /// Earliest time a retry may be flushed after a failure.
    backoff_until: Option<Instant>,
    consecutive_failures: u32,
    in_flight: usize,
    retry: RetryPolicy,
}

impl ReadCommitQueue {
    #[must_use]
    pub fn new(debounce: Duration, retry: RetryPolicy) -> Self {
        Self {
            pending: Vec::new(),
            members: HashSet::new(),
            flush_timer: DebounceTimer::new(debounce),
            backoff_until: None,
            consecutive_failures: 0,
            in_flight: 0,
            retry,
        }
    }

    /// Adds a candidate and reschedules the flush.
    ///
    /// Returns true if the id was not already pending. The flush is
    /// rescheduled either way.
    pub fn mark_candidate(&mut self, id: ItemId, now: Instant) -> bool {
        let added = self.insert(id);
        self.flush_timer.poke(now);
        if let Some(until) = self.backoff_until {
            self.flush_timer.extend_to(until);
        }
        added
    }

    /// Snapshots and clears the pending set if the flush deadline has passed.
    ///
    /// Returns `None` if the timer has not fired or nothing is pending.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<ItemId>> {
        if !self.flush_timer.fire(now) {
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }

        self.members.clear();
        let batch = std::mem::take(&mut self.pending);
        self.in_flight += 1;
        debug!(ids = batch.len(), in_flight = self.in_flight, "Flushing read batch");
        Some(batch)
    }

    /// Records a successful commit of an in-flight batch.
    pub fn complete_success(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.consecutive_failures = 0;
        self.backoff_until = None;
    }

    /// Re-queues a failed batch ahead of newer candidates and schedules a retry.
    pub fn complete_failure(&mut self, batch: Vec<ItemId>, now: Instant) -> RetryScheduled {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let newer = std::mem::take(&mut self.pending);
        self.members.clear();
        for id in batch.into_iter().chain(newer) {
            self.insert(id);
        }

        let retry_in = self.retry.delay(self.consecutive_failures);
        let until = now + retry_in;
        self.backoff_until = Some(until);
        self.flush_timer.extend_to(until);

        RetryScheduled {
            attempt: self.consecutive_failures,
            retry_in,
            alert: self.retry.should_alert(self.consecutive_failures),
        }
    }

    /// Removes an id from the pending set, e.g. because it became read elsewhere.
    pub fn remove(&mut self, id: &ItemId) -> bool {
        if self.members.remove(id) {
            self.pending.retain(|pending| pending != id);
            true
        } else {
            false
        }
    }

    /// Drops all pending ids and timers. In-flight batches are not affected.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.members.clear();
        self.flush_timer.cancel();
        self.backoff_until = None;
        self.consecutive_failures = 0;
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.flush_timer.deadline()
    }

    #[must_use]
    pub fn pending(&self) -> &[ItemId] {
        &self.pending
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.members.contains(id)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn insert(&mut self, id: ItemId) -> bool {
        if self.members.insert(id.clone()) {
            trace!(id = %id, "Queued read candidate");
            self.pending.push(id);
            true
        } else {
            false
        }
    }
}
