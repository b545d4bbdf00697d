//! Activation controller.
//!
//! Read tracking stays inert until the user shows engagement. How that is
//! detected depends on whether the feed container can scroll at all:
//!
//! - **Scrollable**: a one-shot listener activates on the first scroll event.
//!   No timer runs.
//! - **Not scrollable** (and the list is non-empty): the user can never
//!   scroll, so a one-shot timer (3s by default) activates the engine,
//!   provided the container is still not scrollable when it fires.
//!
//! Resizes are debounced (300ms by default) and re-run the scrollability
//! check while activation is still pending, restarting the timer logic.
//! Once active the state is terminal until the next mount or teardown.
//!
//! ```text
//!            mount()                 first scroll / timer
//!   Idle ───────────────▶ WaitingForScroll ──────────────────▶ Active
//!    ▲                          │                                 │
//!    └──────── teardown() ──────┴─────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::types::{ActivationState, ActivationTrigger, Container};
use crate::utils::debounce::DebounceTimer;

/// Default auto-activation delay for non-scrollable lists, in milliseconds.
pub const DEFAULT_ACTIVATION_DELAY_MS: u64 = 3000;

/// Default debounce for resize re-evaluation, in milliseconds.
pub const DEFAULT_RESIZE_DEBOUNCE_MS: u64 = 300;

#[derive(Debug)]
pub struct ActivationController {
    state: ActivationState,
    auto_timer: DebounceTimer,
    resize_timer: DebounceTimer,
    scroll_listener: bool,
    container: Container,
    has_items: bool,
}

impl ActivationController {
    #[must_use]
    pub fn new(activation_delay: Duration, resize_debounce: Duration) -> Self {
        Self {
            state: ActivationState::Idle,
            auto_timer: DebounceTimer::new(activation_delay),
            resize_timer: DebounceTimer::new(resize_debounce),
            scroll_listener: false,
            container: Container::default(),
            has_items: false,
        }
    }

    /// Starts a fresh activation cycle for a newly mounted list.
    pub fn mount(&mut self, container: Container, has_items: bool, now: Instant) {
        self.teardown();
        self.state = ActivationState::WaitingForScroll;
        self.container = container;
        self.has_items = has_items;
        self.evaluate(now);
    }

    /// Returns to `Idle` and cancels all timers and listeners.
    pub fn teardown(&mut self) {
        self.state = ActivationState::Idle;
        self.auto_timer.cancel();
        self.resize_timer.cancel();
        self.scroll_listener = false;
    }

    /// Handles a scroll event on the container.
    pub fn on_scroll(&mut self) -> Option<ActivationTrigger> {
        if self.state != ActivationState::WaitingForScroll || !self.scroll_listener {
            return None;
        }
        self.activate(ActivationTrigger::Scroll);
        Some(ActivationTrigger::Scroll)
    }

    /// Handles a viewport resize. The scrollability check runs once resizes settle.
    pub fn on_resize(&mut self, container: Container, now: Instant) {
        self.container = container;
        if self.state == ActivationState::WaitingForScroll {
            self.resize_timer.poke(now);
        }
    }

    /// Updates the container geometry without re-evaluating, e.g. after
    /// more items were appended.
    pub fn set_container(&mut self, container: Container) {
        self.container = container;
    }

    /// Updates whether the list has any items, re-evaluating on change.
    pub fn set_has_items(&mut self, has_items: bool, now: Instant) {
        if self.has_items != has_items {
            self.has_items = has_items;
            self.evaluate(now);
        }
    }

    /// Fires due timers. Returns the trigger if this call activated tracking.
    pub fn tick(&mut self, now: Instant) -> Option<ActivationTrigger> {
        if self.resize_timer.fire(now) {
            debug!(scrollable = self.container.is_scrollable(), "Re-evaluating after resize");
            self.evaluate(now);
        }

        if self.auto_timer.fire(now) && self.state == ActivationState::WaitingForScroll {
            if self.container.is_scrollable() {
                debug!("Container became scrollable, waiting for scroll instead");
                self.scroll_listener = true;
            } else {
                self.activate(ActivationTrigger::Timeout);
                return Some(ActivationTrigger::Timeout);
            }
        }

        None
    }

    #[must_use]
    pub fn state(&self) -> ActivationState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ActivationState::Active
    }

    #[must_use]
    pub fn is_listening_for_scroll(&self) -> bool {
        self.scroll_listener
    }

    #[must_use]
    pub fn auto_activation_deadline(&self) -> Option<Instant> {
        self.auto_timer.deadline()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.auto_timer.deadline(), self.resize_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn evaluate(&mut self, now: Instant) {
        if self.state != ActivationState::WaitingForScroll {
            return;
        }

        if self.container.is_scrollable() {
            self.auto_timer.cancel();
            self.scroll_listener = true;
        } else {
            self.scroll_listener = false;
            if self.has_items {
                self.auto_timer.poke(now);
            } else {
                self.auto_timer.cancel();
            }
        }
    }

    fn activate(&mut self, trigger: ActivationTrigger) {
        self.state = ActivationState::Active;
        self.scroll_listener = false;
        self.auto_timer.cancel();
        self.resize_timer.cancel();
        info!(trigger = ?trigger, "Read tracking activated");
    }
}

impl Default for ActivationController {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_ACTIVATION_DELAY_MS),
            Duration::from_millis(DEFAULT_RESIZE_DEBOUNCE_MS),
        )
    }
}
