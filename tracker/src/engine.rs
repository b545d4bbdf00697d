//! The read-tracking engine.
//!
//! [`ReadTracker`] composes the visibility monitor, position ledger,
//! direction classifier, commit queue, and activation controller into one
//! explicit instance with a `mount → dispose` lifecycle. It performs no I/O
//! and owns no tasks: the host feeds it events and polls it for due work.
//!
//! # Event boundary
//!
//! | Input | Method |
//! |-------|--------|
//! | List mounted / filter changed | [`mount`](ReadTracker::mount), [`replace_items`](ReadTracker::replace_items) |
//! | Next page loaded | [`append_items`](ReadTracker::append_items) |
//! | Node rendered | [`register`](ReadTracker::register) |
//! | Layout changed | [`on_layout`](ReadTracker::on_layout) |
//! | Native intersection callback | [`on_visibility_change`](ReadTracker::on_visibility_change) |
//! | Scroll / resize | [`on_scroll`](ReadTracker::on_scroll), [`on_resize`](ReadTracker::on_resize) |
//! | Timers | [`next_deadline`](ReadTracker::next_deadline), [`tick`](ReadTracker::tick) |
//! | Commit settled | [`on_commit_result`](ReadTracker::on_commit_result) |
//! | View unmounted | [`dispose`](ReadTracker::dispose) |
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use feedmark_tracker::clock::ManualClock;
//! use feedmark_tracker::config::TrackerSettings;
//! use feedmark_tracker::engine::ReadTracker;
//! use feedmark_tracker::types::{Container, Item, NodeRect};
//!
//! let clock = ManualClock::new();
//! let mut tracker = ReadTracker::with_clock(TrackerSettings::default(), clock.clone());
//!
//! tracker.mount(vec![Item::unread("a")], Container::new(0.0, 800.0, 3000.0));
//! tracker.on_scroll();
//! tracker.register("a".into(), Some(NodeRect::new(150.0, 100.0)));
//! tracker.on_layout(&[("a".into(), NodeRect::new(-20.0, 100.0))]);
//!
//! clock.advance(Duration::from_millis(500));
//! let batch = tracker.tick().batch.expect("one batch is due");
//! assert_eq!(batch.ids.len(), 1);
//!
//! tracker.on_commit_result(batch, Ok::<(), String>(()));
//! assert!(tracker.item(&"a".into()).is_some_and(|item| item.is_read()));
//! ```

use std::fmt::Display;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::activation::ActivationController;
use crate::classifier::{classify, Classification, ItemStatus};
use crate::clock::{Clock, TokioClock};
use crate::commit_queue::{ReadCommitQueue, RetryScheduled};
use crate::config::TrackerSettings;
use crate::items::FeedItems;
use crate::ledger::PositionLedger;
use crate::types::{ActivationState, ActivationTrigger, Container, Item, ItemId, NodeRect, VisibilityEvent};
use crate::visibility::VisibilityMonitor;

/// A batch handed out for committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    /// Mount generation the batch was taken from.
    pub generation: u64,
    pub ids: Vec<ItemId>,
}

/// Why a commit result was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The engine was disposed while the request was in flight.
    Unmounted,
    /// The list was replaced while the request was in flight.
    StaleGeneration,
}

/// Effect of a settled commit on the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Items were marked read locally. Aggregate stats should be refreshed.
    Committed {
        ids: Vec<ItemId>,
        viewed_at: DateTime<Utc>,
    },
    /// The batch failed and its ids are pending again.
    Requeued {
        ids: Vec<ItemId>,
        retry: RetryScheduled,
    },
    /// The result arrived too late to matter.
    Discarded(DiscardReason),
}

/// Work that became due on a [`tick`](ReadTracker::tick).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tick {
    pub activated: Option<ActivationTrigger>,
    pub batch: Option<CommitBatch>,
}

/// Viewport-driven read tracker for a single feed view.
#[derive(Debug)]
pub struct ReadTracker<C: Clock = TokioClock> {
    settings: TrackerSettings,
    clock: C,
    session: Option<Uuid>,
    generation: u64,
    items: FeedItems,
    monitor: VisibilityMonitor,
    ledger: PositionLedger,
    activation: ActivationController,
    queue: ReadCommitQueue,
}

impl ReadTracker<TokioClock> {
    #[must_use]
    pub fn new(settings: TrackerSettings) -> Self {
        Self::with_clock(settings, TokioClock)
    }
}

impl<C: Clock> ReadTracker<C> {
    #[must_use]
    pub fn with_clock(settings: TrackerSettings, clock: C) -> Self {
        Self {
            monitor: VisibilityMonitor::new(settings.top_margin_px),
            activation: ActivationController::new(settings.activation_delay, settings.resize_debounce),
            queue: ReadCommitQueue::new(settings.commit_debounce, settings.retry.clone()),
            ledger: PositionLedger::new(),
            items: FeedItems::default(),
            session: None,
            generation: 0,
            settings,
            clock,
        }
    }

    /// Starts tracking a freshly mounted list.
    ///
    /// Any previous state is discarded first, so mounting twice is a remount.
    pub fn mount(&mut self, items: Vec<Item>, container: Container) {
        self.reset();
        self.generation += 1;
        let session = Uuid::new_v4();
        self.session = Some(session);
        self.items = FeedItems::new(items);
        self.monitor.set_container(container);
        self.activation
            .mount(container, !self.items.is_empty(), self.clock.now());

        info!(
            session = %session,
            generation = self.generation,
            items = self.items.len(),
            unread = self.items.unread_count(),
            scrollable = container.is_scrollable(),
            "Read tracker mounted"
        );
    }

    /// Replaces the whole list, e.g. after a filter change.
    ///
    /// Ledger, pending set, registrations and activation are reset before
    /// this returns, so no id from the old list can be committed afterwards
    /// unless it was already in flight.
    pub fn replace_items(&mut self, items: Vec<Item>, container: Container) {
        debug!(pending = self.queue.pending().len(), "List replaced, resetting tracker");
        self.mount(items, container);
    }

    /// Adds the next page of items. Returns the ids that were new.
    ///
    /// Items that arrive already read stop being observed and leave the
    /// pending set.
    pub fn append_items(&mut self, items: Vec<Item>) -> Vec<ItemId> {
        if !self.is_mounted() {
            return Vec::new();
        }

        let updated: Vec<ItemId> = items
            .iter()
            .filter(|item| item.is_read())
            .map(|item| item.id.clone())
            .collect();
        let added = self.items.append(items);

        for id in &updated {
            self.forget(id);
            self.queue.remove(id);
        }

        self.activation
            .set_has_items(!self.items.is_empty(), self.clock.now());
        debug!(added = added.len(), total = self.items.len(), "Items appended");
        added
    }

    /// Tears everything down. Late commit results are ignored afterwards.
    pub fn dispose(&mut self) {
        if let Some(session) = self.session {
            info!(
                session = %session,
                pending = self.queue.pending().len(),
                in_flight = self.queue.in_flight(),
                "Read tracker disposed"
            );
        }
        self.reset();
        self.items = FeedItems::default();
        self.session = None;
    }

    /// Registers a rendered node for an item.
    ///
    /// Only unread items of the current list are observed; a missing node is
    /// a no-op. Returns true if the item is now observed.
    pub fn register(&mut self, id: ItemId, node: Option<NodeRect>) -> bool {
        if !self.is_unread(&id) {
            return false;
        }
        let observed_id = id.clone();
        if let Some(event) = self.monitor.observe(id, node) {
            self.on_visibility_change(event);
        }
        self.monitor.is_observed(&observed_id)
    }

    /// Stops observing an item's node, e.g. when the renderer recycles it.
    pub fn unregister(&mut self, id: &ItemId) {
        self.forget(id);
    }

    /// Feeds new node positions through the visibility monitor.
    pub fn on_layout(&mut self, nodes: &[(ItemId, NodeRect)]) {
        for (id, rect) in nodes {
            if let Some(event) = self.monitor.reposition(id, *rect) {
                self.on_visibility_change(event);
            }
        }
    }

    /// Classifies one visibility transition and queues a candidate if the
    /// item was scrolled past.
    pub fn on_visibility_change(&mut self, event: VisibilityEvent) -> Classification {
        let status = match self.items.get(&event.id) {
            None => ItemStatus::Missing,
            Some(item) if item.is_read() => ItemStatus::Read,
            Some(_) => ItemStatus::Unread,
        };

        let classification = classify(&event, self.activation.state(), status, &mut self.ledger);
        trace!(id = %event.id, intersecting = event.is_intersecting, top = event.bounding_top, result = ?classification, "Visibility transition");

        match classification {
            Classification::Candidate => {
                self.queue.mark_candidate(event.id, self.clock.now());
            }
            Classification::AlreadyRead | Classification::Unknown => {
                self.monitor.unobserve(&event.id);
            }
            _ => {}
        }
        classification
    }

    /// Handles a scroll event on the feed container.
    pub fn on_scroll(&mut self) -> Option<ActivationTrigger> {
        let trigger = self.activation.on_scroll();
        if trigger.is_some() {
            self.record_visible();
        }
        trigger
    }

    /// Handles a viewport resize.
    pub fn on_resize(&mut self, container: Container) {
        self.monitor.set_container(container);
        self.activation.on_resize(container, self.clock.now());
    }

    /// Updates container geometry without treating it as a resize, e.g.
    /// after more items were rendered.
    pub fn update_container(&mut self, container: Container) {
        self.monitor.set_container(container);
        self.activation.set_container(container);
    }

    /// Fires every timer that is due.
    pub fn tick(&mut self) -> Tick {
        if !self.is_mounted() {
            return Tick::default();
        }

        let now = self.clock.now();
        let activated = self.activation.tick(now);
        if activated.is_some() {
            self.record_visible();
        }
        let batch = self.queue.take_due(now).map(|ids| CommitBatch {
            generation: self.generation,
            ids,
        });

        Tick { activated, batch }
    }

    /// Applies the result of a batch commit.
    pub fn on_commit_result<E: Display>(&mut self, batch: CommitBatch, result: Result<(), E>) -> CommitOutcome {
        if !self.is_mounted() {
            debug!(ids = batch.ids.len(), "Commit settled after dispose, ignoring");
            return CommitOutcome::Discarded(DiscardReason::Unmounted);
        }

        let current = batch.generation == self.generation;

        match result {
            Ok(()) => {
                if current {
                    self.queue.complete_success();
                }
                let viewed_at = self.clock.wall();
                for id in &batch.ids {
                    self.items.mark_viewed(id, viewed_at);
                    self.forget(id);
                    self.queue.remove(id);
                }
                info!(ids = batch.ids.len(), generation = batch.generation, "Read batch committed");
                CommitOutcome::Committed {
                    ids: batch.ids,
                    viewed_at,
                }
            }
            Err(err) if !current => {
                debug!(error = %err, ids = batch.ids.len(), "Commit from replaced list failed, dropping");
                CommitOutcome::Discarded(DiscardReason::StaleGeneration)
            }
            Err(err) => {
                let ids: Vec<ItemId> = batch
                    .ids
                    .into_iter()
                    .filter(|id| self.is_unread(id))
                    .collect();
                let retry = self.queue.complete_failure(ids.clone(), self.clock.now());

                if retry.alert {
                    error!(
                        error = %err,
                        ids = ids.len(),
                        attempt = retry.attempt,
                        retry_in_ms = retry.retry_in.as_millis(),
                        "Read commits keep failing"
                    );
                } else {
                    warn!(
                        error = %err,
                        ids = ids.len(),
                        attempt = retry.attempt,
                        retry_in_ms = retry.retry_in.as_millis(),
                        "Read commit failed, will retry"
                    );
                }
                CommitOutcome::Requeued { ids, retry }
            }
        }
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.is_mounted() {
            return None;
        }
        match (self.activation.next_deadline(), self.queue.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.session
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn activation_state(&self) -> ActivationState {
        self.activation.state()
    }

    #[must_use]
    pub fn items(&self) -> &[Item] {
        self.items.as_slice()
    }

    #[must_use]
    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    #[must_use]
    pub fn pending(&self) -> &[ItemId] {
        self.queue.pending()
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.queue.in_flight()
    }

    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    #[must_use]
    pub fn is_observed(&self, id: &ItemId) -> bool {
        self.monitor.is_observed(id)
    }

    #[must_use]
    pub fn observed_count(&self) -> usize {
        self.monitor.observed_count()
    }

    #[must_use]
    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    fn is_unread(&self, id: &ItemId) -> bool {
        self.items.get(id).is_some_and(|item| !item.is_read())
    }

    /// Feeds nodes already in view through the classifier so their entry
    /// positions are known when they later leave.
    fn record_visible(&mut self) {
        let visible = self.monitor.visible();
        debug!(visible = visible.len(), "Recording nodes in view at activation");
        for event in visible {
            self.on_visibility_change(event);
        }
    }

    fn forget(&mut self, id: &ItemId) {
        self.monitor.unobserve(id);
        self.ledger.remove(id);
    }

    fn reset(&mut self) {
        self.monitor.disconnect();
        self.ledger.clear();
        self.activation.teardown();
        self.queue = ReadCommitQueue::new(self.settings.commit_debounce, self.settings.retry.clone());
    }
}
