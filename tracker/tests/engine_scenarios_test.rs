//! Scenario tests for the read-tracking engine.
//!
//! These drive a `ReadTracker` with a manual clock through whole sessions:
//! activation, scrolling items out of view, debounced commits, and failures.

use std::time::Duration;

use feedmark_tracker::classifier::Classification;
use feedmark_tracker::clock::{Clock, ManualClock};
use feedmark_tracker::commit_queue::RetryPolicy;
use feedmark_tracker::config::TrackerSettings;
use feedmark_tracker::engine::{CommitBatch, CommitOutcome, ReadTracker};
use feedmark_tracker::types::{ActivationState, ActivationTrigger, Container, Item, ItemId, NodeRect, VisibilityEvent};

// =============================================================================
// Test Helpers
// =============================================================================

fn settings() -> TrackerSettings {
    TrackerSettings {
        retry: RetryPolicy::fixed(Duration::from_millis(500)),
        ..TrackerSettings::default()
    }
}

fn new_tracker() -> (ReadTracker<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    (ReadTracker::with_clock(settings(), clock.clone()), clock)
}

fn scrollable() -> Container {
    Container::new(0.0, 800.0, 3000.0)
}

fn fits_on_screen() -> Container {
    Container::new(0.0, 800.0, 600.0)
}

fn ids(raw: &[&str]) -> Vec<ItemId> {
    raw.iter().map(|id| ItemId::new(*id)).collect()
}

/// Mounts `items` on a scrollable container and activates by scrolling.
fn active_tracker(items: &[&str]) -> (ReadTracker<ManualClock>, ManualClock) {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(items.iter().map(|id| Item::unread(*id)).collect(), scrollable());
    assert_eq!(tracker.on_scroll(), Some(ActivationTrigger::Scroll));
    (tracker, clock)
}

/// Sends an item up and out of the viewport.
fn scroll_past(tracker: &mut ReadTracker<ManualClock>, id: &str) {
    tracker.on_visibility_change(VisibilityEvent::entered(id, 50.0));
    assert_eq!(
        tracker.on_visibility_change(VisibilityEvent::exited(id, -80.0)),
        Classification::Candidate
    );
}

fn flush(tracker: &mut ReadTracker<ManualClock>, clock: &ManualClock) -> CommitBatch {
    clock.advance_ms(500);
    tracker.tick().batch.expect("a batch should be due")
}

// =============================================================================
// Direction
// =============================================================================

#[test]
fn test_item_scrolled_past_is_committed() {
    let (mut tracker, clock) = active_tracker(&["a"]);
    scroll_past(&mut tracker, "a");

    clock.advance_ms(499);
    assert!(tracker.tick().batch.is_none());

    clock.advance_ms(1);
    let batch = tracker.tick().batch.unwrap();
    assert_eq!(batch.ids, ids(&["a"]));

    let outcome = tracker.on_commit_result(batch, Ok::<(), String>(()));
    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
    let item = tracker.item(&"a".into()).unwrap();
    assert!(item.is_read());
    assert_eq!(item.last_viewed_at, Some(clock.wall()));
}

#[test]
fn test_item_exiting_downward_is_never_queued() {
    let (mut tracker, clock) = active_tracker(&["b"]);
    tracker.on_visibility_change(VisibilityEvent::entered("b", 40.0));
    let result = tracker.on_visibility_change(VisibilityEvent::exited("b", 120.0));

    assert_eq!(result, Classification::NotPassed);
    assert!(tracker.pending().is_empty());
    clock.advance_ms(5000);
    assert!(tracker.tick().batch.is_none());
}

#[test]
fn test_exit_at_same_position_is_not_a_candidate() {
    let (mut tracker, _) = active_tracker(&["a"]);
    tracker.on_visibility_change(VisibilityEvent::entered("a", 40.0));
    assert_eq!(
        tracker.on_visibility_change(VisibilityEvent::exited("a", 40.0)),
        Classification::NotPassed
    );
}

#[test]
fn test_last_entry_position_decides_direction() {
    let (mut tracker, _) = active_tracker(&["a"]);
    tracker.on_visibility_change(VisibilityEvent::entered("a", 300.0));
    tracker.on_visibility_change(VisibilityEvent::entered("a", -50.0));
    assert_eq!(
        tracker.on_visibility_change(VisibilityEvent::exited("a", -20.0)),
        Classification::NotPassed
    );
}

#[test]
fn test_exit_without_entry_is_ignored() {
    let (mut tracker, _) = active_tracker(&["a"]);
    assert_eq!(
        tracker.on_visibility_change(VisibilityEvent::exited("a", -200.0)),
        Classification::Unrecorded
    );
    assert!(tracker.pending().is_empty());
}

#[test]
fn test_second_exit_needs_a_new_entry() {
    let (mut tracker, _) = active_tracker(&["a"]);
    scroll_past(&mut tracker, "a");
    assert_eq!(tracker.ledger_len(), 0);
    assert_eq!(
        tracker.on_visibility_change(VisibilityEvent::exited("a", -300.0)),
        Classification::Unrecorded
    );
}

#[test]
fn test_layout_driven_scroll_produces_candidates() {
    let (mut tracker, clock) = active_tracker(&["a", "b"]);
    assert!(tracker.register("a".into(), Some(NodeRect::new(150.0, 100.0))));
    assert!(tracker.register("b".into(), Some(NodeRect::new(260.0, 100.0))));

    // Scroll down by 240px: "a" leaves through the top inset, "b" stays.
    tracker.on_layout(&[
        ("a".into(), NodeRect::new(-90.0, 100.0)),
        ("b".into(), NodeRect::new(20.0, 100.0)),
    ]);
    assert_eq!(tracker.pending(), ids(&["a"]).as_slice());

    let batch = flush(&mut tracker, &clock);
    assert_eq!(batch.ids, ids(&["a"]));
}

#[test]
fn test_unregistered_node_is_not_tracked() {
    let (mut tracker, _) = active_tracker(&["a"]);
    assert!(tracker.register("a".into(), Some(NodeRect::new(150.0, 100.0))));
    tracker.unregister(&"a".into());

    tracker.on_layout(&[("a".into(), NodeRect::new(-150.0, 100.0))]);
    assert!(tracker.pending().is_empty());
    assert!(!tracker.is_observed(&"a".into()));
}

#[test]
fn test_missing_node_is_a_noop() {
    let (mut tracker, _) = active_tracker(&["a"]);
    assert!(!tracker.register("a".into(), None));
    assert_eq!(tracker.observed_count(), 0);
}

// =============================================================================
// Queue
// =============================================================================

#[test]
fn test_duplicate_candidates_flush_once() {
    let (mut tracker, clock) = active_tracker(&["a"]);
    scroll_past(&mut tracker, "a");
    scroll_past(&mut tracker, "a");

    let batch = flush(&mut tracker, &clock);
    assert_eq!(batch.ids, ids(&["a"]));
}

#[test]
fn test_candidates_within_window_coalesce() {
    let (mut tracker, clock) = active_tracker(&["a", "b", "c"]);
    scroll_past(&mut tracker, "a");
    clock.advance_ms(300);
    scroll_past(&mut tracker, "b");
    clock.advance_ms(300);
    scroll_past(&mut tracker, "c");

    clock.advance_ms(499);
    assert!(tracker.tick().batch.is_none());
    clock.advance_ms(1);
    let batch = tracker.tick().batch.unwrap();
    assert_eq!(batch.ids, ids(&["a", "b", "c"]));

    clock.advance_ms(2000);
    assert!(tracker.tick().batch.is_none());
}

#[test]
fn test_candidates_separated_by_window_flush_separately() {
    let (mut tracker, clock) = active_tracker(&["a", "b"]);
    scroll_past(&mut tracker, "a");
    let first = flush(&mut tracker, &clock);

    scroll_past(&mut tracker, "b");
    let second = flush(&mut tracker, &clock);

    assert_eq!(first.ids, ids(&["a"]));
    assert_eq!(second.ids, ids(&["b"]));
    assert_eq!(tracker.in_flight(), 2);
}

#[test]
fn test_failed_batch_is_resubmitted_with_new_candidates() {
    let (mut tracker, clock) = active_tracker(&["a", "b", "c"]);
    scroll_past(&mut tracker, "a");
    scroll_past(&mut tracker, "b");
    let batch = flush(&mut tracker, &clock);
    assert_eq!(batch.ids, ids(&["a", "b"]));

    scroll_past(&mut tracker, "c");
    let outcome = tracker.on_commit_result(batch, Err("503 Service Unavailable"));
    let CommitOutcome::Requeued { ids: requeued, retry } = outcome else {
        panic!("expected requeue, got {outcome:?}");
    };
    assert_eq!(requeued, ids(&["a", "b"]));
    assert_eq!(retry.attempt, 1);
    assert_eq!(tracker.pending(), ids(&["a", "b", "c"]).as_slice());

    let retry_batch = flush(&mut tracker, &clock);
    assert_eq!(retry_batch.ids, ids(&["a", "b", "c"]));
    assert!(matches!(
        tracker.on_commit_result(retry_batch, Ok::<(), String>(())),
        CommitOutcome::Committed { .. }
    ));
    assert!(tracker.items().iter().all(Item::is_read));
}

#[test]
fn test_backoff_holds_back_new_candidates() {
    let clock = ManualClock::new();
    let settings = TrackerSettings {
        retry: RetryPolicy::exponential(Duration::from_millis(500), Duration::from_secs(30)),
        ..TrackerSettings::default()
    };
    let mut tracker = ReadTracker::with_clock(settings, clock.clone());
    tracker.mount(vec![Item::unread("a"), Item::unread("b")], scrollable());
    tracker.on_scroll();

    scroll_past(&mut tracker, "a");
    let batch = flush(&mut tracker, &clock);
    let CommitOutcome::Requeued { retry, .. } = tracker.on_commit_result(batch, Err("offline")) else {
        panic!("expected requeue");
    };
    assert_eq!(retry.retry_in, Duration::from_millis(500));

    let batch = flush(&mut tracker, &clock);
    let CommitOutcome::Requeued { retry, .. } = tracker.on_commit_result(batch, Err("offline")) else {
        panic!("expected requeue");
    };
    assert_eq!(retry.attempt, 2);
    assert_eq!(retry.retry_in, Duration::from_millis(1000));

    // A new candidate cannot pull the retry in.
    let now = clock.now();
    scroll_past(&mut tracker, "b");
    assert_eq!(tracker.next_deadline(), Some(now + Duration::from_millis(1000)));

    clock.advance_ms(999);
    assert!(tracker.tick().batch.is_none());
    clock.advance_ms(1);
    assert_eq!(tracker.tick().batch.unwrap().ids, ids(&["a", "b"]));
}

#[test]
fn test_candidate_during_successful_commit_waits_for_its_own_window() {
    let (mut tracker, clock) = active_tracker(&["a", "b"]);
    scroll_past(&mut tracker, "a");
    let batch = flush(&mut tracker, &clock);
    assert_eq!(batch.ids, ids(&["a"]));

    clock.advance_ms(100);
    scroll_past(&mut tracker, "b");
    assert!(matches!(
        tracker.on_commit_result(batch, Ok::<(), String>(())),
        CommitOutcome::Committed { .. }
    ));
    assert_eq!(tracker.pending(), ids(&["b"]).as_slice());

    clock.advance_ms(499);
    assert!(tracker.tick().batch.is_none());
    clock.advance_ms(1);
    assert_eq!(tracker.tick().batch.unwrap().ids, ids(&["b"]));
}

#[test]
fn test_ids_read_elsewhere_are_not_requeued() {
    let (mut tracker, clock) = active_tracker(&["a", "b"]);
    scroll_past(&mut tracker, "a");
    scroll_past(&mut tracker, "b");
    let batch = flush(&mut tracker, &clock);

    let mut read = Item::unread("b");
    read.view_count = 1;
    tracker.append_items(vec![read]);

    let outcome = tracker.on_commit_result(batch, Err("offline"));
    let CommitOutcome::Requeued { ids: requeued, .. } = outcome else {
        panic!("expected requeue, got {outcome:?}");
    };
    assert_eq!(requeued, ids(&["a"]));
}

// =============================================================================
// Activation
// =============================================================================

#[test]
fn test_events_before_activation_queue_nothing() {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(vec![Item::unread("a")], scrollable());
    assert_eq!(tracker.activation_state(), ActivationState::WaitingForScroll);

    tracker.on_visibility_change(VisibilityEvent::entered("a", 50.0));
    assert_eq!(
        tracker.on_visibility_change(VisibilityEvent::exited("a", -80.0)),
        Classification::Inactive
    );
    assert_eq!(tracker.ledger_len(), 0);
    clock.advance_ms(10_000);
    assert!(tracker.tick().batch.is_none());
}

#[test]
fn test_short_list_activates_after_delay() {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(vec![Item::unread("a")], fits_on_screen());

    clock.advance_ms(2999);
    assert_eq!(tracker.tick().activated, None);
    assert_eq!(tracker.activation_state(), ActivationState::WaitingForScroll);

    clock.advance_ms(1);
    assert_eq!(tracker.tick().activated, Some(ActivationTrigger::Timeout));
    assert_eq!(tracker.activation_state(), ActivationState::Active);
}

#[test]
fn test_scroll_activates_immediately_without_timer() {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(vec![Item::unread("a")], scrollable());
    assert!(tracker.next_deadline().is_none());

    assert_eq!(tracker.on_scroll(), Some(ActivationTrigger::Scroll));
    assert_eq!(tracker.activation_state(), ActivationState::Active);
    assert_eq!(tracker.on_scroll(), None);

    clock.advance_ms(5000);
    assert_eq!(tracker.tick().activated, None);
}

#[test]
fn test_resize_making_list_short_starts_timer() {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(vec![Item::unread("a")], scrollable());

    tracker.on_resize(fits_on_screen());
    clock.advance_ms(300);
    assert_eq!(tracker.tick().activated, None);

    clock.advance_ms(2999);
    assert_eq!(tracker.tick().activated, None);
    clock.advance_ms(1);
    assert_eq!(tracker.tick().activated, Some(ActivationTrigger::Timeout));
}

#[test]
fn test_list_becoming_scrollable_cancels_auto_activation() {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(vec![Item::unread("a")], fits_on_screen());

    clock.advance_ms(1000);
    tracker.on_resize(scrollable());
    clock.advance_ms(300);
    let _ = tracker.tick();

    clock.advance_ms(5000);
    assert_eq!(tracker.tick().activated, None);
    assert_eq!(tracker.on_scroll(), Some(ActivationTrigger::Scroll));
}

#[test]
fn test_empty_list_never_auto_activates() {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(Vec::new(), fits_on_screen());
    clock.advance_ms(10_000);
    assert_eq!(tracker.tick().activated, None);
    assert_eq!(tracker.activation_state(), ActivationState::WaitingForScroll);
}

#[test]
fn test_nodes_in_view_at_scroll_activation_are_recorded() {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(vec![Item::unread("a"), Item::unread("b")], scrollable());
    tracker.register("a".into(), Some(NodeRect::new(150.0, 100.0)));
    tracker.register("b".into(), Some(NodeRect::new(1200.0, 100.0)));
    assert_eq!(tracker.ledger_len(), 0);

    tracker.on_scroll();
    assert_eq!(tracker.ledger_len(), 1);

    tracker.on_layout(&[("a".into(), NodeRect::new(-120.0, 100.0))]);
    assert_eq!(tracker.pending(), ids(&["a"]).as_slice());
    assert_eq!(flush(&mut tracker, &clock).ids, ids(&["a"]));
}

#[test]
fn test_nodes_in_view_at_timeout_activation_are_recorded() {
    let (mut tracker, clock) = new_tracker();
    tracker.mount(vec![Item::unread("b")], fits_on_screen());
    tracker.register("b".into(), Some(NodeRect::new(150.0, 100.0)));

    clock.advance_ms(3000);
    assert_eq!(tracker.tick().activated, Some(ActivationTrigger::Timeout));
    assert_eq!(tracker.ledger_len(), 1);

    tracker.on_layout(&[("b".into(), NodeRect::new(-120.0, 100.0))]);
    assert_eq!(tracker.pending(), ids(&["b"]).as_slice());
}

#[test]
fn test_activation_uses_latest_position() {
    let (mut tracker, _) = new_tracker();
    tracker.mount(vec![Item::unread("a")], scrollable());
    tracker.register("a".into(), Some(NodeRect::new(150.0, 100.0)));
    tracker.on_layout(&[("a".into(), NodeRect::new(400.0, 100.0))]);

    tracker.on_scroll();

    // Recorded at 400, so leaving through the bottom is not a read.
    tracker.on_layout(&[("a".into(), NodeRect::new(900.0, 100.0))]);
    assert!(tracker.pending().is_empty());
    assert_eq!(tracker.ledger_len(), 0);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_replacing_list_drops_pending_and_reactivates() {
    let (mut tracker, clock) = active_tracker(&["a"]);
    scroll_past(&mut tracker, "a");

    tracker.replace_items(vec![Item::unread("x")], scrollable());
    assert!(tracker.pending().is_empty());
    assert_eq!(tracker.ledger_len(), 0);
    assert_eq!(tracker.activation_state(), ActivationState::WaitingForScroll);

    clock.advance_ms(1000);
    assert!(tracker.tick().batch.is_none());
}

#[test]
fn test_success_from_replaced_list_still_applies() {
    let (mut tracker, clock) = active_tracker(&["a"]);
    scroll_past(&mut tracker, "a");
    let batch = flush(&mut tracker, &clock);

    tracker.replace_items(vec![Item::unread("a"), Item::unread("b")], scrollable());
    let outcome = tracker.on_commit_result(batch, Ok::<(), String>(()));

    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
    assert!(tracker.item(&"a".into()).unwrap().is_read());
    assert!(!tracker.item(&"b".into()).unwrap().is_read());
}

#[test]
fn test_dispose_stops_everything() {
    let (mut tracker, clock) = active_tracker(&["a"]);
    tracker.register("a".into(), Some(NodeRect::new(150.0, 100.0)));
    scroll_past(&mut tracker, "a");

    tracker.dispose();
    assert!(!tracker.is_mounted());
    assert_eq!(tracker.observed_count(), 0);
    assert!(tracker.next_deadline().is_none());
    clock.advance_ms(1000);
    assert!(tracker.tick().batch.is_none());
}
