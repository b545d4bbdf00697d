//! Direction classifier and candidate selector.
//!
//! Decides whether an item's exit from the viewport means the user scrolled
//! down past it (a read candidate) or scrolled back up and revealed content
//! above it (not a candidate). Only the former ever reaches the commit queue.

use crate::ledger::PositionLedger;
use crate::types::{ActivationState, VisibilityEvent};

/// Result of classifying one visibility transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Tracking is not active; the event was dropped.
    Inactive,
    /// The item is unknown to the current list.
    Unknown,
    /// The item is already read; any stale ledger entry was dropped.
    AlreadyRead,
    /// The item entered the viewport and its position was recorded.
    Recorded,
    /// The item exited without a recorded entry position.
    Unrecorded,
    /// The item exited downward or stayed put: scrolled back, not read.
    NotPassed,
    /// The item moved upward out of the viewport: scrolled past.
    Candidate,
}

/// Read state of the item an event refers to, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Missing,
    Unread,
    Read,
}

/// Classifies a single visibility transition, updating the ledger.
///
/// Each exit consumes the ledger entry regardless of the outcome, so a given
/// entry is classified at most once.
pub fn classify(
    event: &VisibilityEvent,
    state: ActivationState,
    status: ItemStatus,
    ledger: &mut PositionLedger,
) -> Classification {
    if state != ActivationState::Active {
        return Classification::Inactive;
    }

    match status {
        ItemStatus::Missing => {
            ledger.remove(&event.id);
            return Classification::Unknown;
        }
        ItemStatus::Read => {
            ledger.remove(&event.id);
            return Classification::AlreadyRead;
        }
        ItemStatus::Unread => {}
    }

    if event.is_intersecting {
        ledger.record(event.id.clone(), event.bounding_top);
        return Classification::Recorded;
    }

    match ledger.take(&event.id) {
        None => Classification::Unrecorded,
        Some(previous_top) if event.bounding_top < previous_top => Classification::Candidate,
        Some(_) => Classification::NotPassed,
    }
}
