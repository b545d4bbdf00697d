//! Core types shared across the read-tracking engine.
//!
//! Items arrive from the list renderer in the backend's wire shape
//! (`snake_case` fields), so everything here derives `Serialize` and
//! `Deserialize` for use in the HTTP client and the replay scripts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable identity of a content item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates an id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A content item as handed to the engine by the list renderer.
///
/// `view_count` is the read marker: `0` means unread. The engine only ever
/// writes `view_count` and `last_viewed_at`, and only after a confirmed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,

    #[serde(default)]
    pub view_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Creates an unread item.
    #[must_use]
    pub fn unread(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            view_count: 0,
            last_viewed_at: None,
        }
    }

    /// Returns true if the item has been viewed at least once.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.view_count > 0
    }

    /// Applies a confirmed commit: flips the read marker and stamps the view time.
    pub fn mark_viewed(&mut self, at: DateTime<Utc>) {
        self.view_count = self.view_count.max(1);
        self.last_viewed_at = Some(at);
    }
}

/// A single intersection transition reported for an observed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityEvent {
    pub id: ItemId,
    pub is_intersecting: bool,
    /// Top edge of the item in screen coordinates at the moment of transition.
    pub bounding_top: f64,
}

impl VisibilityEvent {
    #[must_use]
    pub fn entered(id: impl Into<ItemId>, bounding_top: f64) -> Self {
        Self {
            id: id.into(),
            is_intersecting: true,
            bounding_top,
        }
    }

    #[must_use]
    pub fn exited(id: impl Into<ItemId>, bounding_top: f64) -> Self {
        Self {
            id: id.into(),
            is_intersecting: false,
            bounding_top,
        }
    }
}

/// Screen-space vertical extent of an item's node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeRect {
    pub top: f64,
    pub height: f64,
}

impl NodeRect {
    #[must_use]
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Geometry of the scrolling container that holds the feed.
///
/// `viewport_top` is the screen-space top edge of the visible area,
/// `client_height` its visible height and `scroll_height` the full height
/// of its content.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub viewport_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl Container {
    #[must_use]
    pub fn new(viewport_top: f64, client_height: f64, scroll_height: f64) -> Self {
        Self {
            viewport_top,
            client_height,
            scroll_height,
        }
    }

    /// Returns true if the content is taller than the visible area.
    #[must_use]
    pub fn is_scrollable(&self) -> bool {
        self.scroll_height > self.client_height
    }

    #[must_use]
    pub fn viewport_bottom(&self) -> f64 {
        self.viewport_top + self.client_height
    }
}

/// Activation state of the tracking pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    /// Torn down or not yet mounted.
    Idle,
    /// Mounted, waiting for the first scroll or the auto-activation timer.
    WaitingForScroll,
    /// Visibility events are being classified.
    Active,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::WaitingForScroll => write!(f, "waiting_for_scroll"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// What caused the engine to activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationTrigger {
    Scroll,
    Timeout,
}

/// Aggregate read counts returned by the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentStats {
    pub total: u64,
    pub unread: u64,
    pub read: u64,
}
