//! Feedmark Tracker - viewport-driven automatic read tracking.
//!
//! This crate decides, from scroll and visibility signals, which items of a
//! content feed the user has actually scrolled past, and commits those "read"
//! marks to the backend in debounced batches.
//!
//! # Overview
//!
//! - Items are observed while unread. Their last visible position is kept in
//!   a ledger.
//! - When an item leaves the viewport moving *upward*, the user scrolled past
//!   it and it becomes a read candidate. Leaving downward never counts.
//! - Candidates are committed in one batch after 500ms without new ones.
//!   Failed batches are re-queued and retried with backoff.
//! - Nothing is tracked until the user scrolls, or, for feeds too short to
//!   scroll, until a 3s grace period has passed.
//!
//! # Modules
//!
//! - [`types`]: Items, visibility events, container geometry
//! - [`ledger`]: Last known position of visible unread items
//! - [`visibility`]: Intersection transitions for registered nodes
//! - [`classifier`]: Scroll direction classification of exits
//! - [`commit_queue`]: Debounced batching with retry policy
//! - [`activation`]: Scroll- or timeout-driven activation state machine
//! - [`engine`]: [`ReadTracker`], the composed engine with its lifecycle
//! - [`runtime`]: Tokio task driving an engine against a [`ContentApi`]
//! - [`api`]: Backend client for batch commits and stats
//! - [`replay`]: Timed JSONL session scripts
//! - [`clock`]: Injected time sources
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types
//! - [`utils`]: Shared utilities (debouncing)

pub mod activation;
pub mod api;
pub mod classifier;
pub mod clock;
pub mod commit_queue;
pub mod config;
pub mod engine;
pub mod error;
pub mod items;
pub mod ledger;
pub mod replay;
pub mod runtime;
pub mod types;
pub mod utils;
pub mod visibility;

pub use activation::ActivationController;
pub use api::{ApiError, ContentApi, DryRunApi, HttpContentApi};
pub use classifier::Classification;
pub use clock::{Clock, ManualClock, TokioClock};
pub use commit_queue::{ReadCommitQueue, RetryPolicy};
pub use config::{Config, ConfigError, TrackerSettings};
pub use engine::{CommitBatch, CommitOutcome, ReadTracker};
pub use error::{Result, TrackerError};
pub use runtime::{TrackerCommand, TrackerHandle, TrackerNotification};
pub use types::{ActivationState, Container, ContentStats, Item, ItemId, NodeRect, VisibilityEvent};
