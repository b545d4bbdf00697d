//! Timed session scripts for driving a tracker outside a real UI.
//!
//! A script is a JSONL file, one host event per line, each stamped with its
//! offset from the start of the session:
//!
//! ```text
//! # a short feed that fits on screen
//! {"at_ms": 0, "type": "mount", "items": [{"id": "a", "view_count": 0}], "container": {"client_height": 800, "scroll_height": 400}}
//! {"at_ms": 0, "type": "register", "id": "a", "node": {"top": 120, "height": 90}}
//! {"at_ms": 3500, "type": "layout", "nodes": [{"id": "a", "top": -40, "height": 90}]}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Offsets must not
//! decrease.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::error::Result;
use crate::runtime::{TrackerCommand, TrackerHandle};
use crate::types::{Container, Item, ItemId, NodeRect, VisibilityEvent};

/// Errors that can occur while loading a script.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid step on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("step on line {line} at {at_ms}ms comes before the previous step at {previous_ms}ms")]
    OutOfOrder {
        line: usize,
        at_ms: u64,
        previous_ms: u64,
    },
}

/// One timed host event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: ReplayAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayoutNode {
    pub id: ItemId,
    pub top: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayAction {
    Mount { items: Vec<Item>, container: Container },
    Replace { items: Vec<Item>, container: Container },
    Append { items: Vec<Item> },
    Register { id: ItemId, node: Option<NodeRect> },
    Unregister { id: ItemId },
    Layout { nodes: Vec<LayoutNode> },
    Visibility(VisibilityEvent),
    Scroll,
    Resize { container: Container },
    Dispose,
}

impl From<ReplayAction> for TrackerCommand {
    fn from(action: ReplayAction) -> Self {
        match action {
            ReplayAction::Mount { items, container } => Self::Mount { items, container },
            ReplayAction::Replace { items, container } => Self::ReplaceItems { items, container },
            ReplayAction::Append { items } => Self::AppendItems(items),
            ReplayAction::Register { id, node } => Self::Register { id, node },
            ReplayAction::Unregister { id } => Self::Unregister(id),
            ReplayAction::Layout { nodes } => Self::Layout(
                nodes
                    .into_iter()
                    .map(|node| (node.id, NodeRect::new(node.top, node.height)))
                    .collect(),
            ),
            ReplayAction::Visibility(event) => Self::Visibility(event),
            ReplayAction::Scroll => Self::Scroll,
            ReplayAction::Resize { container } => Self::Resize(container),
            ReplayAction::Dispose => Self::Dispose,
        }
    }
}

/// Parses a script from any buffered reader.
///
/// # Errors
///
/// Returns `ReplayError::Parse` with the 1-based line number of the first
/// invalid step, or `ReplayError::OutOfOrder` if offsets decrease.
pub fn parse_script<R: BufRead>(reader: R) -> std::result::Result<Vec<ReplayStep>, ReplayError> {
    let mut steps = Vec::new();
    let mut previous_ms = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let number = index + 1;
        let step: ReplayStep = serde_json::from_str(trimmed).map_err(|source| ReplayError::Parse {
            line: number,
            source,
        })?;

        if step.at_ms < previous_ms {
            return Err(ReplayError::OutOfOrder {
                line: number,
                at_ms: step.at_ms,
                previous_ms,
            });
        }
        previous_ms = step.at_ms;
        steps.push(step);
    }

    Ok(steps)
}

/// Loads a script from a file.
///
/// # Errors
///
/// See [`parse_script`]; also fails if the file cannot be opened.
pub fn load_script(path: &Path) -> std::result::Result<Vec<ReplayStep>, ReplayError> {
    let file = File::open(path)?;
    parse_script(BufReader::new(file))
}

/// Plays `steps` into a running tracker, honouring their offsets.
///
/// Returns the number of steps sent.
///
/// # Errors
///
/// Returns `TrackerError::Stopped` if the tracker task ends mid-script.
pub async fn play(handle: &TrackerHandle, steps: Vec<ReplayStep>) -> Result<usize> {
    let start = Instant::now();
    let mut sent = 0;

    for step in steps {
        sleep_until(start + Duration::from_millis(step.at_ms)).await;
        debug!(at_ms = step.at_ms, action = ?step.action, "Replaying step");
        handle.send(step.action.into()).await?;
        sent += 1;
    }

    Ok(sent)
}
