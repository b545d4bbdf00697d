//! Async driver for the read tracker.
//!
//! [`spawn`] moves a [`ReadTracker`] onto a tokio task and returns a
//! [`TrackerHandle`] for feeding it host events. The task loop waits on three
//! things at once:
//!
//! 1. Commands from the handle (visibility, scroll, resize, list changes)
//! 2. Completions of spawned commit and stats requests
//! 3. The engine's next timer deadline
//!
//! After each wake-up it fires whatever timers are due. Batch commits and
//! stats refreshes run as separate tasks, so an in-flight request never holds
//! up event handling and new candidates keep queueing behind it.
//!
//! Notifications are sent without waiting. If the receiver falls behind, the
//! loop drops notifications rather than stalling event handling.
//!
//! Closing the handle disposes the engine and ends the loop. Requests still in
//! flight then complete into a closed channel and are ignored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::api::{ApiError, ContentApi};
use crate::config::TrackerSettings;
use crate::engine::{CommitBatch, CommitOutcome, ReadTracker};
use crate::error::{Result, TrackerError};
use crate::types::{ActivationTrigger, Container, ContentStats, Item, ItemId, NodeRect, VisibilityEvent};

/// Capacity of the command channel.
const COMMAND_CHANNEL_SIZE: usize = 256;

/// Host events forwarded to the tracker task.
#[derive(Debug, Clone)]
pub enum TrackerCommand {
    Mount { items: Vec<Item>, container: Container },
    ReplaceItems { items: Vec<Item>, container: Container },
    AppendItems(Vec<Item>),
    Register { id: ItemId, node: Option<NodeRect> },
    Unregister(ItemId),
    Layout(Vec<(ItemId, NodeRect)>),
    Visibility(VisibilityEvent),
    Scroll,
    Resize(Container),
    UpdateContainer(Container),
    Dispose,
}

/// Things the surrounding view may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerNotification {
    /// Tracking became active.
    Activated(ActivationTrigger),
    /// A batch was confirmed and applied locally.
    Committed {
        ids: Vec<ItemId>,
        viewed_at: DateTime<Utc>,
    },
    /// A batch failed and will be retried.
    CommitFailed {
        ids: Vec<ItemId>,
        attempt: u32,
        retry_in_ms: u64,
    },
    /// Aggregate counts were refreshed after a commit.
    StatsRefreshed(ContentStats),
}

enum Completion {
    Commit(CommitBatch, std::result::Result<(), ApiError>),
    Stats(std::result::Result<ContentStats, ApiError>),
}

/// Handle to a running tracker task.
#[derive(Debug)]
pub struct TrackerHandle {
    commands: mpsc::Sender<TrackerCommand>,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    /// Sends a command to the tracker task.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Stopped` if the task has ended.
    pub async fn send(&self, command: TrackerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TrackerError::Stopped)
    }

    pub async fn mount(&self, items: Vec<Item>, container: Container) -> Result<()> {
        self.send(TrackerCommand::Mount { items, container }).await
    }

    pub async fn replace_items(&self, items: Vec<Item>, container: Container) -> Result<()> {
        self.send(TrackerCommand::ReplaceItems { items, container }).await
    }

    pub async fn append_items(&self, items: Vec<Item>) -> Result<()> {
        self.send(TrackerCommand::AppendItems(items)).await
    }

    pub async fn register(&self, id: ItemId, node: Option<NodeRect>) -> Result<()> {
        self.send(TrackerCommand::Register { id, node }).await
    }

    pub async fn layout(&self, nodes: Vec<(ItemId, NodeRect)>) -> Result<()> {
        self.send(TrackerCommand::Layout(nodes)).await
    }

    pub async fn visibility(&self, event: VisibilityEvent) -> Result<()> {
        self.send(TrackerCommand::Visibility(event)).await
    }

    pub async fn scroll(&self) -> Result<()> {
        self.send(TrackerCommand::Scroll).await
    }

    pub async fn resize(&self, container: Container) -> Result<()> {
        self.send(TrackerCommand::Resize(container)).await
    }

    pub async fn dispose(&self) -> Result<()> {
        self.send(TrackerCommand::Dispose).await
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Closes the command channel and waits for the task to finish.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Tracker task ended abnormally");
        }
    }
}

/// Spawns a tracker task using `api` for commits and stats.
#[must_use]
pub fn spawn<A: ContentApi>(
    settings: TrackerSettings,
    api: Arc<A>,
    notifications: mpsc::Sender<TrackerNotification>,
) -> TrackerHandle {
    let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let tracker = ReadTracker::new(settings);

    let task = tokio::spawn(async move {
        run_tracker_loop(tracker, api, command_rx, notifications).await;
    });

    TrackerHandle { commands, task }
}

async fn run_tracker_loop<A: ContentApi>(
    mut tracker: ReadTracker,
    api: Arc<A>,
    mut commands: mpsc::Receiver<TrackerCommand>,
    notifications: mpsc::Sender<TrackerNotification>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

    debug!("Starting tracker loop");

    loop {
        let deadline = tracker.next_deadline();

        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(command) => {
                        if let Some(trigger) = apply_command(&mut tracker, command) {
                            notify(&notifications, TrackerNotification::Activated(trigger));
                        }
                    }
                    None => {
                        debug!("Command channel closed, disposing tracker");
                        tracker.dispose();
                        break;
                    }
                }
            }

            Some(done) = done_rx.recv() => {
                handle_completion(&mut tracker, &api, &done_tx, &notifications, done);
            }

            _ = wait_until(deadline) => {}
        }

        let tick = tracker.tick();
        if let Some(trigger) = tick.activated {
            notify(&notifications, TrackerNotification::Activated(trigger));
        }
        if let Some(batch) = tick.batch {
            spawn_commit(&api, &done_tx, batch);
        }
    }

    debug!("Tracker loop terminated");
}

fn apply_command(tracker: &mut ReadTracker, command: TrackerCommand) -> Option<ActivationTrigger> {
    match command {
        TrackerCommand::Mount { items, container } => tracker.mount(items, container),
        TrackerCommand::ReplaceItems { items, container } => tracker.replace_items(items, container),
        TrackerCommand::AppendItems(items) => {
            tracker.append_items(items);
        }
        TrackerCommand::Register { id, node } => {
            tracker.register(id, node);
        }
        TrackerCommand::Unregister(id) => tracker.unregister(&id),
        TrackerCommand::Layout(nodes) => tracker.on_layout(&nodes),
        TrackerCommand::Visibility(event) => {
            tracker.on_visibility_change(event);
        }
        TrackerCommand::Scroll => return tracker.on_scroll(),
        TrackerCommand::Resize(container) => tracker.on_resize(container),
        TrackerCommand::UpdateContainer(container) => tracker.update_container(container),
        TrackerCommand::Dispose => tracker.dispose(),
    }
    None
}

fn handle_completion<A: ContentApi>(
    tracker: &mut ReadTracker,
    api: &Arc<A>,
    done_tx: &mpsc::UnboundedSender<Completion>,
    notifications: &mpsc::Sender<TrackerNotification>,
    done: Completion,
) {
    match done {
        Completion::Commit(batch, result) => match tracker.on_commit_result(batch, result) {
            CommitOutcome::Committed { ids, viewed_at } => {
                spawn_stats_refresh(api, done_tx);
                notify(notifications, TrackerNotification::Committed { ids, viewed_at });
            }
            CommitOutcome::Requeued { ids, retry } => {
                let retry_in_ms = u64::try_from(retry.retry_in.as_millis()).unwrap_or(u64::MAX);
                notify(
                    notifications,
                    TrackerNotification::CommitFailed {
                        ids,
                        attempt: retry.attempt,
                        retry_in_ms,
                    },
                );
            }
            CommitOutcome::Discarded(reason) => {
                debug!(reason = ?reason, "Commit result discarded");
            }
        },
        Completion::Stats(Ok(stats)) => {
            debug!(total = stats.total, unread = stats.unread, read = stats.read, "Stats refreshed");
            notify(notifications, TrackerNotification::StatsRefreshed(stats));
        }
        Completion::Stats(Err(e)) => {
            warn!(error = %e, "Stats refresh failed, keeping stale counts");
        }
    }
}

fn spawn_commit<A: ContentApi>(api: &Arc<A>, done_tx: &mpsc::UnboundedSender<Completion>, batch: CommitBatch) {
    let api = Arc::clone(api);
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let result = api.mark_read(&batch.ids).await;
        // The loop may be gone by now; its result no longer matters then.
        let _ = done_tx.send(Completion::Commit(batch, result));
    });
}

fn spawn_stats_refresh<A: ContentApi>(api: &Arc<A>, done_tx: &mpsc::UnboundedSender<Completion>) {
    let api = Arc::clone(api);
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let result = api.fetch_stats().await;
        let _ = done_tx.send(Completion::Stats(result));
    });
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn notify(notifications: &mpsc::Sender<TrackerNotification>, notification: TrackerNotification) {
    match notifications.try_send(notification) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            warn!(notification = ?dropped, "Notification receiver is full, dropping notification");
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Notification receiver dropped");
        }
    }
}
