//! Error types for the Feedmark tracker.
//!
//! None of these ever reach the end user of the feed: read tracking is
//! best-effort, and the engine logs and recovers from every failure it sees.
//! They exist for the CLI and for callers embedding the HTTP client.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::replay::ReplayError;

/// Errors that can occur during tracker operations.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Backend API error.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Replay script error.
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// The tracker task has stopped and no longer accepts commands.
    #[error("tracker task is not running")]
    Stopped,
}

/// A specialized `Result` type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
