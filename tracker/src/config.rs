//! Configuration for the Feedmark tracker.
//!
//! Engine timings live in [`TrackerSettings`], which has sensible defaults and
//! can be built in code. [`Config::from_env`] adds the backend connection and
//! lets every timing be overridden from the environment.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `FEEDMARK_API_URL` | Yes | - | Backend base URL (e.g., `http://localhost:8000`) |
//! | `FEEDMARK_API_KEY` | No | - | Sent as the `X-API-Key` header |
//! | `FEEDMARK_COMMIT_DEBOUNCE_MS` | No | 500 | Quiet period before a read batch is committed |
//! | `FEEDMARK_ACTIVATION_DELAY_MS` | No | 3000 | Auto-activation delay for lists that cannot scroll |
//! | `FEEDMARK_RESIZE_DEBOUNCE_MS` | No | 300 | Resize settle time before re-checking scrollability |
//! | `FEEDMARK_TOP_MARGIN_PX` | No | 100 | Top inset of the observed viewport |
//! | `FEEDMARK_RETRY_MAX_DELAY_MS` | No | 30000 | Backoff ceiling for failed commits |
//! | `FEEDMARK_RETRY_ALERT_AFTER` | No | 10 | Consecutive failures before escalating (0 disables) |
//!
//! # Example
//!
//! ```no_run
//! use feedmark_tracker::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("API URL: {}", config.api_url);
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::activation::{DEFAULT_ACTIVATION_DELAY_MS, DEFAULT_RESIZE_DEBOUNCE_MS};
use crate::commit_queue::{
    RetryPolicy, DEFAULT_COMMIT_DEBOUNCE_MS, DEFAULT_RETRY_ALERT_AFTER, DEFAULT_RETRY_MAX_DELAY_MS,
};
use crate::visibility::DEFAULT_TOP_MARGIN_PX;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Timing and geometry parameters of the read-tracking engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    /// Quiet period after the last candidate before a batch is committed.
    pub commit_debounce: Duration,

    /// Delay before a list that cannot scroll is activated automatically.
    pub activation_delay: Duration,

    /// Settle time after the last resize before scrollability is re-checked.
    pub resize_debounce: Duration,

    /// Top inset of the observed viewport in pixels.
    pub top_margin_px: f64,

    /// Backoff applied to failed commit batches.
    pub retry: RetryPolicy,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            commit_debounce: Duration::from_millis(DEFAULT_COMMIT_DEBOUNCE_MS),
            activation_delay: Duration::from_millis(DEFAULT_ACTIVATION_DELAY_MS),
            resize_debounce: Duration::from_millis(DEFAULT_RESIZE_DEBOUNCE_MS),
            top_margin_px: DEFAULT_TOP_MARGIN_PX,
            retry: RetryPolicy::default(),
        }
    }
}

impl TrackerSettings {
    /// Reads engine timings from the environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but cannot be
    /// parsed, or if `FEEDMARK_TOP_MARGIN_PX` is negative.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = TrackerSettings::default();

        let commit_debounce = parse_millis("FEEDMARK_COMMIT_DEBOUNCE_MS")?
            .unwrap_or(defaults.commit_debounce);
        let activation_delay = parse_millis("FEEDMARK_ACTIVATION_DELAY_MS")?
            .unwrap_or(defaults.activation_delay);
        let resize_debounce = parse_millis("FEEDMARK_RESIZE_DEBOUNCE_MS")?
            .unwrap_or(defaults.resize_debounce);

        let top_margin_px = match parse_var::<f64>("FEEDMARK_TOP_MARGIN_PX", "number of pixels")? {
            Some(px) if !px.is_finite() || px < 0.0 => {
                return Err(ConfigError::InvalidValue {
                    key: "FEEDMARK_TOP_MARGIN_PX".to_string(),
                    message: format!("margin must be a non-negative number, got {px}"),
                });
            }
            Some(px) => px,
            None => defaults.top_margin_px,
        };

        let max_delay = parse_millis("FEEDMARK_RETRY_MAX_DELAY_MS")?
            .unwrap_or(Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS));
        let alert_after = match parse_var::<u32>("FEEDMARK_RETRY_ALERT_AFTER", "non-negative integer")? {
            Some(0) => None,
            Some(n) => Some(n),
            None => Some(DEFAULT_RETRY_ALERT_AFTER),
        };

        // Retries start at the debounce window and never wait less than it.
        let retry = RetryPolicy {
            initial_delay: commit_debounce,
            max_delay: max_delay.max(commit_debounce),
            alert_after,
            ..defaults.retry
        };

        Ok(Self {
            commit_debounce,
            activation_delay,
            resize_debounce,
            top_margin_px,
            retry,
        })
    }
}

/// Configuration for the Feedmark tracker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL.
    pub api_url: String,

    /// Optional API key for the backend.
    pub api_key: Option<String>,

    /// Engine settings.
    pub settings: TrackerSettings,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `FEEDMARK_API_URL` is not set or empty
    /// - any numeric variable is set but cannot be parsed
    /// - `FEEDMARK_TOP_MARGIN_PX` is negative
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("FEEDMARK_API_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("FEEDMARK_API_URL".to_string()))?;

        let api_key = env::var("FEEDMARK_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            api_url,
            api_key,
            settings: TrackerSettings::from_env()?,
        })
    }
}

fn parse_var<T: FromStr>(key: &str, expected: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected {expected}, got '{val}'"),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_millis(key: &str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_var::<u64>(key, "milliseconds as a non-negative integer")?.map(Duration::from_millis))
}
