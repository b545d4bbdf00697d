//! Feedmark - read tracking driver.
//!
//! # Commands
//!
//! - `feedmark stats`: Print the backend's aggregate read counts
//! - `feedmark replay <script>`: Play a timed session script through the tracker
//!
//! # Environment Variables
//!
//! See the [`config`](feedmark_tracker::config) module for available options.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use feedmark_tracker::api::{ContentApi, DryRunApi, HttpContentApi};
use feedmark_tracker::config::{Config, TrackerSettings};
use feedmark_tracker::replay::{self, ReplayStep};
use feedmark_tracker::runtime::{self, TrackerNotification};
use feedmark_tracker::types::ItemId;

/// Notification channel capacity.
const NOTIFICATION_CHANNEL_SIZE: usize = 64;

/// Feedmark - viewport-driven read tracking.
#[derive(Parser, Debug)]
#[command(name = "feedmark")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    FEEDMARK_API_URL              Backend URL (required unless --dry-run)
    FEEDMARK_API_KEY              API key sent as X-API-Key
    FEEDMARK_COMMIT_DEBOUNCE_MS   Commit debounce window (default: 500)
    FEEDMARK_ACTIVATION_DELAY_MS  Auto-activation delay (default: 3000)
    FEEDMARK_RESIZE_DEBOUNCE_MS   Resize debounce (default: 300)
    FEEDMARK_TOP_MARGIN_PX        Viewport top inset (default: 100)

EXAMPLES:
    # Show read counts
    export FEEDMARK_API_URL=http://localhost:8000
    feedmark stats

    # Replay a recorded session without touching the backend
    feedmark replay session.jsonl --dry-run
")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print aggregate read counts as JSON.
    Stats,

    /// Play a timed JSONL session script through the tracker.
    Replay {
        /// Path to the script.
        script: PathBuf,

        /// Log batches instead of committing them.
        #[arg(long)]
        dry_run: bool,

        /// How long to keep running after the last step so pending batches flush.
        #[arg(long, default_value_t = 2000)]
        linger_ms: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Stats => runtime.block_on(run_stats()),
        Command::Replay {
            script,
            dry_run,
            linger_ms,
        } => runtime.block_on(run_replay_command(script, dry_run, linger_ms)),
    }
}

async fn run_stats() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let api = HttpContentApi::new(&config.api_url, config.api_key.as_deref())
        .context("Failed to create API client")?;

    let stats = api.fetch_stats().await.context("Failed to fetch stats")?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_replay_command(script: PathBuf, dry_run: bool, linger_ms: u64) -> Result<()> {
    let steps = replay::load_script(&script)
        .with_context(|| format!("Failed to load script {}", script.display()))?;
    info!(steps = steps.len(), script = %script.display(), dry_run, "Loaded session script");

    let linger = Duration::from_millis(linger_ms);

    if dry_run {
        let settings = TrackerSettings::from_env().context("Failed to load configuration")?;
        return run_replay(settings, Arc::new(DryRunApi::new()), steps, linger).await;
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    let api = HttpContentApi::new(&config.api_url, config.api_key.as_deref())
        .context("Failed to create API client")?;
    run_replay(config.settings, Arc::new(api), steps, linger).await
}

async fn run_replay<A: ContentApi>(
    settings: TrackerSettings,
    api: Arc<A>,
    steps: Vec<ReplayStep>,
    linger: Duration,
) -> Result<()> {
    let (notify_tx, mut notify_rx) = mpsc::channel(NOTIFICATION_CHANNEL_SIZE);
    let handle = runtime::spawn(settings, api, notify_tx);

    let reporter = tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            report(&notification);
        }
    });

    let playback = async {
        let sent = replay::play(&handle, steps).await?;
        tokio::time::sleep(linger).await;
        Ok::<usize, feedmark_tracker::TrackerError>(sent)
    };

    tokio::select! {
        result = playback => {
            let sent = result.context("Replay aborted")?;
            info!(steps = sent, "Replay finished");
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received");
        }
    }

    handle.shutdown().await;
    if let Err(e) = reporter.await {
        warn!(error = %e, "Notification reporter ended abnormally");
    }
    Ok(())
}

fn report(notification: &TrackerNotification) {
    match notification {
        TrackerNotification::Activated(trigger) => info!(trigger = ?trigger, "Tracking activated"),
        TrackerNotification::Committed { ids, viewed_at } => {
            let ids: Vec<&str> = ids.iter().map(ItemId::as_str).collect();
            info!(ids = ?ids, viewed_at = %viewed_at, "Marked read");
        }
        TrackerNotification::CommitFailed {
            ids,
            attempt,
            retry_in_ms,
        } => warn!(ids = ids.len(), attempt, retry_in_ms, "Commit failed"),
        TrackerNotification::StatsRefreshed(stats) => {
            info!(total = stats.total, unread = stats.unread, read = stats.read, "Stats")
        }
    }
}

/// Initializes the tracing subscriber with env filter support.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_level(true)
            .with_file(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
