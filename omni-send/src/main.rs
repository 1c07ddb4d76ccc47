//! omni-send - Background daemon for scheduled posting
//!
//! Monitors the post queue and dispatches scheduled posts to their
//! platforms when they come due.

use clap::Parser;
use libomnipost::dispatch::{Dispatcher, TickOutcome};
use libomnipost::logging::{LogFormat, LoggingConfig};
use libomnipost::platforms::PublisherRegistry;
use libomnipost::{Config, Database, Event, EventBus, OmnipostError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "omni-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
omni-send - Background daemon for scheduled posting

DESCRIPTION:
    omni-send is a long-running daemon that watches the Omnipost queue and
    publishes scheduled posts when their time arrives.

    Each tick it returns expired claims to the queue, picks up the due
    posts, publishes every pending target concurrently with retry on
    transient errors, and commits the results. A post is claimed before
    publishing, so several daemons can share one database without
    double-posting.

USAGE:
    # Run in foreground (logs to stderr)
    omni-send

    # Run with a custom tick interval
    omni-send --tick-interval 30

    # Force a single check right now, then exit
    omni-send --once

SIGNALS:
    SIGTERM, SIGINT, SIGHUP - Graceful shutdown (finishes the current tick)

CONFIGURATION:
    Configuration file: ~/.config/omnipost/config.toml
    Database location: ~/.local/share/omnipost/posts.db

    [daemon]
    tick_secs = 60              # seconds between dispatch ticks
    publish_timeout_secs = 30   # per-attempt publish timeout
    claim_lease_secs = 600      # how long a crashed dispatch holds a post
    retry_attempts = 3          # attempts per target on transient errors
    batch_size = 50             # most due posts processed per tick

    Logging is controlled with OMNIPOST_LOG_FORMAT (text, json, pretty)
    and OMNIPOST_LOG_LEVEL.

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error

For more information, visit: https://github.com/omnipost/omnipost
")]
struct Cli {
    /// Tick interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    tick_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Initialize logging, respecting OMNIPOST_LOG_FORMAT / OMNIPOST_LOG_LEVEL
fn init_logging(verbose: bool) {
    let format = std::env::var("OMNIPOST_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);
    let level = std::env::var("OMNIPOST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    LoggingConfig::new(format, level, verbose).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    info!("omni-send daemon starting");

    let registry = Arc::new(PublisherRegistry::from_config(&config.platforms));
    if registry.is_empty() {
        warn!("No platforms enabled in config; due posts will fail until one is");
    } else {
        info!("{} platform(s) enabled", registry.len());
    }

    let events = EventBus::new();
    spawn_notice_logger(&events);

    let tick_secs = cli.tick_interval.unwrap_or(config.daemon.tick_secs);
    info!("Tick interval: {}s", tick_secs);

    let store = Arc::new(db);
    let dispatcher = Dispatcher::new(
        store.clone(),
        store,
        registry,
        events,
        config.daemon.clone(),
    );

    if cli.once {
        dispatcher.tick().await?;
        info!("omni-send: ran one tick, exiting");
    } else {
        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone())?;
        run_daemon_loop(&dispatcher, tick_secs, shutdown).await;
    }

    info!("omni-send daemon stopped");
    Ok(())
}

/// Logs published/failed notices. Stands in for an external notification
/// channel; a slow or dead subscriber never affects dispatch.
fn spawn_notice_logger(events: &EventBus) {
    use tokio::sync::broadcast::error::RecvError;

    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Event::PostPublished {
                    post_id,
                    user_id,
                    published,
                    failed,
                }) => {
                    info!(
                        "Notice: post {} for {} published ({} delivered, {} failed)",
                        post_id, user_id, published, failed
                    );
                }
                Ok(Event::PostFailed {
                    post_id,
                    user_id,
                    error,
                }) => {
                    warn!(
                        "Notice: post {} for {} failed: {}",
                        post_id,
                        user_id,
                        error.unwrap_or_else(|| "unknown error".to_string())
                    );
                }
                Ok(Event::TickCompleted { .. }) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!("Notice subscriber lagged, {} notices dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
        .map_err(|e| OmnipostError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    // Dedicated thread; signal-hook's iterator blocks
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, stopping gracefully...", sig);
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

/// Main daemon loop
async fn run_daemon_loop(dispatcher: &Dispatcher, tick_secs: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        match dispatcher.tick().await {
            Ok(TickOutcome::Completed(summary)) if summary.due > 0 => {
                info!(
                    "Tick complete: {} due, {} published, {} failed, {} skipped",
                    summary.due, summary.published, summary.failed, summary.skipped
                );
            }
            Ok(_) => {}
            Err(e) => error!("Tick failed: {}", e),
        }

        // Sleep until the next tick, checking for shutdown every second
        for _ in 0..tick_secs {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
