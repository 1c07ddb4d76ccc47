//! omni-queue - Manage scheduled posts
//!
//! Unix-style tool for managing the scheduled post queue.

use clap::{Parser, Subcommand};
use libomnipost::{Config, Database, OmnipostError, Platform, Post, PostStatus, Result};
use std::io::Read;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "omni-queue")]
#[command(version)]
#[command(about = "Manage scheduled posts")]
#[command(long_about = "\
omni-queue - Manage scheduled posts

DESCRIPTION:
    omni-queue is a Unix-style tool for managing the Omnipost queue. Use it
    to list, inspect, edit, cancel, reschedule, or delete queued posts, and
    to view statistics about the queue.

COMMANDS:
    list        List posts in the queue
    show        Show one post in full
    edit        Replace the content of a queued post
    cancel      Cancel a scheduled post
    reschedule  Move a post to a different time
    now         Make a post due immediately
    delete      Delete a post outright
    stats       Show queue statistics

USAGE EXAMPLES:
    # List everything still scheduled
    omni-queue list --status scheduled

    # List posts in JSON format
    omni-queue list --format json

    # Inspect one post, targets and all
    omni-queue show <POST_ID>

    # Fix a typo before it goes out
    omni-queue edit <POST_ID> \"Corrected content\"

    # Cancel a scheduled post
    omni-queue cancel <POST_ID>

    # Reschedule a post
    omni-queue reschedule <POST_ID> \"tomorrow 3pm\"

    # Stop waiting; the next daemon tick picks it up
    omni-queue now <POST_ID>

    # View queue statistics
    omni-queue stats

CONFIGURATION:
    Configuration file: ~/.config/omnipost/config.toml
    Database location: ~/.local/share/omnipost/posts.db

    Override with environment variables:
        OMNIPOST_CONFIG    - Path to config file

EXIT CODES:
    0 - Success
    1 - Operation failed (wrong state, database error)
    3 - Invalid input (unknown post ID, bad time format, etc.)

For more information, visit: https://github.com/omnipost/omnipost
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List posts in the queue
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Filter by platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Filter by status (draft, scheduled, posting, posted, failed, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by user
        #[arg(short, long)]
        user: Option<String>,

        /// Maximum number of posts to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show one post in full
    Show {
        /// Post ID to show
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replace the content of a queued post
    Edit {
        /// Post ID to edit
        post_id: String,

        /// New content (reads from stdin if not provided)
        content: Option<String>,
    },

    /// Cancel a scheduled post
    Cancel {
        /// Post ID to cancel
        post_id: String,
    },

    /// Reschedule a post
    Reschedule {
        /// Post ID to reschedule
        post_id: String,

        /// New schedule time (e.g. "tomorrow 3pm", "2h")
        time: String,
    },

    /// Make a post due immediately
    Now {
        /// Post ID to dispatch on the next tick
        post_id: String,
    },

    /// Delete a post and everything attached to it
    Delete {
        /// Post ID to delete
        post_id: String,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "error" };
    libomnipost::logging::LoggingConfig::new(
        libomnipost::logging::LogFormat::Text,
        level.to_string(),
        cli.verbose,
    )
    .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::List {
            format,
            platform,
            status,
            user,
            limit,
        } => {
            cmd_list(
                &db,
                &format,
                platform.as_deref(),
                status.as_deref(),
                user.as_deref(),
                limit,
            )
            .await?;
        }
        Commands::Show { post_id, format } => {
            cmd_show(&db, &post_id, &format).await?;
        }
        Commands::Edit { post_id, content } => {
            cmd_edit(&db, &post_id, content).await?;
        }
        Commands::Cancel { post_id } => {
            cmd_cancel(&db, &post_id).await?;
        }
        Commands::Reschedule { post_id, time } => {
            cmd_reschedule(&db, &post_id, &time).await?;
        }
        Commands::Now { post_id } => {
            cmd_now(&db, &post_id).await?;
        }
        Commands::Delete { post_id } => {
            cmd_delete(&db, &post_id).await?;
        }
        Commands::Stats { format } => {
            cmd_stats(&db, &format).await?;
        }
    }

    Ok(())
}

fn check_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(OmnipostError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// List posts, newest-scheduled first among the scheduled, drafts after.
async fn cmd_list(
    db: &Database,
    format: &str,
    platform: Option<&str>,
    status: Option<&str>,
    user: Option<&str>,
    limit: usize,
) -> Result<()> {
    check_format(format)?;

    let platform = platform
        .map(Platform::from_str)
        .transpose()
        .map_err(OmnipostError::InvalidInput)?;
    let status = status
        .map(PostStatus::from_str)
        .transpose()
        .map_err(OmnipostError::InvalidInput)?;

    let posts = db.list_posts(user, status, platform, limit).await?;

    if format == "json" {
        output_list_json(&posts);
    } else {
        output_list_text(&posts);
    }

    Ok(())
}

/// Output posts as JSON
fn output_list_json(posts: &[Post]) {
    let json: Vec<serde_json::Value> = posts
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "user_id": p.user_id,
                "content": p.content,
                "status": p.status.as_str(),
                "scheduled_at": p.scheduled_at,
                "created_at": p.created_at,
                "platforms": p.targets.iter().map(|t| t.platform.as_str()).collect::<Vec<_>>(),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}

/// Output posts as human-readable text
fn output_list_text(posts: &[Post]) {
    if posts.is_empty() {
        return;
    }

    let now = chrono::Utc::now().timestamp();

    for post in posts {
        let content_preview = truncate_content(&post.content, 50);
        let when = match (post.status, post.scheduled_at) {
            (PostStatus::Scheduled, Some(ts)) => format_time_until(now, ts),
            (_, Some(ts)) => format_timestamp(ts),
            (_, None) => "unscheduled".to_string(),
        };

        println!(
            "{} | {:9} | {} | {}",
            post.id, post.status, content_preview, when
        );
    }
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .unwrap_or_else(chrono::Utc::now)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

/// Format time until scheduled time in human-readable form
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

/// Fetch a post or fail with exit code 3 semantics.
async fn require_post(db: &Database, post_id: &str) -> Result<Post> {
    db.get_post(post_id).await?.ok_or_else(|| {
        OmnipostError::InvalidInput(format!("No post with id '{}'", post_id))
    })
}

/// Show one post in full
async fn cmd_show(db: &Database, post_id: &str, format: &str) -> Result<()> {
    check_format(format)?;

    let post = require_post(db, post_id).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&post).unwrap());
        return Ok(());
    }

    println!("ID:        {}", post.id);
    println!("User:      {}", post.user_id);
    println!("Status:    {}", post.status);
    println!("Created:   {}", format_timestamp(post.created_at));
    match post.scheduled_at {
        Some(ts) => println!(
            "Scheduled: {} (composed in {})",
            format_timestamp(ts),
            post.timezone
        ),
        None => println!("Scheduled: -"),
    }
    if !post.tags.is_empty() {
        println!("Tags:      {}", post.tags.join(", "));
    }
    println!("Content:");
    for line in post.content.lines() {
        println!("  {}", line);
    }
    if !post.media.is_empty() {
        println!("Media:");
        for media in &post.media {
            println!("  {} {}", media.kind.as_str(), media.url);
        }
    }
    if !post.targets.is_empty() {
        println!("Targets:");
        for target in &post.targets {
            match (&target.external_post_id, &target.error_message) {
                (Some(external_id), _) => {
                    println!("  ✓ {}: {}", target.platform, external_id);
                }
                (None, Some(error)) => {
                    println!("  ✗ {}: {}", target.platform, error);
                }
                (None, None) => {
                    println!("  - {} ({})", target.platform, target.status);
                }
            }
        }
    }
    let a = &post.analytics;
    println!(
        "Analytics: {} views, {} likes, {} shares, {} comments, {} clicks",
        a.views, a.likes, a.shares, a.comments, a.clicks
    );

    Ok(())
}

/// Replace the content of a queued post
async fn cmd_edit(db: &Database, post_id: &str, content: Option<String>) -> Result<()> {
    let content = match content {
        Some(content) => content,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| OmnipostError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
            buffer
        }
    };
    let content = content.trim().to_string();

    let mut post = require_post(db, post_id).await?;
    post.content = content;
    db.update_post(&post).await?;

    println!("Updated {}", post.id);
    Ok(())
}

/// Cancel a scheduled post
async fn cmd_cancel(db: &Database, post_id: &str) -> Result<()> {
    require_post(db, post_id).await?;
    let post = db.cancel_post(post_id).await?;
    println!("Cancelled {}", post.id);
    Ok(())
}

/// Reschedule a post
async fn cmd_reschedule(db: &Database, post_id: &str, time: &str) -> Result<()> {
    use libomnipost::scheduling::{parse_schedule, validate_future};

    require_post(db, post_id).await?;

    let at = parse_schedule(time, None)?;
    validate_future(at, chrono::Utc::now())?;

    let post = db.reschedule_post(post_id, at.timestamp()).await?;
    println!(
        "Rescheduled {} for {}",
        post.id,
        format_timestamp(at.timestamp())
    );
    Ok(())
}

/// Make a post due right now; the next daemon tick dispatches it.
async fn cmd_now(db: &Database, post_id: &str) -> Result<()> {
    require_post(db, post_id).await?;
    let post = db
        .reschedule_post(post_id, chrono::Utc::now().timestamp())
        .await?;
    println!("Queued {} for immediate dispatch", post.id);
    Ok(())
}

/// Delete a post and everything attached to it
async fn cmd_delete(db: &Database, post_id: &str) -> Result<()> {
    require_post(db, post_id).await?;
    db.delete_post(post_id).await?;
    println!("Deleted {}", post_id);
    Ok(())
}

/// Show queue statistics
async fn cmd_stats(db: &Database, format: &str) -> Result<()> {
    check_format(format)?;

    let stats = db.queue_stats().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats).unwrap());
        return Ok(());
    }

    println!("Draft:     {}", stats.draft);
    println!("Scheduled: {}", stats.scheduled);
    println!("Posting:   {}", stats.posting);
    println!("Posted:    {}", stats.posted);
    println!("Failed:    {}", stats.failed);
    println!("Cancelled: {}", stats.cancelled);
    match stats.next_due {
        Some(ts) => {
            let now = chrono::Utc::now().timestamp();
            println!(
                "Next due:  {} ({})",
                format_timestamp(ts),
                format_time_until(now, ts)
            );
        }
        None => println!("Next due:  none"),
    }

    Ok(())
}
