//! omni-post - Compose and schedule social media posts

use clap::Parser;
use libomnipost::logging::{LogFormat, LoggingConfig};
use libomnipost::scheduling::{parse_schedule, validate_future};
use libomnipost::types::{MediaAttachment, MediaKind, PlatformTarget, TargetStatus};
use libomnipost::{Config, Database, OmnipostError, Platform, Post, PostStatus, Result};
use std::io::Read;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "omni-post")]
#[command(version)]
#[command(about = "Compose and schedule social media posts")]
#[command(long_about = "\
omni-post - Compose and schedule social media posts

DESCRIPTION:
    omni-post composes a post, resolves the linked account for each target
    platform, and inserts it into the queue. The omni-send daemon publishes
    it when the scheduled time arrives.

USAGE EXAMPLES:
    # Schedule a post for two hours from now
    omni-post \"Release is out!\" -p twitter,linkedin --at 2h

    # Compose from stdin
    git log -1 --format=%s | omni-post -p twitter --at \"tomorrow 9am\"

    # Spread queued posts out with a random window
    omni-post \"Teaser\" -p instagram --media https://cdn.example.com/teaser.jpg --at random:30m-2h

    # Save a draft to finish later
    omni-post \"Half an idea\" --draft

    # JSON output for scripting
    omni-post \"Ship it\" -p twitter --at 1h --format json

CONFIGURATION:
    Configuration file: ~/.config/omnipost/config.toml
    Database location: ~/.local/share/omnipost/posts.db

    Override with environment variables:
        OMNIPOST_CONFIG    - Path to config file
        OMNIPOST_USER      - Default user for --user

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication error
    3 - Invalid input (empty content, bad platform, past schedule, etc.)

For more information, visit: https://github.com/omnipost/omnipost
")]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// User the post belongs to
    #[arg(short, long, env = "OMNIPOST_USER", default_value = "default")]
    user: String,

    /// Target platform(s), comma-separated (twitter, facebook, instagram, linkedin, tiktok)
    #[arg(short, long, value_name = "PLATFORMS")]
    platforms: Option<String>,

    /// When to publish (e.g. "2h", "tomorrow 9am", "random:30m-2h")
    #[arg(long, value_name = "TIME")]
    at: Option<String>,

    /// Attach media by URL (repeatable; kind inferred from the extension)
    #[arg(short, long, value_name = "URL")]
    media: Vec<String>,

    /// Comma-separated labels stored with the post
    #[arg(long, value_name = "TAGS")]
    tags: Option<String>,

    /// IANA timezone recorded for display (scheduling itself is UTC)
    #[arg(long, default_value = "UTC")]
    timezone: String,

    /// Save as draft without scheduling
    #[arg(short, long)]
    draft: bool,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "error" };
    LoggingConfig::new(LogFormat::Text, level.to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    tracing::debug!("omni-post started with args: {:?}", cli);

    if cli.format != "text" && cli.format != "json" {
        return Err(OmnipostError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            cli.format
        )));
    }

    let content = match &cli.content {
        Some(content) => content.clone(),
        None => read_stdin()?,
    };
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(OmnipostError::InvalidInput(
            "No content provided (pass it as an argument or on stdin)".to_string(),
        ));
    }

    let platforms = parse_platforms(cli.platforms.as_deref())?;
    if platforms.is_empty() && !cli.draft {
        return Err(OmnipostError::InvalidInput(
            "Scheduling needs at least one platform (-p twitter,linkedin); use --draft to save without one".to_string(),
        ));
    }

    let scheduled_at = match &cli.at {
        Some(expr) => {
            let at = parse_schedule(expr, None)?;
            validate_future(at, chrono::Utc::now())?;
            Some(at.timestamp())
        }
        None => None,
    };
    if scheduled_at.is_none() && !cli.draft {
        return Err(OmnipostError::InvalidInput(
            "Scheduling needs --at (e.g. --at 2h); use --draft to save without a time".to_string(),
        ));
    }

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    let mut post = Post::new(cli.user.clone(), content);
    post.timezone = cli.timezone.clone();
    post.scheduled_at = scheduled_at;
    post.status = if cli.draft {
        PostStatus::Draft
    } else {
        PostStatus::Scheduled
    };

    if let Some(tags) = &cli.tags {
        post.tags = tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
    }

    for url in &cli.media {
        post.media
            .push(MediaAttachment::new(infer_media_kind(url), url.clone()));
    }

    let target_status = if cli.draft {
        TargetStatus::Draft
    } else {
        TargetStatus::Scheduled
    };
    for platform in platforms {
        let account = db.find_account(&cli.user, platform).await?.ok_or_else(|| {
            OmnipostError::InvalidInput(format!(
                "No active {} account linked for user '{}'",
                platform, cli.user
            ))
        })?;
        post.targets.push(PlatformTarget {
            id: None,
            post_id: post.id.clone(),
            platform,
            account_id: account.id,
            status: target_status,
            external_post_id: None,
            error_message: None,
            posted_at: None,
        });
    }

    db.create_post(&post).await?;

    match cli.format.as_str() {
        "json" => output_json(&post),
        _ => output_text(&post),
    }

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| OmnipostError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(buffer)
}

/// Comma-separated platform names, deduplicated, order preserved.
fn parse_platforms(arg: Option<&str>) -> Result<Vec<Platform>> {
    let Some(arg) = arg else {
        return Ok(Vec::new());
    };

    let mut platforms = Vec::new();
    for name in arg.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let platform = Platform::from_str(name).map_err(OmnipostError::InvalidInput)?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

/// Attachment kind from the URL's file extension.
fn infer_media_kind(url: &str) -> MediaKind {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("mp4") | Some("mov") | Some("webm") | Some("m4v") => MediaKind::Video,
        Some("gif") => MediaKind::Gif,
        _ => MediaKind::Image,
    }
}

fn output_text(post: &Post) {
    let platforms = post
        .targets
        .iter()
        .map(|t| t.platform.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    match post.scheduled_at {
        Some(ts) if post.status == PostStatus::Scheduled => {
            let when = chrono::DateTime::from_timestamp(ts, 0)
                .unwrap_or_else(chrono::Utc::now)
                .format("%Y-%m-%d %H:%M:%S UTC");
            println!("Scheduled {} for {} on {}", post.id, when, platforms);
        }
        _ => println!("Saved draft {}", post.id),
    }
}

fn output_json(post: &Post) {
    let json = serde_json::json!({
        "id": post.id,
        "user_id": post.user_id,
        "status": post.status.as_str(),
        "scheduled_at": post.scheduled_at,
        "platforms": post.targets.iter().map(|t| t.platform.as_str()).collect::<Vec<_>>(),
        "media": post.media.len(),
        "tags": post.tags,
    });
    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}
