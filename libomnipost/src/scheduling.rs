//! Parsing of human-readable schedule expressions.
//!
//! The CLIs accept relative durations ("2h"), natural language
//! ("tomorrow 9am") and random jitter windows ("random:10m-20m") and
//! normalize them all to a UTC instant.

use crate::{OmnipostError, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

const MIN_RANDOM_SECONDS: i64 = 30;
const MAX_RANDOM_SECONDS: i64 = 30 * 24 * 3600; // 30 days

/// Parse a schedule string into a UTC instant.
///
/// Supported forms:
/// - Relative durations: "30m", "2h", "1d"
/// - Natural language: "tomorrow", "next friday 9am", "2025-11-20 15:00"
/// - Random windows: "random:10m-20m", offset from `last_scheduled` when
///   given so queued posts space themselves out
///
/// # Errors
///
/// Returns `InvalidInput` when the expression cannot be parsed or a
/// random window violates the bounds.
pub fn parse_schedule(input: &str, last_scheduled: Option<i64>) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Err(OmnipostError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Some(range) = input.strip_prefix("random:") {
        return parse_random_window(range, last_scheduled);
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(OmnipostError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

/// Reject instants that are not strictly in the future.
///
/// Posts scheduled in the past would fire on the very next tick, which is
/// never what the author meant; callers apply this after parsing.
pub fn validate_future(scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if scheduled_at <= now {
        return Err(OmnipostError::InvalidInput(format!(
            "Scheduled time must be in the future (got {})",
            scheduled_at.to_rfc3339()
        )));
    }
    Ok(())
}

fn parse_duration(input: &str) -> Result<Duration> {
    if let Ok(std_duration) = humantime::parse_duration(input) {
        let seconds = std_duration.as_secs() as i64;
        return Duration::try_seconds(seconds)
            .ok_or_else(|| OmnipostError::InvalidInput("Duration out of range".to_string()));
    }

    Err(OmnipostError::InvalidInput(format!(
        "Could not parse duration: {}",
        input
    )))
}

fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| OmnipostError::InvalidInput(format!("Could not parse time: {}", e)))
}

/// "MIN-MAX" jitter window, anchored to `last_scheduled` when present so
/// successive queued posts land min..=max apart rather than all at once.
fn parse_random_window(range: &str, last_scheduled: Option<i64>) -> Result<DateTime<Utc>> {
    let parts: Vec<&str> = range.split('-').collect();
    if parts.len() != 2 {
        return Err(OmnipostError::InvalidInput(
            "Random format must be random:MIN-MAX".to_string(),
        ));
    }

    let min = parse_duration(parts[0])?;
    let max = parse_duration(parts[1])?;
    validate_random_window(min, max)?;

    let base = match last_scheduled {
        Some(timestamp) => DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now),
        None => Utc::now(),
    };

    let random_secs = rand::thread_rng().gen_range(min.num_seconds()..=max.num_seconds());
    let jitter = Duration::try_seconds(random_secs).unwrap_or(min);
    Ok(base + jitter)
}

fn validate_random_window(min: Duration, max: Duration) -> Result<()> {
    let min_secs = min.num_seconds();
    let max_secs = max.num_seconds();

    if min_secs < MIN_RANDOM_SECONDS {
        return Err(OmnipostError::InvalidInput(format!(
            "Minimum random interval must be at least {} seconds",
            MIN_RANDOM_SECONDS
        )));
    }

    if max_secs > MAX_RANDOM_SECONDS {
        return Err(OmnipostError::InvalidInput(format!(
            "Maximum random interval must be less than {} days",
            MAX_RANDOM_SECONDS / (24 * 3600)
        )));
    }

    if min_secs >= max_secs {
        return Err(OmnipostError::InvalidInput(
            "Minimum must be less than maximum".to_string(),
        ));
    }

    Ok(())
}
