//! Omnipost - Unix tools for scheduling social media posts
//!
//! This library provides core functionality for composing posts, queueing
//! them for a future time, and dispatching them to the connected platforms
//! when they come due.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod notify;
pub mod platforms;
pub mod scheduling;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, QueueStats};
pub use dispatch::{Dispatcher, TickOutcome, TickSummary};
pub use error::{OmnipostError, Result};
pub use notify::{Event, EventBus};
pub use types::{Platform, Post, PostStatus, SocialAccount};
