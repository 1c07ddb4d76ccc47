//! Dispatch event notifications
//!
//! A broadcast channel the dispatcher publishes outcomes on. Anything
//! holding a receiver (the daemon's log hook today, webhooks tomorrow)
//! sees every event emitted while subscribed; emitting never blocks
//! dispatch and events with no listeners are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// What the dispatcher did to a post, or in a whole tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// At least one target was delivered; the post is `posted`.
    PostPublished {
        post_id: String,
        user_id: String,
        published: usize,
        failed: usize,
    },
    /// Every delivery failed; the post is `failed`.
    PostFailed {
        post_id: String,
        user_id: String,
        error: Option<String>,
    },
    /// A tick that had due posts finished.
    TickCompleted {
        due: usize,
        published: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Hands out receivers and fans events out to them.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Fire-and-forget send.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
