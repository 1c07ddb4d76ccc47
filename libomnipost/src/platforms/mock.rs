//! Mock publisher for testing
//!
//! A configurable stand-in used by dispatch and integration tests: it
//! can succeed, fail with a chosen error, fail transiently for the
//! first N calls, or delay to simulate network latency. No credentials
//! or network access required.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PublishError;
use crate::platforms::Publisher;
use crate::types::{Platform, Post, SocialAccount};

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform the mock claims to publish to
    pub platform: Platform,

    /// Whether publishing should succeed
    pub publish_succeeds: bool,

    /// Error to return on publish failure
    pub publish_error: Option<PublishError>,

    /// Fail with a transient network error for this many calls, then succeed
    pub fail_first: usize,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Character limit for validation
    pub character_limit: Option<usize>,

    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Content that has been published (for verification)
    pub published_content: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Twitter,
            publish_succeeds: true,
            publish_error: None,
            fail_first: 0,
            delay: Duration::from_millis(0),
            character_limit: None,
            publish_call_count: Arc::new(Mutex::new(0)),
            published_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock publisher for testing
pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    /// Create a new mock publisher with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock publisher that always succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig {
            platform,
            ..Default::default()
        })
    }

    /// Create a mock publisher that always fails with the given error
    pub fn failure(platform: Platform, error: PublishError) -> Self {
        Self::new(MockConfig {
            platform,
            publish_succeeds: false,
            publish_error: Some(error),
            ..Default::default()
        })
    }

    /// Create a mock publisher that fails transiently `times` times, then succeeds
    pub fn flaky(platform: Platform, times: usize) -> Self {
        Self::new(MockConfig {
            platform,
            fail_first: times,
            ..Default::default()
        })
    }

    /// Create a mock publisher with a delay
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            platform,
            delay,
            ..Default::default()
        })
    }

    /// Create a mock publisher with a character limit
    pub fn with_limit(platform: Platform, limit: usize) -> Self {
        Self::new(MockConfig {
            platform,
            character_limit: Some(limit),
            ..Default::default()
        })
    }

    /// Get the number of times publish was called
    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    /// Get all content that was published
    pub fn published_content(&self) -> Vec<String> {
        self.config.published_content.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    async fn publish(
        &self,
        post: &Post,
        _account: &SocialAccount,
    ) -> Result<String, PublishError> {
        // Increment call count
        let call = {
            let mut count = self.config.publish_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        // Simulate delay
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if call <= self.config.fail_first {
            return Err(PublishError::Network(format!(
                "mock transient failure {call} of {}",
                self.config.fail_first
            )));
        }

        if !self.config.publish_succeeds {
            let error = self
                .config
                .publish_error
                .clone()
                .unwrap_or_else(|| PublishError::Api("Mock publish failed".to_string()));
            return Err(error);
        }

        // Store published content
        self.config
            .published_content
            .lock()
            .unwrap()
            .push(post.content.clone());

        // Generate mock post ID
        Ok(format!(
            "{}-mock-{}",
            self.config.platform,
            uuid::Uuid::new_v4()
        ))
    }
}
