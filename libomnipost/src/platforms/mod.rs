//! Platform publishers
//!
//! One [`Publisher`] per social network, behind a common trait the
//! dispatch loop drives. Each implementation owns its HTTP plumbing and
//! knows the platform's content rules; the [`PublisherRegistry`] maps a
//! target's platform to the publisher that can deliver it.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libomnipost::platforms::{mock::MockPublisher, PublisherRegistry};
//! use libomnipost::types::Platform;
//!
//! let registry = PublisherRegistry::new()
//!     .with_publisher(Arc::new(MockPublisher::success(Platform::Twitter)));
//!
//! if let Some(publisher) = registry.get(Platform::Twitter) {
//!     assert_eq!(publisher.platform(), Platform::Twitter);
//! }
//! ```

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PlatformsConfig;
use crate::error::PublishError;
use crate::types::{Platform, Post, SocialAccount};

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;
pub mod twitter;

// Mock publisher is available for all builds (not just tests) to support integration tests
pub mod mock;

/// A client that can deliver posts to one social platform.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Which platform this publisher delivers to.
    fn platform(&self) -> Platform;

    /// The platform's hard character limit, or `None` if it has none.
    fn character_limit(&self) -> Option<usize>;

    /// Check the post against platform rules before any network call.
    ///
    /// The default covers empty content and the character limit;
    /// publishers with structural requirements (attachment counts,
    /// media kinds) override it.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Validation` if the post can never be
    /// accepted by this platform as composed.
    fn validate(&self, post: &Post) -> Result<(), PublishError> {
        if post.content.trim().is_empty() {
            return Err(PublishError::Validation(
                "content cannot be empty".to_string(),
            ));
        }
        if let Some(limit) = self.character_limit() {
            let chars = post.content.chars().count();
            if chars > limit {
                return Err(PublishError::Validation(format!(
                    "content is {chars} characters, {} allows {limit}",
                    self.platform()
                )));
            }
        }
        Ok(())
    }

    /// Deliver the post on behalf of the given account.
    ///
    /// Returns the platform-assigned identifier for the created post
    /// (tweet ID, Graph object ID, share URN...).
    ///
    /// # Errors
    ///
    /// - `PublishError::Authentication` when the account's token is
    ///   rejected
    /// - `PublishError::RateLimit` when the platform asks to back off
    /// - `PublishError::Network` / `PublishError::Timeout` for
    ///   transport failures
    /// - `PublishError::Api` for any other rejection
    async fn publish(
        &self,
        post: &Post,
        account: &SocialAccount,
    ) -> Result<String, PublishError>;
}

/// Maps platforms to their publishers.
pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    /// An empty registry; add publishers with [`with_publisher`].
    ///
    /// [`with_publisher`]: PublisherRegistry::with_publisher
    pub fn new() -> Self {
        Self {
            publishers: HashMap::new(),
        }
    }

    /// Build a registry with a real client for every enabled platform.
    pub fn from_config(config: &PlatformsConfig) -> Self {
        let mut registry = Self::new();

        for platform in Platform::all() {
            let platform_config = config.get(platform);
            if !platform_config.enabled {
                continue;
            }

            let publisher: Arc<dyn Publisher> = match platform {
                Platform::Twitter => {
                    Arc::new(twitter::TwitterPublisher::new(platform_config))
                }
                Platform::Facebook => {
                    Arc::new(facebook::FacebookPublisher::new(platform_config))
                }
                Platform::Instagram => {
                    Arc::new(instagram::InstagramPublisher::new(platform_config))
                }
                Platform::Linkedin => {
                    Arc::new(linkedin::LinkedinPublisher::new(platform_config))
                }
                Platform::Tiktok => Arc::new(tiktok::TiktokPublisher::new(platform_config)),
            };
            registry.publishers.insert(platform, publisher);
        }

        registry
    }

    /// Register (or replace) the publisher for its platform.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publishers.insert(publisher.platform(), publisher);
        self
    }

    /// The publisher for a platform, if one is registered.
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Publisher>> {
        self.publishers.get(&platform).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }
}

impl Default for PublisherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a non-success HTTP response onto a publish error.
pub(crate) async fn api_error(resp: Response) -> PublishError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PublishError::Authentication(format!("status {status}: {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS => PublishError::RateLimit(body),
        _ => PublishError::Api(format!("status {status}: {body}")),
    }
}

/// Download an attachment so it can be re-uploaded to a platform.
pub(crate) async fn fetch_media(http: &Client, url: &str) -> Result<Vec<u8>, PublishError> {
    let resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(PublishError::Api(format!(
            "media fetch failed with status {} for {url}",
            resp.status()
        )));
    }
    Ok(resp.bytes().await?.to_vec())
}
