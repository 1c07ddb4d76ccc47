//! Scheduled post dispatch
//!
//! The loop that turns due scheduled posts into published ones. Each
//! tick releases expired claims, queries the due set, and processes one
//! post at a time: claim it, publish every pending target concurrently
//! with retry, then commit all outcomes in a single transaction. A post
//! is only ever between states while its claim is held, so a crashed
//! run is recovered by the lease rather than lost.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::error::{PublishError, Result};
use crate::notify::{Event, EventBus};
use crate::platforms::{Publisher, PublisherRegistry};
use crate::store::{aggregate_status, AccountStore, PostStore, TargetResult};
use crate::types::{Platform, Post, PostStatus, SocialAccount, TargetStatus};

/// Counters for one pass over the due queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Posts found due this tick.
    pub due: usize,
    /// Posts whose dispatch ended `posted`.
    pub published: usize,
    /// Posts whose dispatch ended `failed`.
    pub failed: usize,
    /// Posts skipped this tick (claim lost, or deferred by a store error).
    pub skipped: usize,
    /// Expired claims handed back to the queue before the due query.
    pub released: u64,
}

/// What a call to [`Dispatcher::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran to completion.
    Completed(TickSummary),
    /// A previous tick was still running; nothing was done.
    Skipped,
}

/// Drives scheduled posts through publish and commit.
pub struct Dispatcher {
    posts: Arc<dyn PostStore>,
    accounts: Arc<dyn AccountStore>,
    registry: Arc<PublisherRegistry>,
    events: EventBus,
    config: DaemonConfig,
    running: AtomicBool,
}

/// Clears the running flag even if a tick unwinds early.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Dispatcher {
    pub fn new(
        posts: Arc<dyn PostStore>,
        accounts: Arc<dyn AccountStore>,
        registry: Arc<PublisherRegistry>,
        events: EventBus,
        config: DaemonConfig,
    ) -> Self {
        Self {
            posts,
            accounts,
            registry,
            events,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Run one dispatch pass.
    ///
    /// At most one tick runs at a time: a call that arrives while a
    /// previous pass is still publishing returns [`TickOutcome::Skipped`]
    /// immediately instead of overlapping it.
    ///
    /// # Errors
    ///
    /// Only store failures on the tick-level queries surface here;
    /// failures while processing an individual post are logged and
    /// counted, and the post is left for the lease to recover.
    pub async fn tick(&self) -> Result<TickOutcome> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Previous tick still running, skipping");
            return Ok(TickOutcome::Skipped);
        }
        let _guard = TickGuard(&self.running);

        let now = chrono::Utc::now().timestamp();
        let mut summary = TickSummary::default();

        summary.released = self
            .posts
            .release_stale_claims(now, self.config.claim_lease_secs)
            .await?;
        if summary.released > 0 {
            warn!(
                "Released {} expired claims back to the queue",
                summary.released
            );
        }

        let due = self.posts.find_due_posts(now, self.config.batch_size).await?;
        summary.due = due.len();

        if due.is_empty() {
            return Ok(TickOutcome::Completed(summary));
        }

        info!("Dispatching {} due posts", summary.due);

        for post in due {
            let post_id = post.id.clone();
            match self.process_post(post, now).await {
                Ok(Some(PostStatus::Posted)) => summary.published += 1,
                Ok(Some(_)) => summary.failed += 1,
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    // The post keeps its claim; the lease returns it to
                    // the queue if this store failure persists.
                    warn!("Dispatch of post {} hit a store error: {}", post_id, e);
                    summary.skipped += 1;
                }
            }
        }

        self.events.emit(Event::TickCompleted {
            due: summary.due,
            published: summary.published,
            failed: summary.failed,
            skipped: summary.skipped,
        });

        Ok(TickOutcome::Completed(summary))
    }

    /// Dispatch a single due post.
    ///
    /// Returns the committed aggregate status, or `None` when the post
    /// could not be claimed or the claim was lost before commit.
    async fn process_post(&self, mut post: Post, now: i64) -> Result<Option<PostStatus>> {
        if !self.posts.claim_post(&post.id, now).await? {
            // Cancelled or taken by someone else between the due query
            // and here; the queue state already reflects it.
            debug!("Lost the claim on post {}, skipping", post.id);
            return Ok(None);
        }

        info!(
            "Dispatching post {} ({} targets)",
            post.id,
            post.targets.len()
        );

        let results = self.publish_targets(&post).await;

        // Fold this attempt into the in-memory copy so the aggregate
        // also counts targets delivered by an earlier attempt.
        for result in &results {
            if let Some(target) = post
                .targets
                .iter_mut()
                .find(|t| t.id == Some(result.target_id))
            {
                if result.success {
                    if let Some(external_id) = &result.external_post_id {
                        target.mark_posted(external_id.clone(), now);
                    }
                } else {
                    target.mark_failed(result.error.clone().unwrap_or_default());
                }
            }
        }

        let aggregate = aggregate_status(&post.targets);
        let committed_at = chrono::Utc::now().timestamp();

        if !self
            .posts
            .commit_dispatch_result(&post.id, &results, aggregate, committed_at)
            .await?
        {
            warn!(
                "Claim on post {} expired before commit, dropping results",
                post.id
            );
            return Ok(None);
        }

        let published = results.iter().filter(|r| r.success).count();
        let failed = results.len() - published;

        if aggregate == PostStatus::Posted {
            info!(
                "Post {} published ({} delivered, {} failed)",
                post.id, published, failed
            );
            self.events.emit(Event::PostPublished {
                post_id: post.id.clone(),
                user_id: post.user_id.clone(),
                published,
                failed,
            });
        } else {
            warn!("Post {} failed on every target", post.id);
            let error = results.iter().find_map(|r| r.error.clone());
            self.events.emit(Event::PostFailed {
                post_id: post.id.clone(),
                user_id: post.user_id.clone(),
                error,
            });
        }

        Ok(Some(aggregate))
    }

    /// Publish every pending target concurrently, one result per target
    /// attempted. Targets already `posted` are skipped so a redispatch
    /// never delivers twice.
    async fn publish_targets(&self, post: &Post) -> Vec<TargetResult> {
        let futures: Vec<_> = post
            .targets
            .iter()
            .filter(|t| t.status != TargetStatus::Posted)
            .filter_map(|t| t.id.map(|id| (id, t.platform, t.account_id.clone())))
            .map(|(target_id, platform, account_id)| async move {
                match self.publish_one(post, platform, &account_id).await {
                    Ok(external_id) => {
                        info!("Published post {} to {}: {}", post.id, platform, external_id);
                        TargetResult {
                            target_id,
                            platform,
                            success: true,
                            external_post_id: Some(external_id),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!("Failed to publish post {} to {}: {}", post.id, platform, e);
                        TargetResult {
                            target_id,
                            platform,
                            success: false,
                            external_post_id: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();

        join_all(futures).await
    }

    /// Resolve the publisher and account for one target and deliver.
    async fn publish_one(
        &self,
        post: &Post,
        platform: Platform,
        account_id: &str,
    ) -> std::result::Result<String, PublishError> {
        let publisher = self.registry.get(platform).ok_or_else(|| {
            PublishError::Validation(format!("no publisher enabled for {platform}"))
        })?;

        let account = self
            .accounts
            .get_account(account_id)
            .await
            .map_err(|e| PublishError::Api(format!("account lookup failed: {e}")))?
            .ok_or_else(|| {
                PublishError::Authentication(format!("account {account_id} is not linked"))
            })?;

        if account.user_id != post.user_id {
            return Err(PublishError::Authentication(format!(
                "account {account_id} belongs to another user"
            )));
        }

        if !account.active {
            return Err(PublishError::Authentication(format!(
                "account {account_id} has been disconnected"
            )));
        }

        publisher.validate(post)?;

        self.publish_with_retry(publisher.as_ref(), post, &account)
            .await
    }

    /// Publish with exponential backoff (1s, 2s, 4s) on transient
    /// errors, each attempt bounded by the publish timeout.
    async fn publish_with_retry(
        &self,
        publisher: &dyn Publisher,
        post: &Post,
        account: &SocialAccount,
    ) -> std::result::Result<String, PublishError> {
        let max_attempts = self.config.retry_attempts.max(1);
        let attempt_timeout = Duration::from_secs(self.config.publish_timeout_secs);
        let platform = publisher.platform();

        for attempt in 1..=max_attempts {
            let result = match timeout(attempt_timeout, publisher.publish(post, account)).await {
                Ok(result) => result,
                Err(_) => Err(PublishError::Timeout(format!(
                    "no response from {platform} within {}s",
                    attempt_timeout.as_secs()
                ))),
            };

            match result {
                Ok(external_id) => {
                    if attempt > 1 {
                        info!("Published to {} on attempt {}", platform, attempt);
                    }
                    return Ok(external_id);
                }
                Err(e) => {
                    if e.is_transient() && attempt < max_attempts {
                        let delay_secs = 2_u64.pow(attempt - 1);
                        warn!(
                            "Transient error publishing to {} (attempt {}/{}): {}. Retrying in {}s...",
                            platform, attempt, max_attempts, e, delay_secs
                        );
                        sleep(Duration::from_secs(delay_secs)).await;
                    } else {
                        if attempt == max_attempts {
                            warn!(
                                "Failed to publish to {} after {} attempts: {}",
                                platform, max_attempts, e
                            );
                        }
                        return Err(e);
                    }
                }
            }
        }

        // Unreachable: the loop always returns
        Err(PublishError::Api(format!(
            "failed to publish to {platform} after {max_attempts} attempts"
        )))
    }
}
