//! Storage traits the dispatch loop runs against
//!
//! The dispatcher only needs a narrow slice of what the database can do:
//! find due posts, claim them, commit outcomes, and look up accounts.
//! Expressing that slice as traits keeps the loop testable against
//! in-memory fakes and keeps CLI-only queries out of its reach.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Platform, PlatformTarget, Post, PostStatus, SocialAccount, TargetStatus};

/// Outcome of one publish attempt against one delivery target.
#[derive(Debug, Clone)]
pub struct TargetResult {
    /// Row ID of the target this result applies to.
    pub target_id: i64,
    pub platform: Platform,
    /// Whether the platform accepted the post.
    pub success: bool,
    /// Identifier assigned by the platform (if successful).
    pub external_post_id: Option<String>,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Derive a post's aggregate status from the full set of its targets.
///
/// A post with at least one delivered target counts as posted; the failed
/// targets stay visible on their own rows. Only a post where nothing went
/// out is failed. A post with no targets at all has nowhere to go and is
/// failed outright.
pub fn aggregate_status(targets: &[PlatformTarget]) -> PostStatus {
    if targets.is_empty() {
        PostStatus::Failed
    } else if targets.iter().all(|t| t.status == TargetStatus::Posted) {
        PostStatus::Posted
    } else if targets.iter().any(|t| t.status == TargetStatus::Posted) {
        // Partial success still counts as posted
        PostStatus::Posted
    } else {
        PostStatus::Failed
    }
}

/// Post persistence as seen by the dispatcher.
///
/// Implementations must make [`claim_post`](PostStore::claim_post) an
/// atomic compare-and-set so that two ticks (or two daemons sharing a
/// database) can never both win the same post.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// All scheduled posts whose time has come, oldest first.
    ///
    /// Returns posts with `status == scheduled` and `scheduled_at <= now`,
    /// ordered by `scheduled_at` ascending, with targets and media loaded.
    async fn find_due_posts(&self, now: i64, limit: u32) -> Result<Vec<Post>>;

    /// Atomically move a post from `scheduled` to `posting`, recording
    /// `now` as the claim time.
    ///
    /// Returns `false` when the post was no longer in `scheduled` (already
    /// claimed elsewhere, cancelled, or rescheduled), in which case the
    /// caller must skip it.
    async fn claim_post(&self, post_id: &str, now: i64) -> Result<bool>;

    /// Hand posts whose claim outlived its lease back to the queue.
    ///
    /// A `posting` row older than `lease_secs` means a dispatcher died
    /// mid-flight; moving it back to `scheduled` lets the next tick retry.
    /// Returns the number of posts released.
    async fn release_stale_claims(&self, now: i64, lease_secs: u64) -> Result<u64>;

    /// Persist the per-target outcomes of a dispatch attempt and the
    /// aggregate status derived from them, clearing the claim.
    ///
    /// All writes happen in one transaction: either every target row and
    /// the post row reflect this attempt, or none do and the post stays
    /// `posting` until the claim lease expires. Returns `false` without
    /// writing anything when the post is no longer `posting` (the claim
    /// lease expired and another dispatcher took over).
    async fn commit_dispatch_result(
        &self,
        post_id: &str,
        results: &[TargetResult],
        aggregate: PostStatus,
        now: i64,
    ) -> Result<bool>;
}

/// Account lookups as seen by the dispatcher.
///
/// The dispatch loop only ever reads accounts; linking and token refresh
/// belong to the OAuth flow that writes them.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch a linked account by its ID.
    async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>>;
}
