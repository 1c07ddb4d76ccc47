//! Database operations for Omnipost
//!
//! SQLite-backed persistence for posts, their per-platform delivery
//! targets, media attachments, and linked social accounts. The dispatch
//! loop consumes this through the [`PostStore`] and [`AccountStore`]
//! traits; the CLIs use the inherent CRUD methods directly.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, OmnipostError, Result};
use crate::store::{AccountStore, PostStore, TargetResult};
use crate::types::{
    Analytics, MediaAttachment, Platform, PlatformTarget, Post, PostStatus, SocialAccount,
    MAX_CONTENT_LENGTH,
};

/// Queue occupancy, one counter per post status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub draft: i64,
    pub scheduled: i64,
    pub posting: i64,
    pub posted: i64,
    pub failed: i64,
    pub cancelled: i64,
    /// Earliest `scheduled_at` still in the queue.
    pub next_due: Option<i64>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        // Use mode=rwc to allow creating the database file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Open an isolated in-memory database, for tests and ephemeral runs.
    ///
    /// The pool is capped at one connection: every pooled connection to
    /// `:memory:` would otherwise get its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ========================================================================
    // Post CRUD
    // ========================================================================

    /// Insert a post together with its targets and media.
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        check_content(&post.content)?;
        if post.status == PostStatus::Scheduled && post.targets.is_empty() {
            return Err(OmnipostError::InvalidInput(
                "a scheduled post needs at least one platform target".to_string(),
            ));
        }

        let tags = serde_json::to_string(&post.tags).map_err(DbError::Serialization)?;

        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, user_id, content, timezone, tags, status, scheduled_at,
                claimed_at, created_at, updated_at, views, likes, shares,
                comments, clicks
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(&post.timezone)
        .bind(&tags)
        .bind(post.status)
        .bind(post.scheduled_at)
        .bind(post.claimed_at)
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(post.analytics.views)
        .bind(post.analytics.likes)
        .bind(post.analytics.shares)
        .bind(post.analytics.comments)
        .bind(post.analytics.clicks)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        for (position, target) in post.targets.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO platform_targets (
                    post_id, platform, account_id, status, external_post_id,
                    error_message, posted_at, position
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&post.id)
            .bind(target.platform)
            .bind(&target.account_id)
            .bind(target.status)
            .bind(&target.external_post_id)
            .bind(&target.error_message)
            .bind(target.posted_at)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        for (position, media) in post.media.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO media_attachments (
                    post_id, kind, url, filename, size, mime_type, position
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&post.id)
            .bind(media.kind)
            .bind(&media.url)
            .bind(&media.filename)
            .bind(media.size)
            .bind(&media.mime_type)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a post by ID with its targets and media loaded.
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, content, timezone, tags, status, scheduled_at,
                   claimed_at, created_at, updated_at, views, likes, shares,
                   comments, clicks
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        match row {
            Some(row) => {
                let mut post = row_to_post(&row)?;
                post.targets = self.load_targets(post_id).await?;
                post.media = self.load_media(post_id).await?;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }

    /// Query posts with optional filters, upcoming first.
    ///
    /// Scheduled posts come back in due order; posts without a schedule
    /// follow, newest first.
    pub async fn list_posts(
        &self,
        user_id: Option<&str>,
        status: Option<PostStatus>,
        platform: Option<Platform>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        // Build the WHERE clause dynamically
        let mut where_clauses = vec!["1=1"];

        if user_id.is_some() {
            where_clauses.push("p.user_id = ?");
        }
        if status.is_some() {
            where_clauses.push("p.status = ?");
        }
        if platform.is_some() {
            where_clauses.push("t.platform = ?");
        }

        let where_clause = where_clauses.join(" AND ");

        let query_str = format!(
            r#"
            SELECT DISTINCT p.id
            FROM posts p
            LEFT JOIN platform_targets t ON p.id = t.post_id
            WHERE {}
            ORDER BY (p.scheduled_at IS NULL), p.scheduled_at ASC, p.created_at DESC
            LIMIT ?
            "#,
            where_clause
        );

        let mut query = sqlx::query(&query_str);

        // Bind parameters in the same order as WHERE clauses
        if let Some(user) = user_id {
            query = query.bind(user);
        }
        if let Some(status) = status {
            query = query.bind(status);
        }
        if let Some(platform) = platform {
            query = query.bind(platform);
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let post_ids: Vec<String> = rows.iter().map(|r| r.get("id")).collect();

        let mut results = Vec::new();
        for post_id in post_ids {
            if let Some(post) = self.get_post(&post_id).await? {
                results.push(post);
            }
        }

        Ok(results)
    }

    /// Update a post's editable fields (content, tags, timezone).
    ///
    /// Rejected once the post is `posted` or while a dispatch attempt
    /// holds the claim.
    pub async fn update_post(&self, post: &Post) -> Result<()> {
        check_content(&post.content)?;

        let tags = serde_json::to_string(&post.tags).map_err(DbError::Serialization)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE posts SET content = ?, tags = ?, timezone = ?, updated_at = ?
            WHERE id = ? AND status IN ('draft', 'scheduled', 'failed', 'cancelled')
            "#,
        )
        .bind(&post.content)
        .bind(&tags)
        .bind(&post.timezone)
        .bind(now)
        .bind(&post.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(self.post_state_error(&post.id, "updated").await);
        }

        Ok(())
    }

    /// Cancel a scheduled post.
    ///
    /// The compare-and-set against `scheduled` is what makes cancellation
    /// race-free with the dispatcher: whichever side flips the status
    /// first wins, the other sees zero rows.
    pub async fn cancel_post(&self, post_id: &str) -> Result<Post> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE posts SET status = 'cancelled', updated_at = ?
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(self.post_state_error(post_id, "cancelled").await);
        }

        self.require_post(post_id).await
    }

    /// Put a post back in the queue at a new time.
    ///
    /// Failed and draft targets return to `scheduled`; targets already
    /// `posted` are left alone so they are never published twice.
    pub async fn reschedule_post(&self, post_id: &str, scheduled_at: i64) -> Result<Post> {
        let now = chrono::Utc::now().timestamp();

        // A post may not reach `scheduled` without somewhere to go.
        let post = self.require_post(post_id).await?;
        if post.targets.is_empty() {
            return Err(DbError::InvalidState(format!(
                "post {post_id} has no targets and cannot be scheduled"
            ))
            .into());
        }

        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'scheduled', scheduled_at = ?, claimed_at = NULL, updated_at = ?
            WHERE id = ? AND status IN ('draft', 'scheduled', 'failed', 'cancelled')
            "#,
        )
        .bind(scheduled_at)
        .bind(now)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            drop(tx);
            return Err(self.post_state_error(post_id, "rescheduled").await);
        }

        sqlx::query(
            r#"
            UPDATE platform_targets SET status = 'scheduled', error_message = NULL
            WHERE post_id = ? AND status IN ('draft', 'failed')
            "#,
        )
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;

        self.require_post(post_id).await
    }

    /// Delete a post; targets and media go with it.
    ///
    /// Refused while the post is mid-dispatch.
    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ? AND status != 'posting'")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(self.post_state_error(post_id, "deleted").await);
        }

        Ok(())
    }

    /// Count posts by status and find the next due time.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM posts GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut stats = QueueStats::default();
        for row in &rows {
            let status: PostStatus = row.get("status");
            let count: i64 = row.get("count");
            match status {
                PostStatus::Draft => stats.draft = count,
                PostStatus::Scheduled => stats.scheduled = count,
                PostStatus::Posting => stats.posting = count,
                PostStatus::Posted => stats.posted = count,
                PostStatus::Failed => stats.failed = count,
                PostStatus::Cancelled => stats.cancelled = count,
            }
        }

        stats.next_due = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MIN(scheduled_at) FROM posts WHERE status = 'scheduled'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(stats)
    }

    // ========================================================================
    // Social accounts
    // ========================================================================

    /// Insert or refresh a linked account.
    ///
    /// Conflict on (user, platform, external account) updates the stored
    /// credentials in place, which is what a re-run OAuth flow wants.
    pub async fn upsert_account(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts (
                id, user_id, platform, external_id, account_name, access_token,
                refresh_token, token_expires_at, active, connected_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, platform, external_id) DO UPDATE SET
                account_name = excluded.account_name,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expires_at = excluded.token_expires_at,
                active = excluded.active
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(account.platform)
        .bind(&account.external_id)
        .bind(&account.account_name)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.token_expires_at)
        .bind(account.active)
        .bind(account.connected_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// The user's most recently connected active account on a platform.
    pub async fn find_account(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, external_id, account_name, access_token,
                   refresh_token, token_expires_at, active, connected_at
            FROM social_accounts
            WHERE user_id = ? AND platform = ? AND active = 1
            ORDER BY connected_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| row_to_account(&r)))
    }

    /// All accounts linked by a user, active or not.
    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<SocialAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, platform, external_id, account_name, access_token,
                   refresh_token, token_expires_at, active, connected_at
            FROM social_accounts
            WHERE user_id = ?
            ORDER BY platform, connected_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    async fn load_targets(&self, post_id: &str) -> Result<Vec<PlatformTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, account_id, status, external_post_id,
                   error_message, posted_at
            FROM platform_targets
            WHERE post_id = ?
            ORDER BY position, id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(row_to_target).collect())
    }

    async fn load_media(&self, post_id: &str) -> Result<Vec<MediaAttachment>> {
        let rows = sqlx::query(
            r#"
            SELECT kind, url, filename, size, mime_type
            FROM media_attachments
            WHERE post_id = ?
            ORDER BY position, id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(row_to_media).collect())
    }

    async fn require_post(&self, post_id: &str) -> Result<Post> {
        self.get_post(post_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("post {post_id}")).into())
    }

    /// Build the error for a zero-row CAS update: the post either does
    /// not exist or sits in a state the operation does not accept.
    async fn post_state_error(&self, post_id: &str, verb: &str) -> OmnipostError {
        match self.get_post(post_id).await {
            Ok(Some(post)) => DbError::InvalidState(format!(
                "post {post_id} is {} and cannot be {verb}",
                post.status
            ))
            .into(),
            Ok(None) => DbError::NotFound(format!("post {post_id}")).into(),
            Err(e) => e,
        }
    }
}

// ============================================================================
// Dispatch-facing store implementations
// ============================================================================

#[async_trait]
impl PostStore for Database {
    async fn find_due_posts(&self, now: i64, limit: u32) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, timezone, tags, status, scheduled_at,
                   claimed_at, created_at, updated_at, views, likes, shares,
                   comments, clicks
            FROM posts
            WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut post = row_to_post(row)?;
            post.targets = self.load_targets(&post.id).await?;
            post.media = self.load_media(&post.id).await?;
            posts.push(post);
        }

        Ok(posts)
    }

    async fn claim_post(&self, post_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET status = 'posting', claimed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_stale_claims(&self, now: i64, lease_secs: u64) -> Result<u64> {
        let cutoff = now - lease_secs as i64;

        let result = sqlx::query(
            r#"
            UPDATE posts SET status = 'scheduled', claimed_at = NULL, updated_at = ?
            WHERE status = 'posting' AND claimed_at IS NOT NULL AND claimed_at <= ?
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    async fn commit_dispatch_result(
        &self,
        post_id: &str,
        results: &[TargetResult],
        aggregate: PostStatus,
        now: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        // The post row goes first: if the claim lease expired and someone
        // else took over, nothing of this attempt may land.
        let claimed = sqlx::query(
            r#"
            UPDATE posts SET status = ?, claimed_at = NULL, updated_at = ?
            WHERE id = ? AND status = 'posting'
            "#,
        )
        .bind(aggregate)
        .bind(now)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        if claimed.rows_affected() == 0 {
            return Ok(false);
        }

        for result in results {
            if result.success {
                sqlx::query(
                    r#"
                    UPDATE platform_targets
                    SET status = 'posted', external_post_id = ?, error_message = NULL, posted_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&result.external_post_id)
                .bind(now)
                .bind(result.target_id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;
            } else {
                sqlx::query(
                    r#"
                    UPDATE platform_targets SET status = 'failed', error_message = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&result.error)
                .bind(result.target_id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;
            }
        }

        tx.commit().await.map_err(DbError::SqlxError)?;

        Ok(true)
    }
}

#[async_trait]
impl AccountStore for Database {
    async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, external_id, account_name, access_token,
                   refresh_token, token_expires_at, active, connected_at
            FROM social_accounts
            WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| row_to_account(&r)))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn check_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(OmnipostError::InvalidInput(
            "post content cannot be empty".to_string(),
        ));
    }
    let chars = content.chars().count();
    if chars > MAX_CONTENT_LENGTH {
        return Err(OmnipostError::InvalidInput(format!(
            "post content is {chars} characters, the maximum is {MAX_CONTENT_LENGTH}"
        )));
    }
    Ok(())
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    let tags_json: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(DbError::Serialization)?;

    Ok(Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content: row.get("content"),
        media: Vec::new(),
        targets: Vec::new(),
        tags,
        timezone: row.get("timezone"),
        status: row.get("status"),
        scheduled_at: row.get("scheduled_at"),
        claimed_at: row.get("claimed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        analytics: Analytics {
            views: row.get("views"),
            likes: row.get("likes"),
            shares: row.get("shares"),
            comments: row.get("comments"),
            clicks: row.get("clicks"),
        },
    })
}

fn row_to_target(row: &SqliteRow) -> PlatformTarget {
    PlatformTarget {
        id: row.get("id"),
        post_id: row.get("post_id"),
        platform: row.get("platform"),
        account_id: row.get("account_id"),
        status: row.get("status"),
        external_post_id: row.get("external_post_id"),
        error_message: row.get("error_message"),
        posted_at: row.get("posted_at"),
    }
}

fn row_to_media(row: &SqliteRow) -> MediaAttachment {
    MediaAttachment {
        kind: row.get("kind"),
        url: row.get("url"),
        filename: row.get("filename"),
        size: row.get("size"),
        mime_type: row.get("mime_type"),
    }
}

fn row_to_account(row: &SqliteRow) -> SocialAccount {
    SocialAccount {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform: row.get("platform"),
        external_id: row.get("external_id"),
        account_name: row.get("account_name"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        token_expires_at: row.get("token_expires_at"),
        active: row.get::<i32, _>("active") != 0,
        connected_at: row.get("connected_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MediaKind, TargetStatus};

    async fn test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    fn draft_post(user_id: &str, content: &str) -> Post {
        Post::new(user_id.to_string(), content.to_string())
    }

    /// A scheduled post with one twitter target, due at `scheduled_at`.
    fn scheduled_post(user_id: &str, content: &str, scheduled_at: i64) -> Post {
        let mut post = draft_post(user_id, content);
        post.targets.push(PlatformTarget {
            id: None,
            post_id: post.id.clone(),
            platform: Platform::Twitter,
            account_id: "acct-1".to_string(),
            status: TargetStatus::Scheduled,
            external_post_id: None,
            error_message: None,
            posted_at: None,
        });
        post.status = PostStatus::Scheduled;
        post.scheduled_at = Some(scheduled_at);
        post
    }

    fn add_target(post: &mut Post, platform: Platform, account_id: &str, status: TargetStatus) {
        post.targets.push(PlatformTarget {
            id: None,
            post_id: post.id.clone(),
            platform,
            account_id: account_id.to_string(),
            status,
            external_post_id: None,
            error_message: None,
            posted_at: None,
        });
    }

    #[tokio::test]
    async fn test_create_and_retrieve_post_round_trip() {
        let db = test_db().await;

        let mut post = scheduled_post("user-1", "Launch day!", 1_750_000_000);
        add_target(&mut post, Platform::Linkedin, "acct-2", TargetStatus::Scheduled);
        post.tags = vec!["launch".to_string(), "product".to_string()];
        post.media.push(MediaAttachment::new(
            MediaKind::Image,
            "https://cdn.example.com/launch.png".to_string(),
        ));

        db.create_post(&post).await.unwrap();

        let retrieved = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, post.id);
        assert_eq!(retrieved.user_id, "user-1");
        assert_eq!(retrieved.content, "Launch day!");
        assert_eq!(retrieved.status, PostStatus::Scheduled);
        assert_eq!(retrieved.scheduled_at, Some(1_750_000_000));
        assert_eq!(retrieved.tags, post.tags);
        assert_eq!(retrieved.timezone, "UTC");

        assert_eq!(retrieved.targets.len(), 2);
        assert_eq!(retrieved.targets[0].platform, Platform::Twitter);
        assert_eq!(retrieved.targets[1].platform, Platform::Linkedin);
        assert!(retrieved.targets.iter().all(|t| t.id.is_some()));

        assert_eq!(retrieved.media.len(), 1);
        assert_eq!(retrieved.media[0].kind, MediaKind::Image);
    }

    #[tokio::test]
    async fn test_get_nonexistent_post_returns_none() {
        let db = test_db().await;
        let result = db.get_post("no-such-post").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_create_post_rejects_empty_content() {
        let db = test_db().await;
        let post = draft_post("user-1", "   ");

        let result = db.create_post(&post).await;
        assert!(matches!(result, Err(OmnipostError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_create_post_rejects_oversized_content() {
        let db = test_db().await;
        let post = draft_post("user-1", &"x".repeat(MAX_CONTENT_LENGTH + 1));

        let result = db.create_post(&post).await;
        assert!(matches!(result, Err(OmnipostError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_create_scheduled_post_requires_targets() {
        let db = test_db().await;
        let mut post = draft_post("user-1", "No targets");
        post.status = PostStatus::Scheduled;
        post.scheduled_at = Some(1_750_000_000);

        let result = db.create_post(&post).await;
        assert!(matches!(result, Err(OmnipostError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_duplicate_post_id_fails_and_db_stays_usable() {
        let db = test_db().await;

        let post = draft_post("user-1", "original");
        db.create_post(&post).await.unwrap();

        let mut duplicate = draft_post("user-1", "duplicate");
        duplicate.id = post.id.clone();
        assert!(db.create_post(&duplicate).await.is_err());

        // Original survives, database still functional
        let retrieved = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(retrieved.content, "original");

        let another = draft_post("user-1", "another");
        db.create_post(&another).await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_key_constraint_on_targets() {
        let db = test_db().await;

        let result = sqlx::query(
            r#"
            INSERT INTO platform_targets (post_id, platform, account_id, status)
            VALUES ('nonexistent-post', 'twitter', 'acct-1', 'scheduled')
            "#,
        )
        .execute(&db.pool)
        .await;

        assert!(result.is_err(), "expected foreign key violation");
    }

    #[tokio::test]
    async fn test_list_posts_filters_and_order() {
        let db = test_db().await;

        let later = scheduled_post("user-1", "later", 2_000_000_000);
        let sooner = scheduled_post("user-1", "sooner", 1_900_000_000);
        let other_user = scheduled_post("user-2", "other", 1_950_000_000);
        let draft = draft_post("user-1", "a draft");

        db.create_post(&later).await.unwrap();
        db.create_post(&sooner).await.unwrap();
        db.create_post(&other_user).await.unwrap();
        db.create_post(&draft).await.unwrap();

        // User filter plus due ordering, drafts last
        let posts = db.list_posts(Some("user-1"), None, None, 10).await.unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].content, "sooner");
        assert_eq!(posts[1].content, "later");
        assert_eq!(posts[2].content, "a draft");

        // Status filter
        let drafts = db
            .list_posts(Some("user-1"), Some(PostStatus::Draft), None, 10)
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].content, "a draft");

        // Platform filter only matches posts with a matching target
        let twitter = db
            .list_posts(None, None, Some(Platform::Twitter), 10)
            .await
            .unwrap();
        assert_eq!(twitter.len(), 3);
        let tiktok = db
            .list_posts(None, None, Some(Platform::Tiktok), 10)
            .await
            .unwrap();
        assert!(tiktok.is_empty());

        // Limit
        let limited = db.list_posts(Some("user-1"), None, None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_update_post_editable() {
        let db = test_db().await;

        let mut post = draft_post("user-1", "before");
        db.create_post(&post).await.unwrap();

        post.content = "after".to_string();
        post.tags = vec!["edited".to_string()];
        db.update_post(&post).await.unwrap();

        let retrieved = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(retrieved.content, "after");
        assert_eq!(retrieved.tags, vec!["edited".to_string()]);
    }

    #[tokio::test]
    async fn test_update_post_rejected_once_posted() {
        let db = test_db().await;

        let mut post = draft_post("user-1", "shipped");
        db.create_post(&post).await.unwrap();
        sqlx::query("UPDATE posts SET status = 'posted' WHERE id = ?")
            .bind(&post.id)
            .execute(&db.pool)
            .await
            .unwrap();

        post.content = "rewrite history".to_string();
        let result = db.update_post(&post).await;
        assert!(matches!(
            result,
            Err(OmnipostError::Database(DbError::InvalidState(_)))
        ));
    }

    #[tokio::test]
    async fn test_update_nonexistent_post() {
        let db = test_db().await;
        let post = draft_post("user-1", "ghost");

        let result = db.update_post(&post).await;
        assert!(matches!(
            result,
            Err(OmnipostError::Database(DbError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancel_scheduled_post() {
        let db = test_db().await;

        let post = scheduled_post("user-1", "cancel me", 1_900_000_000);
        db.create_post(&post).await.unwrap();

        let cancelled = db.cancel_post(&post.id).await.unwrap();
        assert_eq!(cancelled.status, PostStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_rejected_for_draft_and_posted() {
        let db = test_db().await;

        let draft = draft_post("user-1", "still drafting");
        db.create_post(&draft).await.unwrap();
        assert!(matches!(
            db.cancel_post(&draft.id).await,
            Err(OmnipostError::Database(DbError::InvalidState(_)))
        ));

        let post = scheduled_post("user-1", "already out", 1_900_000_000);
        db.create_post(&post).await.unwrap();
        sqlx::query("UPDATE posts SET status = 'posted' WHERE id = ?")
            .bind(&post.id)
            .execute(&db.pool)
            .await
            .unwrap();
        assert!(matches!(
            db.cancel_post(&post.id).await,
            Err(OmnipostError::Database(DbError::InvalidState(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancel_nonexistent_post() {
        let db = test_db().await;
        assert!(matches!(
            db.cancel_post("no-such-post").await,
            Err(OmnipostError::Database(DbError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_reschedule_resets_failed_targets_but_not_posted() {
        let db = test_db().await;

        let mut post = scheduled_post("user-1", "second try", 1_900_000_000);
        add_target(&mut post, Platform::Facebook, "acct-2", TargetStatus::Scheduled);
        db.create_post(&post).await.unwrap();

        // Simulate a partial failure from an earlier dispatch
        sqlx::query("UPDATE posts SET status = 'failed' WHERE id = ?")
            .bind(&post.id)
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query(
            "UPDATE platform_targets SET status = 'posted', external_post_id = 'ext-1' \
             WHERE post_id = ? AND platform = 'twitter'",
        )
        .bind(&post.id)
        .execute(&db.pool)
        .await
        .unwrap();
        sqlx::query(
            "UPDATE platform_targets SET status = 'failed', error_message = 'rate limited' \
             WHERE post_id = ? AND platform = 'facebook'",
        )
        .bind(&post.id)
        .execute(&db.pool)
        .await
        .unwrap();

        let rescheduled = db.reschedule_post(&post.id, 1_950_000_000).await.unwrap();

        assert_eq!(rescheduled.status, PostStatus::Scheduled);
        assert_eq!(rescheduled.scheduled_at, Some(1_950_000_000));

        let twitter = rescheduled
            .targets
            .iter()
            .find(|t| t.platform == Platform::Twitter)
            .unwrap();
        assert_eq!(twitter.status, TargetStatus::Posted);
        assert_eq!(twitter.external_post_id, Some("ext-1".to_string()));

        let facebook = rescheduled
            .targets
            .iter()
            .find(|t| t.platform == Platform::Facebook)
            .unwrap();
        assert_eq!(facebook.status, TargetStatus::Scheduled);
        assert_eq!(facebook.error_message, None);
    }

    #[tokio::test]
    async fn test_reschedule_rejected_once_posted() {
        let db = test_db().await;

        let post = scheduled_post("user-1", "done", 1_900_000_000);
        db.create_post(&post).await.unwrap();
        sqlx::query("UPDATE posts SET status = 'posted' WHERE id = ?")
            .bind(&post.id)
            .execute(&db.pool)
            .await
            .unwrap();

        assert!(matches!(
            db.reschedule_post(&post.id, 1_950_000_000).await,
            Err(OmnipostError::Database(DbError::InvalidState(_)))
        ));
    }

    #[tokio::test]
    async fn test_reschedule_rejected_without_targets() {
        let db = test_db().await;

        let post = draft_post("user-1", "nowhere to go");
        db.create_post(&post).await.unwrap();

        let err = db.reschedule_post(&post.id, 1_950_000_000).await;
        assert!(matches!(
            err,
            Err(OmnipostError::Database(DbError::InvalidState(_)))
        ));

        let after = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(after.status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_delete_post_cascades() {
        let db = test_db().await;

        let mut post = scheduled_post("user-1", "delete me", 1_900_000_000);
        post.media.push(MediaAttachment::new(
            MediaKind::Video,
            "https://cdn.example.com/clip.mp4".to_string(),
        ));
        db.create_post(&post).await.unwrap();

        db.delete_post(&post.id).await.unwrap();

        assert!(db.get_post(&post.id).await.unwrap().is_none());

        let targets: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM platform_targets WHERE post_id = ?")
                .bind(&post.id)
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(targets, 0);

        let media: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM media_attachments WHERE post_id = ?")
                .bind(&post.id)
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(media, 0);
    }

    #[tokio::test]
    async fn test_delete_rejected_mid_posting() {
        let db = test_db().await;

        let post = scheduled_post("user-1", "in flight", 1_900_000_000);
        db.create_post(&post).await.unwrap();
        assert!(db.claim_post(&post.id, 1_900_000_100).await.unwrap());

        assert!(matches!(
            db.delete_post(&post.id).await,
            Err(OmnipostError::Database(DbError::InvalidState(_)))
        ));
    }

    #[tokio::test]
    async fn test_queue_stats() {
        let db = test_db().await;

        db.create_post(&draft_post("user-1", "draft")).await.unwrap();
        db.create_post(&scheduled_post("user-1", "one", 1_900_000_000))
            .await
            .unwrap();
        db.create_post(&scheduled_post("user-1", "two", 1_800_000_000))
            .await
            .unwrap();

        let stats = db.queue_stats().await.unwrap();
        assert_eq!(stats.draft, 1);
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.posted, 0);
        assert_eq!(stats.next_due, Some(1_800_000_000));
    }

    #[tokio::test]
    async fn test_queue_stats_empty() {
        let db = test_db().await;
        let stats = db.queue_stats().await.unwrap();
        assert_eq!(stats.scheduled, 0);
        assert_eq!(stats.next_due, None);
    }

    // ========================================================================
    // Dispatch-facing store behavior
    // ========================================================================

    #[tokio::test]
    async fn test_find_due_posts_selects_and_orders() {
        let db = test_db().await;
        let now = 1_900_000_000;

        let due_late = scheduled_post("user-1", "due late", now - 10);
        let due_early = scheduled_post("user-1", "due early", now - 100);
        let due_now = scheduled_post("user-1", "due now", now);
        let future = scheduled_post("user-1", "future", now + 60);
        let draft = draft_post("user-1", "draft");

        for post in [&due_late, &due_early, &due_now, &future, &draft] {
            db.create_post(post).await.unwrap();
        }

        // A cancelled post that would otherwise be due
        let cancelled = scheduled_post("user-1", "cancelled", now - 50);
        db.create_post(&cancelled).await.unwrap();
        db.cancel_post(&cancelled.id).await.unwrap();

        let due = db.find_due_posts(now, 100).await.unwrap();

        let contents: Vec<&str> = due.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["due early", "due late", "due now"]);
        assert!(due.iter().all(|p| !p.targets.is_empty()), "targets loaded");
    }

    #[tokio::test]
    async fn test_find_due_posts_respects_limit() {
        let db = test_db().await;
        let now = 1_900_000_000;

        for i in 0..5 {
            db.create_post(&scheduled_post("user-1", &format!("post {i}"), now - i))
                .await
                .unwrap();
        }

        let due = db.find_due_posts(now, 3).await.unwrap();
        assert_eq!(due.len(), 3);
    }

    #[tokio::test]
    async fn test_claim_post_single_winner() {
        let db = test_db().await;
        let now = 1_900_000_000;

        let post = scheduled_post("user-1", "claim me", now - 10);
        db.create_post(&post).await.unwrap();

        assert!(db.claim_post(&post.id, now).await.unwrap());
        // Second claim loses: the post is already posting
        assert!(!db.claim_post(&post.id, now).await.unwrap());

        let claimed = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, PostStatus::Posting);
        assert_eq!(claimed.claimed_at, Some(now));
    }

    #[tokio::test]
    async fn test_claim_post_requires_scheduled() {
        let db = test_db().await;
        let now = 1_900_000_000;

        let post = scheduled_post("user-1", "cancelled first", now - 10);
        db.create_post(&post).await.unwrap();
        db.cancel_post(&post.id).await.unwrap();

        assert!(!db.claim_post(&post.id, now).await.unwrap());
        assert!(!db.claim_post("no-such-post", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_stale_claims_honors_lease() {
        let db = test_db().await;
        let lease = 600u64;
        let now = 1_900_000_000;

        let stale = scheduled_post("user-1", "stale claim", now - 5_000);
        let fresh = scheduled_post("user-1", "fresh claim", now - 5_000);
        db.create_post(&stale).await.unwrap();
        db.create_post(&fresh).await.unwrap();

        assert!(db.claim_post(&stale.id, now - 700).await.unwrap());
        assert!(db.claim_post(&fresh.id, now - 30).await.unwrap());

        let released = db.release_stale_claims(now, lease).await.unwrap();
        assert_eq!(released, 1);

        let stale = db.get_post(&stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, PostStatus::Scheduled);
        assert_eq!(stale.claimed_at, None);

        let fresh = db.get_post(&fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, PostStatus::Posting);
    }

    #[tokio::test]
    async fn test_commit_dispatch_result_mixed() {
        let db = test_db().await;
        let now = 1_900_000_000;

        let mut post = scheduled_post("user-1", "mixed outcome", now - 10);
        add_target(&mut post, Platform::Facebook, "acct-2", TargetStatus::Scheduled);
        db.create_post(&post).await.unwrap();
        assert!(db.claim_post(&post.id, now).await.unwrap());

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        let results = vec![
            TargetResult {
                target_id: stored.targets[0].id.unwrap(),
                platform: Platform::Twitter,
                success: true,
                external_post_id: Some("tw-123".to_string()),
                error: None,
            },
            TargetResult {
                target_id: stored.targets[1].id.unwrap(),
                platform: Platform::Facebook,
                success: false,
                external_post_id: None,
                error: Some("Platform API error: token revoked".to_string()),
            },
        ];

        let committed = db
            .commit_dispatch_result(&post.id, &results, PostStatus::Posted, now + 5)
            .await
            .unwrap();
        assert!(committed);

        let after = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(after.status, PostStatus::Posted);
        assert_eq!(after.claimed_at, None);

        let twitter = after
            .targets
            .iter()
            .find(|t| t.platform == Platform::Twitter)
            .unwrap();
        assert_eq!(twitter.status, TargetStatus::Posted);
        assert_eq!(twitter.external_post_id, Some("tw-123".to_string()));
        assert_eq!(twitter.posted_at, Some(now + 5));

        let facebook = after
            .targets
            .iter()
            .find(|t| t.platform == Platform::Facebook)
            .unwrap();
        assert_eq!(facebook.status, TargetStatus::Failed);
        assert!(facebook
            .error_message
            .as_deref()
            .unwrap()
            .contains("token revoked"));
    }

    #[tokio::test]
    async fn test_commit_dispatch_result_requires_claim() {
        let db = test_db().await;
        let now = 1_900_000_000;

        let post = scheduled_post("user-1", "never claimed", now - 10);
        db.create_post(&post).await.unwrap();

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        let results = vec![TargetResult {
            target_id: stored.targets[0].id.unwrap(),
            platform: Platform::Twitter,
            success: true,
            external_post_id: Some("tw-999".to_string()),
            error: None,
        }];

        let committed = db
            .commit_dispatch_result(&post.id, &results, PostStatus::Posted, now)
            .await
            .unwrap();
        assert!(!committed, "commit without a claim must be refused");

        // Nothing was written
        let after = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(after.status, PostStatus::Scheduled);
        assert_eq!(after.targets[0].status, TargetStatus::Scheduled);
        assert_eq!(after.targets[0].external_post_id, None);
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    #[tokio::test]
    async fn test_upsert_account_insert_then_refresh() {
        let db = test_db().await;

        let account = SocialAccount::new(
            "user-1".to_string(),
            Platform::Twitter,
            "12345".to_string(),
            "brand".to_string(),
            "token-old".to_string(),
        );
        db.upsert_account(&account).await.unwrap();

        // Re-link the same external account with a fresh token
        let mut relinked = SocialAccount::new(
            "user-1".to_string(),
            Platform::Twitter,
            "12345".to_string(),
            "brand-renamed".to_string(),
            "token-new".to_string(),
        );
        relinked.refresh_token = Some("refresh-new".to_string());
        db.upsert_account(&relinked).await.unwrap();

        let accounts = db.list_accounts("user-1").await.unwrap();
        assert_eq!(accounts.len(), 1, "conflict must update in place");
        assert_eq!(accounts[0].id, account.id, "row identity is preserved");
        assert_eq!(accounts[0].access_token, "token-new");
        assert_eq!(accounts[0].account_name, "brand-renamed");
        assert_eq!(accounts[0].refresh_token, Some("refresh-new".to_string()));
    }

    #[tokio::test]
    async fn test_find_account_active_only() {
        let db = test_db().await;

        let mut inactive = SocialAccount::new(
            "user-1".to_string(),
            Platform::Instagram,
            "ig-1".to_string(),
            "old-account".to_string(),
            "token-1".to_string(),
        );
        inactive.active = false;
        inactive.connected_at = 1_800_000_000;
        db.upsert_account(&inactive).await.unwrap();

        assert!(db
            .find_account("user-1", Platform::Instagram)
            .await
            .unwrap()
            .is_none());

        let mut active = SocialAccount::new(
            "user-1".to_string(),
            Platform::Instagram,
            "ig-2".to_string(),
            "new-account".to_string(),
            "token-2".to_string(),
        );
        active.connected_at = 1_850_000_000;
        db.upsert_account(&active).await.unwrap();

        let found = db
            .find_account("user-1", Platform::Instagram)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.account_name, "new-account");
    }

    #[tokio::test]
    async fn test_get_account_by_id() {
        let db = test_db().await;

        let account = SocialAccount::new(
            "user-1".to_string(),
            Platform::Tiktok,
            "tt-1".to_string(),
            "clips".to_string(),
            "token".to_string(),
        );
        db.upsert_account(&account).await.unwrap();

        let found = db.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(found.id, account.id);
        assert_eq!(found.platform, Platform::Tiktok);
        assert!(found.active);

        assert!(db.get_account("missing").await.unwrap().is_none());
    }
}
