//! Core types for Omnipost

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum content length accepted for any post, regardless of platform.
/// Individual publishers enforce stricter limits.
pub const MAX_CONTENT_LENGTH: usize = 2000;

/// A post and its per-platform delivery state.
///
/// The post-level `status` is the aggregate; each [`PlatformTarget`]
/// carries its own status so partial multi-platform failure stays visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub media: Vec<MediaAttachment>,
    pub targets: Vec<PlatformTarget>,
    pub tags: Vec<String>,
    /// IANA timezone name the author composed in; `scheduled_at` itself
    /// is always UTC epoch seconds.
    pub timezone: String,
    pub status: PostStatus,
    pub scheduled_at: Option<i64>,
    /// Set while `status == posting`; the claim lease start.
    pub claimed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub analytics: Analytics,
}

impl Post {
    pub fn new(user_id: String, content: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            content,
            media: Vec::new(),
            targets: Vec::new(),
            tags: Vec::new(),
            timezone: "UTC".to_string(),
            status: PostStatus::Draft,
            scheduled_at: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
            analytics: Analytics::default(),
        }
    }

    /// Posts are editable until they reach `posted`, and never while a
    /// dispatch attempt holds the claim.
    pub fn is_editable(&self) -> bool {
        !matches!(self.status, PostStatus::Posted | PostStatus::Posting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Posting,
    Posted,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Posting => "posting",
            Self::Posted => "posted",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states never transition again without an explicit
    /// user-driven reschedule.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Posted | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "posting" => Ok(Self::Posting),
            "posted" => Ok(Self::Posted),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!(
                "unknown post status '{s}' (expected draft, scheduled, posting, posted, failed, or cancelled)"
            )),
        }
    }
}

// ============================================================================
// Platforms and delivery targets
// ============================================================================

/// The social platforms a post can be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Facebook,
    Instagram,
    Linkedin,
    Tiktok,
}

impl Platform {
    pub fn all() -> [Platform; 5] {
        [
            Self::Twitter,
            Self::Facebook,
            Self::Instagram,
            Self::Linkedin,
            Self::Tiktok,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Linkedin => "linkedin",
            Self::Tiktok => "tiktok",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Self::Twitter),
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "linkedin" => Ok(Self::Linkedin),
            "tiktok" => Ok(Self::Tiktok),
            _ => Err(format!(
                "unknown platform '{s}' (expected twitter, facebook, instagram, linkedin, or tiktok)"
            )),
        }
    }
}

/// One delivery obligation: this post, on this platform, through this
/// account. Status is independent of the parent post's aggregate status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTarget {
    /// Database row ID (None until persisted).
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: Platform,
    pub account_id: String,
    pub status: TargetStatus,
    /// Identifier assigned by the platform on success.
    pub external_post_id: Option<String>,
    pub error_message: Option<String>,
    pub posted_at: Option<i64>,
}

impl PlatformTarget {
    pub fn mark_posted(&mut self, external_post_id: String, posted_at: i64) {
        self.status = TargetStatus::Posted;
        self.external_post_id = Some(external_post_id);
        self.posted_at = Some(posted_at);
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, error_message: String) {
        self.status = TargetStatus::Failed;
        self.error_message = Some(error_message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Draft,
    Scheduled,
    Posted,
    Failed,
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Posted => write!(f, "posted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Media
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Gif,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Gif => "gif",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "gif" => Ok(Self::Gif),
            _ => Err(format!("unknown media kind '{s}' (expected image, video, or gif)")),
        }
    }
}

/// A media item attached to a post.
///
/// The bytes live wherever the upload service put them; this is only the
/// reference the publishers fetch from or hand to the platform APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub url: String,
    pub filename: Option<String>,
    pub size: Option<i64>,
    pub mime_type: Option<String>,
}

impl MediaAttachment {
    pub fn new(kind: MediaKind, url: String) -> Self {
        Self {
            kind,
            url,
            filename: None,
            size: None,
            mime_type: None,
        }
    }
}

// ============================================================================
// Accounts and analytics
// ============================================================================

/// A linked social account. Owned by the OAuth linking flow; the dispatch
/// loop only ever reads it (active check and credential lookup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    /// The platform's identifier for this account (page ID, member URN...).
    pub external_id: String,
    pub account_name: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub active: bool,
    pub connected_at: i64,
}

impl SocialAccount {
    pub fn new(
        user_id: String,
        platform: Platform,
        external_id: String,
        account_name: String,
        access_token: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform,
            external_id,
            account_name,
            access_token,
            refresh_token: None,
            token_expires_at: None,
            active: true,
            connected_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Engagement counters, written by the analytics feedback channel and
/// ignored by dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    pub views: i64,
    pub likes: i64,
    pub shares: i64,
    pub comments: i64,
    pub clicks: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_post_new_uuid_generation() {
        let post = Post::new("user-1".to_string(), "Test content".to_string());

        let uuid_result = uuid::Uuid::parse_str(&post.id);
        assert!(uuid_result.is_ok(), "Post ID should be a valid UUID");
        assert_eq!(uuid_result.unwrap().get_version(), Some(uuid::Version::Random));
    }

    #[test]
    fn test_post_new_unique_ids() {
        let post1 = Post::new("user-1".to_string(), "Content 1".to_string());
        let post2 = Post::new("user-1".to_string(), "Content 2".to_string());

        assert_ne!(post1.id, post2.id);
    }

    #[test]
    fn test_post_new_default_values() {
        let post = Post::new("user-1".to_string(), "Test content".to_string());

        assert_eq!(post.user_id, "user-1");
        assert_eq!(post.content, "Test content");
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.scheduled_at, None);
        assert_eq!(post.claimed_at, None);
        assert_eq!(post.timezone, "UTC");
        assert!(post.targets.is_empty());
        assert!(post.media.is_empty());
        assert!(post.tags.is_empty());
        assert_eq!(post.analytics, Analytics::default());
        assert!(post.created_at > 1_600_000_000);
        assert_eq!(post.created_at, post.updated_at);
    }

    #[test]
    fn test_post_editability_by_status() {
        let mut post = Post::new("user-1".to_string(), "content".to_string());

        for status in [
            PostStatus::Draft,
            PostStatus::Scheduled,
            PostStatus::Failed,
            PostStatus::Cancelled,
        ] {
            post.status = status;
            assert!(post.is_editable(), "{status} should be editable");
        }

        for status in [PostStatus::Posting, PostStatus::Posted] {
            post.status = status;
            assert!(!post.is_editable(), "{status} should not be editable");
        }
    }

    #[test]
    fn test_post_status_serialization_lowercase() {
        let json = serde_json::to_string(&PostStatus::Scheduled).unwrap();
        assert_eq!(json, r#""scheduled""#);

        let deserialized: PostStatus = serde_json::from_str(r#""cancelled""#).unwrap();
        assert_eq!(deserialized, PostStatus::Cancelled);
    }

    #[test]
    fn test_post_status_round_trip() {
        for status in [
            PostStatus::Draft,
            PostStatus::Scheduled,
            PostStatus::Posting,
            PostStatus::Posted,
            PostStatus::Failed,
            PostStatus::Cancelled,
        ] {
            let parsed = PostStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_post_status_from_str_rejects_unknown() {
        assert!(PostStatus::from_str("archived").is_err());
        assert!(PostStatus::from_str("").is_err());
    }

    #[test]
    fn test_post_status_terminality() {
        assert!(PostStatus::Posted.is_terminal());
        assert!(PostStatus::Cancelled.is_terminal());
        assert!(PostStatus::Failed.is_terminal());
        assert!(!PostStatus::Draft.is_terminal());
        assert!(!PostStatus::Scheduled.is_terminal());
        assert!(!PostStatus::Posting.is_terminal());
    }

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::all() {
            let parsed = Platform::from_str(&platform.to_string()).unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn test_platform_from_str_aliases_and_case() {
        assert_eq!(Platform::from_str("x").unwrap(), Platform::Twitter);
        assert_eq!(Platform::from_str("TikTok").unwrap(), Platform::Tiktok);
        assert!(Platform::from_str("myspace").is_err());
    }

    #[test]
    fn test_platform_serialization_lowercase() {
        let json = serde_json::to_string(&Platform::Linkedin).unwrap();
        assert_eq!(json, r#""linkedin""#);
    }

    #[test]
    fn test_target_mark_posted() {
        let mut target = PlatformTarget {
            id: Some(1),
            post_id: "post-123".to_string(),
            platform: Platform::Twitter,
            account_id: "acct-1".to_string(),
            status: TargetStatus::Scheduled,
            external_post_id: None,
            error_message: Some("stale error".to_string()),
            posted_at: None,
        };

        target.mark_posted("1790000000000000000".to_string(), 1_717_000_000);

        assert_eq!(target.status, TargetStatus::Posted);
        assert_eq!(
            target.external_post_id,
            Some("1790000000000000000".to_string())
        );
        assert_eq!(target.posted_at, Some(1_717_000_000));
        assert_eq!(target.error_message, None);
    }

    #[test]
    fn test_target_mark_failed() {
        let mut target = PlatformTarget {
            id: None,
            post_id: "post-123".to_string(),
            platform: Platform::Facebook,
            account_id: "acct-2".to_string(),
            status: TargetStatus::Scheduled,
            external_post_id: None,
            error_message: None,
            posted_at: None,
        };

        target.mark_failed("account inactive".to_string());

        assert_eq!(target.status, TargetStatus::Failed);
        assert_eq!(target.error_message, Some("account inactive".to_string()));
        assert_eq!(target.external_post_id, None);
        assert_eq!(target.posted_at, None);
    }

    #[test]
    fn test_media_kind_round_trip() {
        for kind in [MediaKind::Image, MediaKind::Video, MediaKind::Gif] {
            let parsed = MediaKind::from_str(&kind.to_string()).unwrap();
            assert_eq!(parsed, kind);
        }
        assert!(MediaKind::from_str("audio").is_err());
    }

    #[test]
    fn test_media_attachment_new() {
        let media = MediaAttachment::new(
            MediaKind::Image,
            "https://cdn.example.com/uploads/sunset.jpg".to_string(),
        );

        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.url, "https://cdn.example.com/uploads/sunset.jpg");
        assert_eq!(media.filename, None);
        assert_eq!(media.size, None);
        assert_eq!(media.mime_type, None);
    }

    #[test]
    fn test_social_account_new_defaults() {
        let account = SocialAccount::new(
            "user-1".to_string(),
            Platform::Instagram,
            "17841400000000000".to_string(),
            "brand.official".to_string(),
            "token-abc".to_string(),
        );

        assert!(uuid::Uuid::parse_str(&account.id).is_ok());
        assert!(account.active);
        assert_eq!(account.refresh_token, None);
        assert_eq!(account.token_expires_at, None);
        assert!(account.connected_at > 1_600_000_000);
    }

    #[test]
    fn test_post_serialization_round_trip() {
        let mut post = Post::new("user-9".to_string(), "Launch day!".to_string());
        post.tags = vec!["launch".to_string(), "product".to_string()];
        post.media
            .push(MediaAttachment::new(MediaKind::Gif, "https://cdn.example.com/a.gif".to_string()));
        post.targets.push(PlatformTarget {
            id: Some(7),
            post_id: post.id.clone(),
            platform: Platform::Tiktok,
            account_id: "acct-3".to_string(),
            status: TargetStatus::Scheduled,
            external_post_id: None,
            error_message: None,
            posted_at: None,
        });
        post.scheduled_at = Some(1_720_000_000);
        post.status = PostStatus::Scheduled;

        let json = serde_json::to_string(&post).unwrap();
        let deserialized: Post = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id, post.id);
        assert_eq!(deserialized.status, PostStatus::Scheduled);
        assert_eq!(deserialized.scheduled_at, post.scheduled_at);
        assert_eq!(deserialized.tags, post.tags);
        assert_eq!(deserialized.media.len(), 1);
        assert_eq!(deserialized.targets.len(), 1);
        assert_eq!(deserialized.targets[0].platform, Platform::Tiktok);
    }

    #[test]
    fn test_max_content_length_constant() {
        assert_eq!(MAX_CONTENT_LENGTH, 2000);
    }
}
