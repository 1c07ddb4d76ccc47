//! LinkedIn publisher
//!
//! Creates UGC posts on behalf of a member. Images are registered and
//! uploaded to LinkedIn's asset store first, then referenced from the
//! share by asset URN. Video upload is not supported here.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::PlatformConfig;
use crate::error::PublishError;
use crate::platforms::{api_error, fetch_media, Publisher};
use crate::types::{MediaAttachment, MediaKind, Platform, Post, SocialAccount};

const API_BASE: &str = "https://api.linkedin.com";
const CHARACTER_LIMIT: usize = 3000;

pub struct LinkedinPublisher {
    http: Client,
    api_base: String,
}

impl LinkedinPublisher {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| API_BASE.to_string()),
        }
    }

    /// Register an upload slot, push the image bytes to it, and return
    /// the asset URN to reference from the share.
    async fn upload_image(
        &self,
        author: &str,
        token: &str,
        media: &MediaAttachment,
    ) -> Result<String, PublishError> {
        let register = serde_json::json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
                "owner": author,
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent"
                }]
            }
        });

        let resp = self
            .http
            .post(format!("{}/v2/assets?action=registerUpload", self.api_base))
            .bearer_auth(token)
            .json(&register)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let registered: RegisterUploadResponse = resp.json().await?;
        let upload_url = registered.value.upload_mechanism.media_upload.upload_url;
        let asset = registered.value.asset;

        let bytes = fetch_media(&self.http, &media.url).await?;

        let resp = self
            .http
            .put(upload_url)
            .bearer_auth(token)
            .body(bytes)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        Ok(asset)
    }
}

#[async_trait]
impl Publisher for LinkedinPublisher {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    fn validate(&self, post: &Post) -> Result<(), PublishError> {
        if post.content.trim().is_empty() {
            return Err(PublishError::Validation(
                "content cannot be empty".to_string(),
            ));
        }
        let chars = post.content.chars().count();
        if chars > CHARACTER_LIMIT {
            return Err(PublishError::Validation(format!(
                "content is {chars} characters, linkedin allows {CHARACTER_LIMIT}"
            )));
        }
        if post.media.iter().any(|m| m.kind == MediaKind::Video) {
            return Err(PublishError::Validation(
                "linkedin video upload is not supported".to_string(),
            ));
        }
        Ok(())
    }

    async fn publish(
        &self,
        post: &Post,
        account: &SocialAccount,
    ) -> Result<String, PublishError> {
        let author = format!("urn:li:person:{}", account.external_id);
        let token = &account.access_token;

        let mut assets = Vec::with_capacity(post.media.len());
        for media in post
            .media
            .iter()
            .filter(|m| matches!(m.kind, MediaKind::Image | MediaKind::Gif))
        {
            assets.push(self.upload_image(&author, token, media).await?);
        }

        let share_content = if assets.is_empty() {
            serde_json::json!({
                "shareCommentary": { "text": post.content },
                "shareMediaCategory": "NONE"
            })
        } else {
            let media: Vec<_> = assets
                .iter()
                .map(|asset| {
                    serde_json::json!({
                        "status": "READY",
                        "media": asset
                    })
                })
                .collect();
            serde_json::json!({
                "shareCommentary": { "text": post.content },
                "shareMediaCategory": "IMAGE",
                "media": media
            })
        };

        let body = serde_json::json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share_content },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
        });

        let resp = self
            .http
            .post(format!("{}/v2/ugcPosts", self.api_base))
            .bearer_auth(token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let created: UgcPostResponse = resp.json().await?;
        Ok(created.id)
    }
}

#[derive(Debug, Deserialize)]
struct RegisterUploadResponse {
    value: RegisterUploadValue,
}

#[derive(Debug, Deserialize)]
struct RegisterUploadValue {
    asset: String,
    #[serde(rename = "uploadMechanism")]
    upload_mechanism: UploadMechanism,
}

#[derive(Debug, Deserialize)]
struct UploadMechanism {
    #[serde(rename = "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest")]
    media_upload: MediaUploadRequest,
}

#[derive(Debug, Deserialize)]
struct MediaUploadRequest {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct UgcPostResponse {
    id: String,
}
