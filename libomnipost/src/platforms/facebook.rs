//! Facebook Page publisher
//!
//! Posts through the Graph API on behalf of a Page. The linked
//! account's `external_id` is the Page ID and its access token must be
//! a Page token.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::PlatformConfig;
use crate::error::PublishError;
use crate::platforms::{api_error, Publisher};
use crate::types::{MediaAttachment, MediaKind, Platform, Post, SocialAccount};

const API_BASE: &str = "https://graph.facebook.com/v19.0";
const CHARACTER_LIMIT: usize = 63_206;

pub struct FacebookPublisher {
    http: Client,
    api_base: String,
}

impl FacebookPublisher {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| API_BASE.to_string()),
        }
    }

    /// Upload a photo unpublished so it can be attached to the feed post.
    async fn upload_photo(
        &self,
        page_id: &str,
        token: &str,
        media: &MediaAttachment,
    ) -> Result<String, PublishError> {
        let resp = self
            .http
            .post(format!("{}/{}/photos", self.api_base, page_id))
            .query(&[
                ("url", media.url.as_str()),
                ("published", "false"),
                ("access_token", token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let wrapper: IdResponse = resp.json().await?;
        Ok(wrapper.id)
    }
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    async fn publish(
        &self,
        post: &Post,
        account: &SocialAccount,
    ) -> Result<String, PublishError> {
        let page_id = &account.external_id;
        let token = &account.access_token;

        // Video posts go through the dedicated endpoint; Graph fetches
        // the file from our URL itself.
        if let Some(video) = post.media.iter().find(|m| m.kind == MediaKind::Video) {
            let resp = self
                .http
                .post(format!("{}/{}/videos", self.api_base, page_id))
                .query(&[
                    ("file_url", video.url.as_str()),
                    ("description", post.content.as_str()),
                    ("access_token", token),
                ])
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(api_error(resp).await);
            }

            let wrapper: IdResponse = resp.json().await?;
            return Ok(wrapper.id);
        }

        let mut body = serde_json::json!({ "message": post.content });

        if !post.media.is_empty() {
            let mut attached = Vec::with_capacity(post.media.len());
            for media in &post.media {
                let photo_id = self.upload_photo(page_id, token, media).await?;
                attached.push(serde_json::json!({ "media_fbid": photo_id }));
            }
            body["attached_media"] = serde_json::Value::Array(attached);
        }

        let resp = self
            .http
            .post(format!("{}/{}/feed", self.api_base, page_id))
            .query(&[("access_token", token.as_str())])
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let wrapper: IdResponse = resp.json().await?;
        Ok(wrapper.id)
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}
