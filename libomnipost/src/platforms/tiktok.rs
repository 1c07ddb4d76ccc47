//! TikTok publisher
//!
//! Pushes a single video through the Content Posting API. TikTok pulls
//! the file from the attachment URL itself, so no bytes move through
//! this process.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::PlatformConfig;
use crate::error::PublishError;
use crate::platforms::{api_error, Publisher};
use crate::types::{MediaKind, Platform, Post, SocialAccount};

const API_BASE: &str = "https://open.tiktokapis.com";
const CAPTION_LIMIT: usize = 2200;

pub struct TiktokPublisher {
    http: Client,
    api_base: String,
}

impl TiktokPublisher {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| API_BASE.to_string()),
        }
    }
}

#[async_trait]
impl Publisher for TiktokPublisher {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CAPTION_LIMIT)
    }

    fn validate(&self, post: &Post) -> Result<(), PublishError> {
        match post.media.as_slice() {
            [media] if media.kind == MediaKind::Video => {}
            _ => {
                return Err(PublishError::Validation(
                    "tiktok posts need exactly one video".to_string(),
                ))
            }
        }
        let chars = post.content.chars().count();
        if chars > CAPTION_LIMIT {
            return Err(PublishError::Validation(format!(
                "caption is {chars} characters, tiktok allows {CAPTION_LIMIT}"
            )));
        }
        Ok(())
    }

    async fn publish(
        &self,
        post: &Post,
        account: &SocialAccount,
    ) -> Result<String, PublishError> {
        let video = post
            .media
            .iter()
            .find(|m| m.kind == MediaKind::Video)
            .ok_or_else(|| {
                PublishError::Validation("tiktok posts need exactly one video".to_string())
            })?;

        let body = serde_json::json!({
            "post_info": { "title": post.content },
            "source_info": {
                "source": "PULL_FROM_URL",
                "video_url": video.url
            }
        });

        let resp = self
            .http
            .post(format!("{}/v2/post/publish/video/init/", self.api_base))
            .bearer_auth(&account.access_token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let wrapper: InitResponse = resp.json().await?;
        Ok(wrapper.data.publish_id)
    }
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    data: InitData,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
}
