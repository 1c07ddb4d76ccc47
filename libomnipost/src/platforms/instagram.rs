//! Instagram publisher
//!
//! The Graph API publishes in two steps: create a media container,
//! then publish it. Instagram has no text-only posts, so at least one
//! attachment is required; several become a carousel.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::PlatformConfig;
use crate::error::PublishError;
use crate::platforms::{api_error, Publisher};
use crate::types::{MediaAttachment, MediaKind, Platform, Post, SocialAccount};

const API_BASE: &str = "https://graph.facebook.com/v19.0";
const CAPTION_LIMIT: usize = 2200;
const CAROUSEL_LIMIT: usize = 10;

pub struct InstagramPublisher {
    http: Client,
    api_base: String,
}

impl InstagramPublisher {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| API_BASE.to_string()),
        }
    }

    async fn create_container(
        &self,
        ig_user_id: &str,
        token: &str,
        media: &MediaAttachment,
        caption: Option<&str>,
        carousel_item: bool,
    ) -> Result<String, PublishError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        match media.kind {
            MediaKind::Image | MediaKind::Gif => params.push(("image_url", media.url.clone())),
            MediaKind::Video => {
                params.push(("video_url", media.url.clone()));
                params.push(("media_type", "REELS".to_string()));
            }
        }
        if let Some(caption) = caption {
            params.push(("caption", caption.to_string()));
        }
        if carousel_item {
            params.push(("is_carousel_item", "true".to_string()));
        }
        params.push(("access_token", token.to_string()));

        let resp = self
            .http
            .post(format!("{}/{}/media", self.api_base, ig_user_id))
            .query(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let wrapper: IdResponse = resp.json().await?;
        Ok(wrapper.id)
    }

    async fn create_carousel(
        &self,
        ig_user_id: &str,
        token: &str,
        children: &[String],
        caption: &str,
    ) -> Result<String, PublishError> {
        let children = children.join(",");

        let resp = self
            .http
            .post(format!("{}/{}/media", self.api_base, ig_user_id))
            .query(&[
                ("media_type", "CAROUSEL"),
                ("children", children.as_str()),
                ("caption", caption),
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
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CAPTION_LIMIT)
    }

    fn validate(&self, post: &Post) -> Result<(), PublishError> {
        if post.media.is_empty() {
            return Err(PublishError::Validation(
                "instagram posts need at least one image or video".to_string(),
            ));
        }
        if post.media.len() > CAROUSEL_LIMIT {
            return Err(PublishError::Validation(format!(
                "instagram carousels allow at most {CAROUSEL_LIMIT} items"
            )));
        }
        let chars = post.content.chars().count();
        if chars > CAPTION_LIMIT {
            return Err(PublishError::Validation(format!(
                "caption is {chars} characters, instagram allows {CAPTION_LIMIT}"
            )));
        }
        Ok(())
    }

    async fn publish(
        &self,
        post: &Post,
        account: &SocialAccount,
    ) -> Result<String, PublishError> {
        let ig_user_id = &account.external_id;
        let token = &account.access_token;

        let container_id = match post.media.as_slice() {
            [] => {
                return Err(PublishError::Validation(
                    "instagram posts need at least one image or video".to_string(),
                ))
            }
            [media] => {
                self.create_container(ig_user_id, token, media, Some(&post.content), false)
                    .await?
            }
            media => {
                let mut children = Vec::with_capacity(media.len());
                for item in media {
                    children.push(
                        self.create_container(ig_user_id, token, item, None, true)
                            .await?,
                    );
                }
                self.create_carousel(ig_user_id, token, &children, &post.content)
                    .await?
            }
        };

        let resp = self
            .http
            .post(format!("{}/{}/media_publish", self.api_base, ig_user_id))
            .query(&[
                ("creation_id", container_id.as_str()),
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

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}
