//! Twitter (X) publisher
//!
//! Tweets through the v2 API: JSON tweet creation, with image and gif
//! attachments uploaded beforehand via the multipart media endpoint and
//! referenced by media ID. Video needs the chunked upload flow and is
//! rejected in validation.

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;

use crate::config::PlatformConfig;
use crate::error::PublishError;
use crate::platforms::{api_error, fetch_media, Publisher};
use crate::types::{MediaAttachment, MediaKind, Platform, Post, SocialAccount};

const API_BASE: &str = "https://api.x.com";
const CHARACTER_LIMIT: usize = 280;

pub struct TwitterPublisher {
    http: Client,
    api_base: String,
}

impl TwitterPublisher {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| API_BASE.to_string()),
        }
    }

    /// Upload one attachment and return the media ID to reference from
    /// the tweet body.
    async fn upload_media(
        &self,
        token: &str,
        media: &MediaAttachment,
    ) -> Result<String, PublishError> {
        let bytes = fetch_media(&self.http, &media.url).await?;
        let mime = media.mime_type.clone().unwrap_or_else(|| match media.kind {
            MediaKind::Gif => "image/gif".to_string(),
            _ => "image/jpeg".to_string(),
        });
        let category = if media.kind == MediaKind::Gif {
            "tweet_gif"
        } else {
            "tweet_image"
        };

        let part = multipart::Part::bytes(bytes)
            .mime_str(&mime)
            .map_err(|e| PublishError::Validation(format!("invalid mime type {mime}: {e}")))?;

        let form = multipart::Form::new()
            .text("media_category", category)
            .text("media_type", mime)
            .part("media", part);

        let resp = self
            .http
            .post(format!("{}/2/media/upload", self.api_base))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let wrapper: MediaUploadResponse = resp.json().await?;
        Ok(wrapper.data.id)
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn platform(&self) -> Platform {
        Platform::Twitter
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
                "content is {chars} characters, twitter allows {CHARACTER_LIMIT}"
            )));
        }
        if post.media.iter().any(|m| m.kind == MediaKind::Video) {
            return Err(PublishError::Validation(
                "twitter video upload is not supported".to_string(),
            ));
        }
        Ok(())
    }

    async fn publish(
        &self,
        post: &Post,
        account: &SocialAccount,
    ) -> Result<String, PublishError> {
        let mut body = serde_json::json!({ "text": post.content });

        let mut media_ids = Vec::new();
        for media in post
            .media
            .iter()
            .filter(|m| matches!(m.kind, MediaKind::Image | MediaKind::Gif))
        {
            media_ids.push(self.upload_media(&account.access_token, media).await?);
        }
        if !media_ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": media_ids });
        }

        let resp = self
            .http
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(&account.access_token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let wrapper: TweetResponse = resp.json().await?;
        Ok(wrapper.data.id)
    }
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    data: MediaUploadData,
}

#[derive(Debug, Deserialize)]
struct MediaUploadData {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_limit() {
        let publisher = TwitterPublisher::new(&PlatformConfig::default());
        assert_eq!(publisher.character_limit(), Some(280));
        assert_eq!(publisher.platform(), Platform::Twitter);
    }

    #[test]
    fn test_validate_enforces_tweet_length() {
        let publisher = TwitterPublisher::new(&PlatformConfig::default());

        let short = Post::new("user-1".to_string(), "hello".to_string());
        assert!(publisher.validate(&short).is_ok());

        let long = Post::new("user-1".to_string(), "x".repeat(281));
        assert!(matches!(
            publisher.validate(&long),
            Err(PublishError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_video() {
        let publisher = TwitterPublisher::new(&PlatformConfig::default());

        let mut post = Post::new("user-1".to_string(), "with a clip".to_string());
        post.media.push(MediaAttachment::new(
            MediaKind::Video,
            "https://cdn.example.com/clip.mp4".to_string(),
        ));

        assert!(matches!(
            publisher.validate(&post),
            Err(PublishError::Validation(_))
        ));

        let mut with_gif = Post::new("user-1".to_string(), "with a gif".to_string());
        with_gif.media.push(MediaAttachment::new(
            MediaKind::Gif,
            "https://cdn.example.com/loop.gif".to_string(),
        ));
        assert!(publisher.validate(&with_gif).is_ok());
    }

    #[test]
    fn test_api_base_override() {
        let config = PlatformConfig {
            enabled: true,
            api_base: Some("http://localhost:9009".to_string()),
        };
        let publisher = TwitterPublisher::new(&config);
        assert_eq!(publisher.api_base, "http://localhost:9009");
    }
}
