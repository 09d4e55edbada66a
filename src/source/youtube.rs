use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ChannelIds, VideoRecord};

use super::VideoSource;

const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3/";
const WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";

/// Largest page the Data API serves for playlist items.
const MAX_RESULTS: usize = 50;

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    id: String,
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemListResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: Option<PlaylistSnippet>,
    content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
    video_owner_channel_title: Option<String>,
    published_at: Option<DateTime<Utc>>,
    thumbnails: Option<Thumbnails>,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    #[serde(rename = "default")]
    fallback: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistContentDetails {
    video_id: Option<String>,
    video_published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// YouTube Data API v3 client.
pub struct YouTubeClient {
    client: Client,
    api_key: Option<String>,
    base_url: Url,
}

impl YouTubeClient {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("tubefeed/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: Url::parse(YOUTUBE_API_URL).expect("valid API base URL"),
        }
    }

    fn endpoint(&self, resource: &str, query: &[(&str, &str)]) -> Result<Url> {
        let Some(api_key) = &self.api_key else {
            return Err(AppError::Config(
                "no YouTube API key configured (set YOUTUBE_API_KEY)".to_string(),
            ));
        };

        let mut url = self
            .base_url
            .join(resource)
            .map_err(|e| AppError::Config(e.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("key", api_key);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match status {
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => AppError::Source(format!(
                    "rate limited or quota exceeded (HTTP {}): {}",
                    status, message
                )),
                _ => AppError::Source(format!("HTTP {}: {}", status, message)),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn fetch_channel_by_handle(&self, handle: &str) -> Result<Option<ChannelIds>> {
        let url = self.endpoint(
            "channels",
            &[("part", "id,contentDetails"), ("forHandle", handle)],
        )?;
        let response: ChannelListResponse = self.get_json(url).await?;

        let Some(item) = response.items.into_iter().next() else {
            tracing::debug!("No channel found for handle {}", handle);
            return Ok(None);
        };
        let upload_list_id = item.content_details.related_playlists.uploads;
        if upload_list_id.is_empty() {
            return Err(anyhow::anyhow!("Channel {} has no uploads playlist", item.id).into());
        }

        Ok(Some(ChannelIds {
            channel_id: item.id,
            upload_list_id,
        }))
    }

    async fn fetch_recent_videos(
        &self,
        upload_list_id: &str,
        limit: usize,
    ) -> Result<Vec<VideoRecord>> {
        let max_results = limit.clamp(1, MAX_RESULTS).to_string();
        let url = self.endpoint(
            "playlistItems",
            &[
                ("part", "snippet,contentDetails"),
                ("playlistId", upload_list_id),
                ("maxResults", &max_results),
            ],
        )?;
        let response: PlaylistItemListResponse = self.get_json(url).await?;

        let videos = videos_from_playlist(response, limit);
        tracing::debug!("Fetched {} videos from {}", videos.len(), upload_list_id);
        Ok(videos)
    }
}

/// Converts a playlist page into records, skipping private or deleted entries
/// that carry no video id or publish time.
fn videos_from_playlist(response: PlaylistItemListResponse, limit: usize) -> Vec<VideoRecord> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            let snippet = item.snippet?;
            let details = item.content_details;

            let video_id = details
                .as_ref()
                .and_then(|d| d.video_id.clone())
                .or_else(|| snippet.resource_id.and_then(|r| r.video_id))?;
            let published_at = details
                .and_then(|d| d.video_published_at)
                .or(snippet.published_at)?;

            let thumbnail_url = snippet
                .thumbnails
                .and_then(|t| t.high.or(t.medium).or(t.fallback))
                .map(|t| t.url)
                .unwrap_or_default();

            Some(VideoRecord {
                channel_name: snippet
                    .video_owner_channel_title
                    .unwrap_or(snippet.channel_title),
                title: snippet.title,
                video_url: format!("{}{}", WATCH_URL_BASE, video_id),
                video_id,
                thumbnail_url,
                published_at,
            })
        })
        .take(limit)
        .collect()
}
