//! Scripted [`VideoSource`] used by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{ChannelIds, VideoRecord};

use super::VideoSource;

enum Uploads {
    Videos { delay: Duration, videos: Vec<VideoRecord> },
    Fail(String),
    Hang,
}

#[derive(Default)]
pub struct StubSource {
    channels: HashMap<String, ChannelIds>,
    uploads: HashMap<String, Uploads>,
    lookup_delay: Duration,
    pub handle_lookups: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, handle: &str, channel_id: &str, upload_list_id: &str) -> Self {
        self.channels.insert(
            handle.to_lowercase(),
            ChannelIds {
                channel_id: channel_id.to_string(),
                upload_list_id: upload_list_id.to_string(),
            },
        );
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    pub fn with_videos(self, upload_list_id: &str, videos: Vec<VideoRecord>) -> Self {
        self.with_delayed_videos(upload_list_id, Duration::ZERO, videos)
    }

    pub fn with_delayed_videos(
        mut self,
        upload_list_id: &str,
        delay: Duration,
        videos: Vec<VideoRecord>,
    ) -> Self {
        self.uploads
            .insert(upload_list_id.to_string(), Uploads::Videos { delay, videos });
        self
    }

    pub fn with_failure(mut self, upload_list_id: &str, message: &str) -> Self {
        self.uploads
            .insert(upload_list_id.to_string(), Uploads::Fail(message.to_string()));
        self
    }

    pub fn with_hang(mut self, upload_list_id: &str) -> Self {
        self.uploads.insert(upload_list_id.to_string(), Uploads::Hang);
        self
    }
}

#[async_trait]
impl VideoSource for StubSource {
    async fn fetch_channel_by_handle(&self, handle: &str) -> Result<Option<ChannelIds>> {
        self.handle_lookups.fetch_add(1, Ordering::SeqCst);
        if !self.lookup_delay.is_zero() {
            tokio::time::sleep(self.lookup_delay).await;
        }
        Ok(self.channels.get(&handle.to_lowercase()).cloned())
    }

    async fn fetch_recent_videos(
        &self,
        upload_list_id: &str,
        limit: usize,
    ) -> Result<Vec<VideoRecord>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match self.uploads.get(upload_list_id) {
            Some(Uploads::Videos { delay, videos }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(videos.iter().take(limit).cloned().collect())
            }
            Some(Uploads::Fail(message)) => Err(AppError::Source(message.clone())),
            Some(Uploads::Hang) => std::future::pending().await,
            None => Err(AppError::Source(format!("unknown playlist {}", upload_list_id))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn video(channel: &str, video_id: &str, published_at: DateTime<Utc>) -> VideoRecord {
    VideoRecord {
        channel_name: channel.to_string(),
        title: format!("{} upload {}", channel, video_id),
        video_id: video_id.to_string(),
        thumbnail_url: format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id),
        published_at,
        video_url: format!("https://www.youtube.com/watch?v={}", video_id),
    }
}
