//! Access to the external video platform.
//!
//! Everything above this module talks to the platform through [`VideoSource`],
//! which keeps the rate-limited, partially unreliable network calls behind a
//! narrow seam that tests can replace.

#[cfg(test)]
pub mod stub;
mod youtube;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChannelIds, VideoRecord};

pub use youtube::YouTubeClient;

#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Looks a channel up by its handle. `Ok(None)` means the platform has no
    /// such channel; `Err` is reserved for transport or decoding failures.
    async fn fetch_channel_by_handle(&self, handle: &str) -> Result<Option<ChannelIds>>;

    /// Returns at most `limit` of the most recent uploads in a channel's
    /// upload list, newest first.
    async fn fetch_recent_videos(&self, upload_list_id: &str, limit: usize)
        -> Result<Vec<VideoRecord>>;
}
