use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const CHANNEL_URL_BASE: &str = "https://www.youtube.com/channel/";

/// A catalogued channel. Shared by every feed that links to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub upload_list_id: String,
    pub handle: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn ids(&self) -> ChannelIds {
        ChannelIds {
            channel_id: self.channel_id.clone(),
            upload_list_id: self.upload_list_id.clone(),
        }
    }
}

/// Stable identifier pair a handle resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelIds {
    pub channel_id: String,
    pub upload_list_id: String,
}

/// A channel discovered through the video source, not yet catalogued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub channel_id: String,
    pub upload_list_id: String,
    pub handle: String,
    pub url: String,
}

impl NewChannel {
    pub fn new(handle: &str, ids: ChannelIds) -> Self {
        let url = format!("{}{}", CHANNEL_URL_BASE, ids.channel_id);
        Self {
            channel_id: ids.channel_id,
            upload_list_id: ids.upload_list_id,
            handle: handle.to_string(),
            url,
        }
    }
}

impl From<Channel> for NewChannel {
    fn from(channel: Channel) -> Self {
        Self {
            channel_id: channel.channel_id,
            upload_list_id: channel.upload_list_id,
            handle: channel.handle,
            url: channel.url,
        }
    }
}
