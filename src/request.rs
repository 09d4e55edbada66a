//! One explicit input shape per operation, validated independently.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::VideoRecord;
use crate::registry::normalize_handle;

const MAX_FEED_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    Login,
    #[serde(rename_all = "camelCase")]
    CreateFeed { feed_name: String },
    #[serde(rename_all = "camelCase")]
    AddChannel {
        feed_name: String,
        channel_handle: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoveChannel {
        feed_name: String,
        channel_handle: String,
    },
    ListFeeds,
    #[serde(rename_all = "camelCase")]
    ResolveChannel { channel_handle: String },
    #[serde(rename_all = "camelCase")]
    ListChannels { feed_name: String },
    #[serde(rename_all = "camelCase")]
    Videos {
        feed_name: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    RenameFeed {
        feed_name: String,
        new_feed_name: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteFeed { feed_name: String },
    DeleteUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    LoggedIn { user_id: i64, created: bool },
    #[serde(rename_all = "camelCase")]
    FeedCreated {
        feed_name: String,
        already_existed: bool,
    },
    #[serde(rename_all = "camelCase")]
    ChannelAdded {
        feed_name: String,
        channel_handle: String,
        already_present: bool,
    },
    #[serde(rename_all = "camelCase")]
    ChannelRemoved {
        feed_name: String,
        channel_handle: String,
        channel_deleted: bool,
    },
    #[serde(rename_all = "camelCase")]
    ChannelResolved {
        channel_handle: String,
        channel_id: String,
        upload_list_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Feeds { feed_names: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Channels { channel_handles: Vec<String> },
    Videos { videos: Vec<VideoRecord> },
    #[serde(rename_all = "camelCase")]
    FeedRenamed {
        feed_name: String,
        new_feed_name: String,
    },
    #[serde(rename_all = "camelCase")]
    FeedDeleted {
        feed_name: String,
        channels_deleted: usize,
    },
    #[serde(rename_all = "camelCase")]
    UserDeleted {
        feeds_deleted: usize,
        channels_deleted: usize,
    },
}

fn feed_name(raw: String) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("feed name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_FEED_NAME_LEN {
        return Err(AppError::InvalidRequest(format!(
            "feed name longer than {} characters",
            MAX_FEED_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

impl Request {
    pub fn from_json(json: &str) -> Result<Self> {
        let request: Request = serde_json::from_str(json)
            .map_err(|e| AppError::InvalidRequest(e.to_string()))?;
        request.validate()
    }

    /// Builds a request from CLI words, e.g. `add news @rustlang`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        let request = match words.as_slice() {
            ["login"] => Request::Login,
            ["create", name] => Request::CreateFeed {
                feed_name: name.to_string(),
            },
            ["add", name, handle] => Request::AddChannel {
                feed_name: name.to_string(),
                channel_handle: handle.to_string(),
            },
            ["remove", name, handle] => Request::RemoveChannel {
                feed_name: name.to_string(),
                channel_handle: handle.to_string(),
            },
            ["feeds"] => Request::ListFeeds,
            ["resolve", handle] => Request::ResolveChannel {
                channel_handle: handle.to_string(),
            },
            ["channels", name] => Request::ListChannels {
                feed_name: name.to_string(),
            },
            ["videos", name] => Request::Videos {
                feed_name: name.to_string(),
                limit: None,
            },
            ["videos", name, limit] => Request::Videos {
                feed_name: name.to_string(),
                limit: Some(limit.parse().map_err(|_| {
                    AppError::InvalidRequest(format!("{:?} is not a valid limit", limit))
                })?),
            },
            ["rename", name, new_name] => Request::RenameFeed {
                feed_name: name.to_string(),
                new_feed_name: new_name.to_string(),
            },
            ["delete", name] => Request::DeleteFeed {
                feed_name: name.to_string(),
            },
            ["delete-user"] => Request::DeleteUser,
            _ => {
                return Err(AppError::InvalidRequest(format!(
                    "unrecognized command: {}",
                    words.join(" ")
                )))
            }
        };
        request.validate()
    }

    /// Checks the fields this variant carries and returns it with names
    /// trimmed and the handle normalized.
    pub fn validate(self) -> Result<Self> {
        Ok(match self {
            Request::Login => Request::Login,
            Request::ListFeeds => Request::ListFeeds,
            Request::DeleteUser => Request::DeleteUser,
            Request::CreateFeed { feed_name: name } => Request::CreateFeed {
                feed_name: feed_name(name)?,
            },
            Request::AddChannel {
                feed_name: name,
                channel_handle,
            } => Request::AddChannel {
                feed_name: feed_name(name)?,
                channel_handle: normalize_handle(&channel_handle)?,
            },
            Request::RemoveChannel {
                feed_name: name,
                channel_handle,
            } => Request::RemoveChannel {
                feed_name: feed_name(name)?,
                channel_handle: normalize_handle(&channel_handle)?,
            },
            Request::ResolveChannel { channel_handle } => Request::ResolveChannel {
                channel_handle: normalize_handle(&channel_handle)?,
            },
            Request::ListChannels { feed_name: name } => Request::ListChannels {
                feed_name: feed_name(name)?,
            },
            Request::Videos {
                feed_name: name,
                limit,
            } => {
                if limit == Some(0) {
                    return Err(AppError::InvalidRequest("limit must be at least 1".to_string()));
                }
                Request::Videos {
                    feed_name: feed_name(name)?,
                    limit,
                }
            }
            Request::RenameFeed {
                feed_name: name,
                new_feed_name,
            } => Request::RenameFeed {
                feed_name: feed_name(name)?,
                new_feed_name: feed_name(new_feed_name)?,
            },
            Request::DeleteFeed { feed_name: name } => Request::DeleteFeed {
                feed_name: feed_name(name)?,
            },
        })
    }
}
