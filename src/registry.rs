use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Channel, ChannelIds, NewChannel};
use crate::source::VideoSource;

static HANDLE_RE: OnceLock<Regex> = OnceLock::new();

/// Trims a user-entered handle, adds the leading `@` if missing and checks it
/// against the platform's handle alphabet.
pub fn normalize_handle(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let handle = if trimmed.starts_with('@') {
        trimmed.to_string()
    } else {
        format!("@{}", trimmed)
    };

    let re = HANDLE_RE.get_or_init(|| {
        Regex::new(r"^@[A-Za-z0-9._-]{3,30}$").expect("handle pattern compiles")
    });
    if !re.is_match(&handle) {
        return Err(AppError::InvalidRequest(format!(
            "{:?} is not a valid channel handle",
            raw
        )));
    }
    Ok(handle)
}

/// Where a handle was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Already catalogued; no external call was made.
    Known(Channel),
    /// Found through the video source, not yet catalogued.
    Discovered(NewChannel),
}

impl Resolved {
    pub fn ids(&self) -> ChannelIds {
        match self {
            Resolved::Known(channel) => channel.ids(),
            Resolved::Discovered(channel) => ChannelIds {
                channel_id: channel.channel_id.clone(),
                upload_list_id: channel.upload_list_id.clone(),
            },
        }
    }

    pub fn into_new_channel(self) -> NewChannel {
        match self {
            Resolved::Known(channel) => channel.into(),
            Resolved::Discovered(channel) => channel,
        }
    }
}

/// Deduplicated channel catalogue in front of the video source.
pub struct ChannelRegistry {
    repo: Arc<Repository>,
    source: Arc<dyn VideoSource>,
}

impl ChannelRegistry {
    pub fn new(repo: Arc<Repository>, source: Arc<dyn VideoSource>) -> Self {
        Self { repo, source }
    }

    /// Catalogue lookup only.
    pub async fn find(&self, handle: &str) -> Result<Option<Channel>> {
        self.repo.find_channel_by_handle(handle.to_string()).await
    }

    /// Resolves a normalized handle without writing anything: the catalogue
    /// first, then the video source.
    pub async fn lookup(&self, handle: &str) -> Result<Resolved> {
        if let Some(channel) = self.find(handle).await? {
            tracing::debug!("Channel {} found in catalogue", handle);
            return Ok(Resolved::Known(channel));
        }

        match self.source.fetch_channel_by_handle(handle).await? {
            Some(ids) => Ok(Resolved::Discovered(NewChannel::new(handle, ids))),
            None => Err(AppError::NotFound(format!("channel {}", handle))),
        }
    }

    /// Resolves a handle to its identifier pair, cataloguing the channel on
    /// first sight. Concurrent first sightings converge on one row.
    ///
    /// Feed membership links through `Repository::link_channel` instead so
    /// the channel and its first link land in one transaction.
    #[allow(dead_code)]
    pub async fn resolve_channel(&self, handle: &str) -> Result<ChannelIds> {
        let handle = normalize_handle(handle)?;
        match self.lookup(&handle).await? {
            Resolved::Known(channel) => Ok(channel.ids()),
            Resolved::Discovered(channel) => {
                let (_, stored) = self.repo.insert_channel_if_absent(channel).await?;
                Ok(stored.ids())
            }
        }
    }
}
