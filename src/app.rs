use std::sync::Arc;

use crate::aggregate::{AggregateSettings, Aggregator};
use crate::config::Config;
use crate::db::{ChannelLink, Repository, Unlinked};
use crate::error::{AppError, ErrorKind, Result};
use crate::models::{Feed, User, VideoRecord};
use crate::registry::{normalize_handle, ChannelRegistry};
use crate::request::{Request, Response};
use crate::source::{VideoSource, YouTubeClient};

/// Largest per-channel limit a caller may ask for.
pub const MAX_VIDEO_LIMIT: usize = 50;

/// Every feed operation, over one store and one video source. Built once at
/// startup and borrowed by whoever serves requests.
pub struct App {
    repository: Arc<Repository>,
    registry: ChannelRegistry,
    aggregator: Aggregator,
    default_limit: usize,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let source = Arc::new(YouTubeClient::new(config.youtube_api_key.clone()));

        Ok(Self::with_parts(
            repository,
            source,
            config.aggregate_settings(),
            config.video_limit,
        ))
    }

    pub fn with_parts(
        repository: Repository,
        source: Arc<dyn VideoSource>,
        settings: AggregateSettings,
        default_limit: usize,
    ) -> Self {
        let repository = Arc::new(repository);
        Self {
            registry: ChannelRegistry::new(Arc::clone(&repository), Arc::clone(&source)),
            aggregator: Aggregator::new(source, settings),
            repository,
            default_limit,
        }
    }

    // Users

    pub async fn login(&self, external_id: &str) -> Result<(bool, User)> {
        let (created, user) = self.repository.login_user(external_id.to_string()).await?;
        if created {
            tracing::info!(user_id = user.id, "registered new user");
        }
        Ok((created, user))
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<Unlinked> {
        let removed = self.repository.delete_user(user_id).await?;
        tracing::info!(
            user_id,
            feeds = removed.feeds_deleted,
            channels = removed.channels_deleted,
            "deleted user"
        );
        Ok(removed)
    }

    // Feeds

    /// Returns `(already_existed, feed)`; an existing name is not an error.
    pub async fn create_feed(&self, user_id: i64, name: &str) -> Result<(bool, Feed)> {
        self.repository.create_feed(user_id, name.to_string()).await
    }

    pub async fn feed_id(&self, user_id: i64, name: &str) -> Result<i64> {
        self.repository
            .find_feed(user_id, name.to_string())
            .await?
            .map(|feed| feed.id)
            .ok_or_else(|| AppError::NotFound(format!("feed {:?}", name)))
    }

    pub async fn list_feeds(&self, user_id: i64) -> Result<Vec<String>> {
        self.repository.feed_names(user_id).await
    }

    pub async fn rename_feed(&self, feed_id: i64, new_name: &str) -> Result<()> {
        self.repository.rename_feed(feed_id, new_name.to_string()).await
    }

    pub async fn delete_feed(&self, feed_id: i64) -> Result<Unlinked> {
        self.repository.delete_feed(feed_id).await
    }

    // Membership

    /// Adds a channel to a feed by handle. Adding a channel that is already
    /// present succeeds without effect. A constraint race with a concurrent
    /// removal is retried once.
    pub async fn add_channel_to_feed(&self, feed_id: i64, handle: &str) -> Result<ChannelLink> {
        let handle = normalize_handle(handle)?;
        match self.try_add_channel(feed_id, &handle).await {
            Err(e) if e.kind() == ErrorKind::Conflict => {
                tracing::warn!("Retrying add of {} to feed {}: {}", handle, feed_id, e);
                self.try_add_channel(feed_id, &handle).await
            }
            other => other,
        }
    }

    async fn try_add_channel(&self, feed_id: i64, handle: &str) -> Result<ChannelLink> {
        if self.repository.get_feed(feed_id).await?.is_none() {
            return Err(AppError::NotFound(format!("feed {}", feed_id)));
        }
        let resolved = self.registry.lookup(handle).await?;
        let link = self
            .repository
            .link_channel(feed_id, resolved.into_new_channel())
            .await?;
        tracing::debug!(
            feed_id,
            channel_created = link.channel_created,
            link_created = link.link_created,
            "Linked {}",
            handle
        );
        Ok(link)
    }

    /// Removes a channel from a feed; the channel itself is deleted when no
    /// other feed references it.
    pub async fn remove_channel_from_feed(&self, feed_id: i64, handle: &str) -> Result<Unlinked> {
        let handle = normalize_handle(handle)?;
        let channel = self
            .registry
            .find(&handle)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("channel {}", handle)))?;

        let removed = self
            .repository
            .unlink_channel(feed_id, channel.channel_id)
            .await?;
        if removed.links_removed == 0 {
            return Err(AppError::NotFound(format!(
                "channel {} in feed {}",
                handle, feed_id
            )));
        }
        Ok(removed)
    }

    pub async fn list_channels(&self, feed_id: i64) -> Result<Vec<String>> {
        self.require_feed(feed_id).await?;
        self.repository.channel_handles(feed_id).await
    }

    // Videos

    /// Recent uploads across the feed's channels, newest first. Channels that
    /// fail are left out; the call fails only if every channel fails.
    pub async fn get_feed_videos(
        &self,
        feed_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<VideoRecord>> {
        self.require_feed(feed_id).await?;
        let limit = limit
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_VIDEO_LIMIT);

        let upload_list_ids = self.repository.upload_list_ids(feed_id).await?;
        let aggregation = self.aggregator.aggregate(limit, &upload_list_ids).await?;

        if !aggregation.partial_errors.is_empty() {
            tracing::warn!(
                feed_id,
                failed = aggregation.partial_errors.len(),
                total = upload_list_ids.len(),
                "Returning partial feed"
            );
        }
        Ok(aggregation.videos)
    }

    async fn require_feed(&self, feed_id: i64) -> Result<Feed> {
        self.repository
            .get_feed(feed_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("feed {}", feed_id)))
    }

    async fn require_user(&self, external_id: &str) -> Result<User> {
        self.repository
            .find_user(external_id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {:?} (log in first)", external_id)))
    }

    /// Serves one request on behalf of the caller's external identity. Every
    /// request except `Login` requires the identity to be registered.
    pub async fn handle(&self, identity: &str, request: Request) -> Result<Response> {
        let request = request.validate()?;
        if let Request::Login = request {
            let (created, user) = self.login(identity).await?;
            return Ok(Response::LoggedIn {
                user_id: user.id,
                created,
            });
        }

        let user = self.require_user(identity).await?;
        self.handle_for(&user, request).await
    }

    async fn handle_for(&self, user: &User, request: Request) -> Result<Response> {
        let response = match request {
            Request::Login => Response::LoggedIn {
                user_id: user.id,
                created: false,
            },
            Request::CreateFeed { feed_name } => {
                let (already_existed, feed) = self.create_feed(user.id, &feed_name).await?;
                Response::FeedCreated {
                    feed_name: feed.name,
                    already_existed,
                }
            }
            Request::AddChannel {
                feed_name,
                channel_handle,
            } => {
                let feed_id = self.feed_id(user.id, &feed_name).await?;
                let link = self.add_channel_to_feed(feed_id, &channel_handle).await?;
                Response::ChannelAdded {
                    feed_name,
                    channel_handle: link.channel.handle,
                    already_present: !link.link_created,
                }
            }
            Request::RemoveChannel {
                feed_name,
                channel_handle,
            } => {
                let feed_id = self.feed_id(user.id, &feed_name).await?;
                let removed = self.remove_channel_from_feed(feed_id, &channel_handle).await?;
                Response::ChannelRemoved {
                    feed_name,
                    channel_handle,
                    channel_deleted: removed.channels_deleted > 0,
                }
            }
            Request::ResolveChannel { channel_handle } => {
                let ids = self.registry.lookup(&channel_handle).await?.ids();
                Response::ChannelResolved {
                    channel_handle,
                    channel_id: ids.channel_id,
                    upload_list_id: ids.upload_list_id,
                }
            }
            Request::ListFeeds => Response::Feeds {
                feed_names: self.list_feeds(user.id).await?,
            },
            Request::ListChannels { feed_name } => {
                let feed_id = self.feed_id(user.id, &feed_name).await?;
                Response::Channels {
                    channel_handles: self.list_channels(feed_id).await?,
                }
            }
            Request::Videos { feed_name, limit } => {
                let feed_id = self.feed_id(user.id, &feed_name).await?;
                Response::Videos {
                    videos: self.get_feed_videos(feed_id, limit).await?,
                }
            }
            Request::RenameFeed {
                feed_name,
                new_feed_name,
            } => {
                let feed_id = self.feed_id(user.id, &feed_name).await?;
                self.rename_feed(feed_id, &new_feed_name).await?;
                Response::FeedRenamed {
                    feed_name,
                    new_feed_name,
                }
            }
            Request::DeleteFeed { feed_name } => {
                let feed_id = self.feed_id(user.id, &feed_name).await?;
                let removed = self.delete_feed(feed_id).await?;
                Response::FeedDeleted {
                    feed_name,
                    channels_deleted: removed.channels_deleted,
                }
            }
            Request::DeleteUser => {
                let removed = self.delete_user(user.id).await?;
                Response::UserDeleted {
                    feeds_deleted: removed.feeds_deleted,
                    channels_deleted: removed.channels_deleted,
                }
            }
        };
        Ok(response)
    }
}
