use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use tokio_rusqlite::Connection;

use crate::error::{is_constraint_violation, AppError, Result};
use crate::models::{Channel, Feed, NewChannel, User};

use super::schema::SCHEMA;

/// Outcome of linking a channel to a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLink {
    pub channel: Channel,
    pub channel_created: bool,
    pub link_created: bool,
}

/// What a removal reclaimed. Returned by unlink, feed delete and user delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unlinked {
    pub feeds_deleted: usize,
    pub links_removed: usize,
    pub channels_deleted: usize,
}

impl Unlinked {
    fn absorb(&mut self, other: Unlinked) {
        self.feeds_deleted += other.feeds_deleted;
        self.links_removed += other.links_removed;
        self.channels_deleted += other.channels_deleted;
    }
}

const USER_COLUMNS: &str = "id, external_id, created_at, updated_at";
const FEED_COLUMNS: &str = "id, user_id, name, created_at, updated_at";
const CHANNEL_COLUMNS: &str =
    "channel_id, channel_upload_id, channel_handle, channel_url, created_at";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    /// Returns the user for an external identity, creating it on first sight.
    /// The flag is true when the row was created by this call.
    pub async fn login_user(&self, external_id: String) -> Result<(bool, User)> {
        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let inserted = tx.execute(
                    "INSERT INTO users (external_id) VALUES (?1)
                     ON CONFLICT(external_id) DO NOTHING",
                    params![external_id],
                )?;
                let user = tx.query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
                    params![external_id],
                    user_from_row,
                )?;
                tx.commit()?;
                Ok((inserted == 1, user))
            })
            .await?;
        Ok(result)
    }

    pub async fn find_user(&self, external_id: String) -> Result<Option<User>> {
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
                        params![external_id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    /// Deletes a user after cascading through every feed it owns.
    pub async fn delete_user(&self, id: i64) -> Result<Unlinked> {
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if !exists(&tx, "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", id)? {
                    return Ok(None);
                }

                let feed_ids = {
                    let mut stmt = tx.prepare("SELECT id FROM feeds WHERE user_id = ?1")?;
                    let ids = stmt
                        .query_map(params![id], |row| row.get::<_, i64>(0))?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    ids
                };

                let mut removed = Unlinked::default();
                for feed_id in feed_ids {
                    removed.absorb(delete_feed_in(&tx, feed_id)?);
                }
                tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(Some(removed))
            })
            .await?;

        removed.ok_or_else(|| AppError::NotFound(format!("user {}", id)))
    }

    // Feed operations

    /// Creates a feed unless the owner already has one with that name.
    /// The flag is true when the feed already existed; nothing is written then.
    pub async fn create_feed(&self, user_id: i64, name: String) -> Result<(bool, Feed)> {
        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if !exists(&tx, "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", user_id)? {
                    return Ok(None);
                }
                let inserted = tx.execute(
                    "INSERT INTO feeds (user_id, name) VALUES (?1, ?2)
                     ON CONFLICT(user_id, name) DO NOTHING",
                    params![user_id, name],
                )?;
                let feed = tx.query_row(
                    &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE user_id = ?1 AND name = ?2"),
                    params![user_id, name],
                    feed_from_row,
                )?;
                tx.commit()?;
                Ok(Some((inserted == 0, feed)))
            })
            .await?;

        result.ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    pub async fn find_feed(&self, user_id: i64, name: String) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!(
                            "SELECT {FEED_COLUMNS} FROM feeds WHERE user_id = ?1 AND name = ?2"
                        ),
                        params![user_id, name],
                        feed_from_row,
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"),
                        params![feed_id],
                        feed_from_row,
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn feed_names(&self, user_id: i64) -> Result<Vec<String>> {
        let names = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT name FROM feeds WHERE user_id = ?1 ORDER BY name")?;
                let names = stmt
                    .query_map(params![user_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await?;
        Ok(names)
    }

    pub async fn rename_feed(&self, feed_id: i64, new_name: String) -> Result<()> {
        let name = new_name.clone();
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE feeds SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![name, feed_id],
                )?;
                Ok(updated)
            })
            .await
            .map_err(|e| conflict_or(e, || format!("feed named {:?}", new_name)))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("feed {}", feed_id)));
        }
        Ok(())
    }

    /// Deletes a feed after removing its links, reclaiming channels no other
    /// feed references.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<Unlinked> {
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if !exists(&tx, "SELECT EXISTS(SELECT 1 FROM feeds WHERE id = ?1)", feed_id)? {
                    return Ok(None);
                }
                let removed = delete_feed_in(&tx, feed_id)?;
                tx.commit()?;
                Ok(Some(removed))
            })
            .await?;

        removed.ok_or_else(|| AppError::NotFound(format!("feed {}", feed_id)))
    }

    // Channel operations

    pub async fn find_channel_by_handle(&self, handle: String) -> Result<Option<Channel>> {
        let channel = self
            .conn
            .call(move |conn| {
                let channel = conn
                    .query_row(
                        &format!(
                            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE channel_handle = ?1"
                        ),
                        params![handle],
                        channel_from_row,
                    )
                    .optional()?;
                Ok(channel)
            })
            .await?;
        Ok(channel)
    }

    /// Catalogues a channel unless a row with the same id or handle exists,
    /// in which case that row is returned. The flag is true on insert.
    pub async fn insert_channel_if_absent(&self, channel: NewChannel) -> Result<(bool, Channel)> {
        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let result = insert_channel_in(&tx, &channel)?;
                tx.commit()?;
                Ok(result)
            })
            .await?;
        Ok(result)
    }

    /// Links a channel to a feed, cataloguing the channel first when it is not
    /// present. Both writes share one transaction, so a channel row is never
    /// left behind without its first link.
    pub async fn link_channel(&self, feed_id: i64, channel: NewChannel) -> Result<ChannelLink> {
        let link = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if !exists(&tx, "SELECT EXISTS(SELECT 1 FROM feeds WHERE id = ?1)", feed_id)? {
                    return Ok(None);
                }

                let (channel_created, channel) = insert_channel_in(&tx, &channel)?;
                let linked = tx.execute(
                    "INSERT INTO feeds_channels (feed_id, channel_id) VALUES (?1, ?2)
                     ON CONFLICT(feed_id, channel_id) DO NOTHING",
                    params![feed_id, channel.channel_id],
                )?;
                tx.commit()?;

                Ok(Some(ChannelLink {
                    channel,
                    channel_created,
                    link_created: linked == 1,
                }))
            })
            .await
            .map_err(|e| conflict_or(e, || format!("link for feed {}", feed_id)))?;

        link.ok_or_else(|| AppError::NotFound(format!("feed {}", feed_id)))
    }

    /// Removes one feed-channel link and deletes the channel if that was its
    /// last reference.
    pub async fn unlink_channel(&self, feed_id: i64, channel_id: String) -> Result<Unlinked> {
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let removed = unlink_in(&tx, feed_id, &channel_id)?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        Ok(removed)
    }

    pub async fn feed_channels(&self, feed_id: i64) -> Result<Vec<Channel>> {
        let channels = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT c.channel_id, c.channel_upload_id, c.channel_handle,
                              c.channel_url, c.created_at
                       FROM channels c
                       JOIN feeds_channels fc ON fc.channel_id = c.channel_id
                       WHERE fc.feed_id = ?1
                       ORDER BY fc.created_at, c.channel_handle"#,
                )?;
                let channels = stmt
                    .query_map(params![feed_id], channel_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(channels)
            })
            .await?;
        Ok(channels)
    }

    pub async fn channel_handles(&self, feed_id: i64) -> Result<Vec<String>> {
        Ok(self
            .feed_channels(feed_id)
            .await?
            .into_iter()
            .map(|c| c.handle)
            .collect())
    }

    pub async fn upload_list_ids(&self, feed_id: i64) -> Result<Vec<String>> {
        Ok(self
            .feed_channels(feed_id)
            .await?
            .into_iter()
            .map(|c| c.upload_list_id)
            .collect())
    }
}

#[cfg(test)]
impl Repository {
    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        params![id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    pub async fn get_channel(&self, channel_id: String) -> Result<Option<Channel>> {
        let channel = self
            .conn
            .call(move |conn| {
                let channel = conn
                    .query_row(
                        &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE channel_id = ?1"),
                        params![channel_id],
                        channel_from_row,
                    )
                    .optional()?;
                Ok(channel)
            })
            .await?;
        Ok(channel)
    }

    pub async fn has_link(&self, feed_id: i64, channel_id: String) -> Result<bool> {
        let linked = self
            .conn
            .call(move |conn| {
                let linked: bool = conn.query_row(
                    "SELECT EXISTS(
                         SELECT 1 FROM feeds_channels WHERE feed_id = ?1 AND channel_id = ?2
                     )",
                    params![feed_id, channel_id],
                    |row| row.get(0),
                )?;
                Ok(linked)
            })
            .await?;
        Ok(linked)
    }

    pub async fn count(&self, table: &'static str) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

fn conflict_or(err: tokio_rusqlite::Error, what: impl FnOnce() -> String) -> AppError {
    match &err {
        tokio_rusqlite::Error::Rusqlite(e) if is_constraint_violation(e) => {
            AppError::Conflict(what())
        }
        _ => err.into(),
    }
}

fn exists(tx: &Transaction, sql: &str, id: i64) -> rusqlite::Result<bool> {
    tx.query_row(sql, params![id], |row| row.get(0))
}

fn insert_channel_in(tx: &Transaction, channel: &NewChannel) -> rusqlite::Result<(bool, Channel)> {
    let inserted = tx.execute(
        "INSERT INTO channels (channel_id, channel_upload_id, channel_handle, channel_url)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT DO NOTHING",
        params![
            channel.channel_id,
            channel.upload_list_id,
            channel.handle,
            channel.url
        ],
    )?;

    // On conflict the surviving row may match by id or by handle.
    let mut stored = tx.query_row(
        &format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE channel_id = ?1 OR channel_handle = ?2
             ORDER BY channel_id = ?1 DESC
             LIMIT 1"
        ),
        params![channel.channel_id, channel.handle],
        channel_from_row,
    )?;

    if inserted == 1 {
        tracing::info!(
            channel_id = %stored.channel_id,
            handle = %stored.handle,
            "catalogued channel"
        );
    } else if stored.channel_id == channel.channel_id
        && !stored.handle.eq_ignore_ascii_case(&channel.handle)
    {
        // The source resolved a new handle to a known id: the channel was renamed.
        tx.execute(
            "UPDATE channels SET channel_handle = ?1, channel_upload_id = ?2 WHERE channel_id = ?3",
            params![channel.handle, channel.upload_list_id, channel.channel_id],
        )?;
        tracing::info!(
            channel_id = %stored.channel_id,
            "channel handle changed from {} to {}",
            stored.handle,
            channel.handle
        );
        stored.handle = channel.handle.clone();
        stored.upload_list_id = channel.upload_list_id.clone();
    }
    Ok((inserted == 1, stored))
}

fn unlink_in(tx: &Transaction, feed_id: i64, channel_id: &str) -> rusqlite::Result<Unlinked> {
    let links_removed = tx.execute(
        "DELETE FROM feeds_channels WHERE feed_id = ?1 AND channel_id = ?2",
        params![feed_id, channel_id],
    )?;
    let channels_deleted = tx.execute(
        "DELETE FROM channels
         WHERE channel_id = ?1
           AND NOT EXISTS (SELECT 1 FROM feeds_channels WHERE channel_id = ?1)",
        params![channel_id],
    )?;

    if channels_deleted > 0 {
        tracing::info!(%channel_id, "reclaimed unreferenced channel");
    }
    Ok(Unlinked {
        feeds_deleted: 0,
        links_removed,
        channels_deleted,
    })
}

fn delete_feed_in(tx: &Transaction, feed_id: i64) -> rusqlite::Result<Unlinked> {
    let channel_ids = {
        let mut stmt = tx.prepare("SELECT channel_id FROM feeds_channels WHERE feed_id = ?1")?;
        let ids = stmt
            .query_map(params![feed_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };

    let mut removed = Unlinked::default();
    for channel_id in channel_ids {
        removed.absorb(unlink_in(tx, feed_id, &channel_id)?);
    }
    removed.feeds_deleted = tx.execute("DELETE FROM feeds WHERE id = ?1", params![feed_id])?;
    Ok(removed)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized timestamp {:?}", raw).into(),
        )
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        created_at: timestamp(row, 2)?,
        updated_at: timestamp(row, 3)?,
    })
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        created_at: timestamp(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        channel_id: row.get(0)?,
        upload_list_id: row.get(1)?,
        handle: row.get(2)?,
        url: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::ChannelIds;
    use tokio_test::assert_err;

    fn new_channel(n: u32) -> NewChannel {
        NewChannel::new(
            &format!("@chan{n}"),
            ChannelIds {
                channel_id: format!("UC{n}"),
                upload_list_id: format!("UU{n}"),
            },
        )
    }

    async fn repo_with_user() -> (Repository, User) {
        let repo = Repository::open_in_memory().await.unwrap();
        let (_, user) = repo.login_user("google-sub-1".into()).await.unwrap();
        (repo, user)
    }

    #[tokio::test]
    async fn login_creates_user_once() {
        let repo = Repository::open_in_memory().await.unwrap();
        let (created, first) = repo.login_user("sub".into()).await.unwrap();
        let (created_again, second) = repo.login_user("sub".into()).await.unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(repo.count("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn feed_names_are_unique_per_owner() {
        let (repo, user) = repo_with_user().await;
        let (_, other) = repo.login_user("google-sub-2".into()).await.unwrap();

        let (existed, feed) = repo.create_feed(user.id, "tech".into()).await.unwrap();
        assert!(!existed);
        let (existed, again) = repo.create_feed(user.id, "tech".into()).await.unwrap();
        assert!(existed);
        assert_eq!(feed.id, again.id);

        let (existed, theirs) = repo.create_feed(other.id, "tech".into()).await.unwrap();
        assert!(!existed);
        assert_ne!(theirs.id, feed.id);
        assert_eq!(repo.count("feeds").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn create_feed_for_missing_user_is_not_found() {
        let repo = Repository::open_in_memory().await.unwrap();
        let err = repo.create_feed(42, "news".into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn rename_to_taken_name_is_conflict() {
        let (repo, user) = repo_with_user().await;
        let (_, news) = repo.create_feed(user.id, "news".into()).await.unwrap();
        repo.create_feed(user.id, "music".into()).await.unwrap();

        let err = repo.rename_feed(news.id, "music".into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        repo.rename_feed(news.id, "headlines".into()).await.unwrap();
        assert_eq!(
            repo.feed_names(user.id).await.unwrap(),
            vec!["headlines".to_string(), "music".to_string()]
        );
        assert_err!(repo.rename_feed(999, "x".into()).await);
    }

    #[tokio::test]
    async fn channel_insert_is_idempotent_by_id_and_handle() {
        let repo = Repository::open_in_memory().await.unwrap();
        let (created, first) = repo.insert_channel_if_absent(new_channel(1)).await.unwrap();
        assert!(created);

        let (created, second) = repo.insert_channel_if_absent(new_channel(1)).await.unwrap();
        assert!(!created);
        assert_eq!(first, second);

        // Same handle, different case: resolves to the stored row.
        let mut shouty = new_channel(1);
        shouty.handle = "@CHAN1".into();
        let (created, third) = repo.insert_channel_if_absent(shouty).await.unwrap();
        assert!(!created);
        assert_eq!(third.channel_id, "UC1");
        assert_eq!(repo.count("channels").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn renamed_handle_replaces_stored_handle() {
        let (repo, user) = repo_with_user().await;
        let (_, f1) = repo.create_feed(user.id, "one".into()).await.unwrap();
        let (_, f2) = repo.create_feed(user.id, "two".into()).await.unwrap();
        repo.link_channel(f1.id, new_channel(1)).await.unwrap();

        let mut renamed = new_channel(1);
        renamed.handle = "@chan1-renamed".into();
        let link = repo.link_channel(f2.id, renamed).await.unwrap();
        assert!(!link.channel_created);
        assert_eq!(link.channel.handle, "@chan1-renamed");

        let found = repo
            .find_channel_by_handle("@chan1-renamed".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.channel_id, "UC1");
        assert!(repo.find_channel_by_handle("@chan1".into()).await.unwrap().is_none());
        assert_eq!(repo.count("channels").await.unwrap(), 1);
        assert_eq!(repo.channel_handles(f1.id).await.unwrap(), vec!["@chan1-renamed"]);
    }

    #[tokio::test]
    async fn unreadable_timestamp_is_an_error() {
        let (repo, user) = repo_with_user().await;
        let (_, feed) = repo.create_feed(user.id, "news".into()).await.unwrap();
        let feed_id = feed.id;
        repo.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET created_at = 'yesterday' WHERE id = ?1",
                    params![feed_id],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let err = repo.get_feed(feed_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn linking_twice_keeps_one_row() {
        let (repo, user) = repo_with_user().await;
        let (_, feed) = repo.create_feed(user.id, "news".into()).await.unwrap();

        let first = repo.link_channel(feed.id, new_channel(1)).await.unwrap();
        assert!(first.channel_created);
        assert!(first.link_created);

        let second = repo.link_channel(feed.id, new_channel(1)).await.unwrap();
        assert!(!second.channel_created);
        assert!(!second.link_created);

        assert_eq!(repo.count("feeds_channels").await.unwrap(), 1);
        assert!(repo.has_link(feed.id, "UC1".into()).await.unwrap());
    }

    #[tokio::test]
    async fn linking_to_missing_feed_creates_nothing() {
        let repo = Repository::open_in_memory().await.unwrap();
        let err = repo.link_channel(7, new_channel(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(repo.count("channels").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn channel_survives_until_last_link_is_removed() {
        let (repo, user) = repo_with_user().await;
        let (_, f1) = repo.create_feed(user.id, "one".into()).await.unwrap();
        let (_, f2) = repo.create_feed(user.id, "two".into()).await.unwrap();
        repo.link_channel(f1.id, new_channel(1)).await.unwrap();
        repo.link_channel(f2.id, new_channel(1)).await.unwrap();

        let removed = repo.unlink_channel(f1.id, "UC1".into()).await.unwrap();
        assert_eq!(removed.links_removed, 1);
        assert_eq!(removed.channels_deleted, 0);
        assert!(repo.get_channel("UC1".into()).await.unwrap().is_some());

        let removed = repo.unlink_channel(f2.id, "UC1".into()).await.unwrap();
        assert_eq!(removed.channels_deleted, 1);
        assert!(repo.get_channel("UC1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_feed_reclaims_only_orphaned_channels() {
        let (repo, user) = repo_with_user().await;
        let (_, f1) = repo.create_feed(user.id, "one".into()).await.unwrap();
        let (_, f2) = repo.create_feed(user.id, "two".into()).await.unwrap();
        repo.link_channel(f1.id, new_channel(1)).await.unwrap();
        repo.link_channel(f1.id, new_channel(2)).await.unwrap();
        repo.link_channel(f2.id, new_channel(2)).await.unwrap();

        let removed = repo.delete_feed(f1.id).await.unwrap();
        assert_eq!(
            removed,
            Unlinked {
                feeds_deleted: 1,
                links_removed: 2,
                channels_deleted: 1,
            }
        );
        assert!(repo.get_channel("UC1".into()).await.unwrap().is_none());
        assert!(repo.get_channel("UC2".into()).await.unwrap().is_some());
        assert!(repo.get_feed(f1.id).await.unwrap().is_none());

        let err = repo.delete_feed(f1.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_user_cascades_through_feeds() {
        let (repo, user) = repo_with_user().await;
        let (_, other) = repo.login_user("google-sub-2".into()).await.unwrap();
        let (_, f1) = repo.create_feed(user.id, "one".into()).await.unwrap();
        let (_, f2) = repo.create_feed(user.id, "two".into()).await.unwrap();
        let (_, theirs) = repo.create_feed(other.id, "one".into()).await.unwrap();
        repo.link_channel(f1.id, new_channel(1)).await.unwrap();
        repo.link_channel(f2.id, new_channel(2)).await.unwrap();
        repo.link_channel(theirs.id, new_channel(2)).await.unwrap();

        let removed = repo.delete_user(user.id).await.unwrap();
        assert_eq!(removed.feeds_deleted, 2);
        assert_eq!(removed.links_removed, 2);
        assert_eq!(removed.channels_deleted, 1);

        assert!(repo.get_user(user.id).await.unwrap().is_none());
        assert!(repo.feed_names(user.id).await.unwrap().is_empty());
        assert_eq!(repo.channel_handles(theirs.id).await.unwrap(), vec!["@chan2"]);
        assert_eq!(repo.count("channels").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn foreign_keys_reject_dangling_links() {
        let repo = Repository::open_in_memory().await.unwrap();
        let result = repo
            .conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO feeds_channels (feed_id, channel_id) VALUES (1, 'UCmissing')",
                    [],
                )?;
                Ok(())
            })
            .await;
        let err = AppError::from(result.unwrap_err());
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tubefeed.db");
        let path = path.to_str().unwrap();

        {
            let repo = Repository::new(path).await.unwrap();
            let (_, user) = repo.login_user("sub".into()).await.unwrap();
            let (_, feed) = repo.create_feed(user.id, "news".into()).await.unwrap();
            repo.link_channel(feed.id, new_channel(3)).await.unwrap();
        }

        let repo = Repository::new(path).await.unwrap();
        let (created, user) = repo.login_user("sub".into()).await.unwrap();
        assert!(!created);
        let feed = repo.find_feed(user.id, "news".into()).await.unwrap().unwrap();
        assert_eq!(repo.upload_list_ids(feed.id).await.unwrap(), vec!["UU3"]);
    }
}
