pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- users table
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- feeds table (names unique per owner)
CREATE TABLE IF NOT EXISTS feeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(user_id, name)
);

CREATE INDEX IF NOT EXISTS idx_feeds_user_id ON feeds(user_id);

-- channels table (shared, deduplicated by id and by handle)
CREATE TABLE IF NOT EXISTS channels (
    channel_id TEXT PRIMARY KEY,
    channel_upload_id TEXT NOT NULL,
    channel_handle TEXT NOT NULL UNIQUE COLLATE NOCASE,
    channel_url TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- feeds_channels join table
-- No ON DELETE CASCADE: removing a link must go through channel reclamation.
CREATE TABLE IF NOT EXISTS feeds_channels (
    feed_id INTEGER NOT NULL REFERENCES feeds(id),
    channel_id TEXT NOT NULL REFERENCES channels(channel_id),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY(feed_id, channel_id)
);

CREATE INDEX IF NOT EXISTS idx_feeds_channels_channel_id ON feeds_channels(channel_id);
"#;
