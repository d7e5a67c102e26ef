mod subscription;
mod user;
mod video;
mod watch_history;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use subscription::{ChannelProfile, SubscriptionStore};
pub use user::{NewUser, User, UserPatch, UserStore};
pub use video::{NewVideo, OwnerProfile, Video, VideoStore, VideoWithOwner};
pub use watch_history::{WatchHistoryEntry, WatchHistoryStore};

/// Whether an error is a UNIQUE constraint violation (duplicate username/email).
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        // Every connection to sqlite::memory: opens its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Users table. refresh_token holds the single currently valid refresh token.
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    full_name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    avatar_url TEXT NOT NULL,
                    avatar_asset_id TEXT NOT NULL,
                    cover_image_url TEXT,
                    cover_image_asset_id TEXT,
                    refresh_token TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                // Videos table
                "CREATE TABLE videos (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    video_url TEXT NOT NULL,
                    video_asset_id TEXT NOT NULL,
                    thumbnail_url TEXT NOT NULL,
                    thumbnail_asset_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    duration REAL NOT NULL DEFAULT 0,
                    views INTEGER NOT NULL DEFAULT 0,
                    is_published INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_videos_uuid ON videos(uuid)",
                "CREATE INDEX idx_videos_owner_id ON videos(owner_id)",
                // Subscriptions: directed edge subscriber -> channel
                "CREATE TABLE subscriptions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    subscriber_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    channel_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (subscriber_id, channel_id)
                )",
                "CREATE INDEX idx_subscriptions_channel ON subscriptions(channel_id)",
                "CREATE INDEX idx_subscriptions_subscriber ON subscriptions(subscriber_id)",
                // Watch history, ordered by id (most recent last)
                "CREATE TABLE watch_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    video_id INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                    watched_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (user_id, video_id)
                )",
                "CREATE INDEX idx_watch_history_user ON watch_history(user_id, id)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the video store.
    pub fn videos(&self) -> VideoStore {
        VideoStore::new(self.pool.clone())
    }

    /// Get the subscription store.
    pub fn subscriptions(&self) -> SubscriptionStore {
        SubscriptionStore::new(self.pool.clone())
    }

    /// Get the watch history store.
    pub fn watch_history(&self) -> WatchHistoryStore {
        WatchHistoryStore::new(self.pool.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Insert a user with placeholder credentials and media. Returns the user.
    pub async fn seed_user(db: &Database, username: &str) -> User {
        let id = db
            .users()
            .create(&NewUser {
                uuid: uuid::Uuid::new_v4().to_string(),
                username: username.to_string(),
                email: format!("{}@example.com", username),
                full_name: format!("{} Example", username),
                password_hash: "not-a-real-hash".to_string(),
                avatar_url: format!("https://media.test/{}-avatar.png", username),
                avatar_asset_id: format!("{}-avatar", username),
                cover_image_url: None,
                cover_image_asset_id: None,
            })
            .await
            .unwrap();
        db.users().get_by_id(id).await.unwrap().unwrap()
    }

    /// Insert a video owned by `owner`. Returns the video.
    pub async fn seed_video(db: &Database, owner: &User, title: &str) -> Video {
        let id = db
            .videos()
            .create(&NewVideo {
                uuid: uuid::Uuid::new_v4().to_string(),
                owner_id: owner.id,
                video_url: format!("https://media.test/{}.mp4", title),
                video_asset_id: format!("{}-video", title),
                thumbnail_url: format!("https://media.test/{}.png", title),
                thumbnail_asset_id: format!("{}-thumb", title),
                title: title.to_string(),
                description: title.to_string(),
                duration: 12.5,
            })
            .await
            .unwrap();
        db.videos().get_by_id(id).await.unwrap().unwrap()
    }

    pub async fn unpublish_video(db: &Database, video_id: i64) {
        sqlx::query("UPDATE videos SET is_published = 0 WHERE id = ?")
            .bind(video_id)
            .execute(&db.pool)
            .await
            .unwrap();
    }
}
