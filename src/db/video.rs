use serde::Serialize;
use sqlx::sqlite::SqlitePool;

/// A stored video.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Video {
    pub id: i64,
    pub uuid: String,
    pub owner_id: i64,
    pub video_url: String,
    pub video_asset_id: String,
    pub thumbnail_url: String,
    pub thumbnail_asset_id: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a video. Views start at 0 and the video is published.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub uuid: String,
    pub owner_id: i64,
    pub video_url: String,
    pub video_asset_id: String,
    pub thumbnail_url: String,
    pub thumbnail_asset_id: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
}

/// Minimal owner projection attached to videos.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerProfile {
    pub full_name: String,
    pub username: String,
    pub avatar: String,
}

/// Public video shape with its owner resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoWithOwner {
    pub id: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner: Option<OwnerProfile>,
    pub created_at: String,
    pub updated_at: String,
}

/// Row shape shared by every query that joins a video with its owner.
#[derive(sqlx::FromRow)]
pub(super) struct VideoOwnerRow {
    uuid: String,
    video_url: String,
    thumbnail_url: String,
    title: String,
    description: String,
    duration: f64,
    views: i64,
    is_published: bool,
    created_at: String,
    updated_at: String,
    owner_full_name: Option<String>,
    owner_username: Option<String>,
    owner_avatar: Option<String>,
}

/// Select list matching `VideoOwnerRow`, for `videos v LEFT JOIN users o`.
pub(super) const VIDEO_OWNER_COLUMNS: &str = "v.uuid, v.video_url, v.thumbnail_url, v.title, \
     v.description, v.duration, v.views, v.is_published, v.created_at, v.updated_at, \
     o.full_name AS owner_full_name, o.username AS owner_username, o.avatar_url AS owner_avatar";

impl From<VideoOwnerRow> for VideoWithOwner {
    fn from(row: VideoOwnerRow) -> Self {
        let owner = match (row.owner_full_name, row.owner_username, row.owner_avatar) {
            (Some(full_name), Some(username), Some(avatar)) => Some(OwnerProfile {
                full_name,
                username,
                avatar,
            }),
            _ => None,
        };

        Self {
            id: row.uuid,
            video_url: row.video_url,
            thumbnail_url: row.thumbnail_url,
            title: row.title,
            description: row.description,
            duration: row.duration,
            views: row.views,
            is_published: row.is_published,
            owner,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const VIDEO_COLUMNS: &str = "id, uuid, owner_id, video_url, video_asset_id, thumbnail_url, \
     thumbnail_asset_id, title, description, duration, views, is_published, created_at, updated_at";

pub struct VideoStore {
    pool: SqlitePool,
}

impl VideoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new video. Returns the video ID.
    pub async fn create(&self, video: &NewVideo) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO videos (uuid, owner_id, video_url, video_asset_id, thumbnail_url, \
             thumbnail_asset_id, title, description, duration) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&video.uuid)
        .bind(video.owner_id)
        .bind(&video.video_url)
        .bind(&video.video_asset_id)
        .bind(&video.thumbnail_url)
        .bind(&video.thumbnail_asset_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(video.duration)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a video by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Video>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM videos WHERE id = ?", VIDEO_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a video by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Video>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM videos WHERE uuid = ?", VIDEO_COLUMNS))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a video by UUID with its owner projection.
    pub async fn get_with_owner(&self, uuid: &str) -> Result<Option<VideoWithOwner>, sqlx::Error> {
        let row: Option<VideoOwnerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM videos v LEFT JOIN users o ON o.id = v.owner_id WHERE v.uuid = ?",
            VIDEO_OWNER_COLUMNS
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VideoWithOwner::from))
    }

    /// Asset ids (video and thumbnail) of every video owned by a user.
    pub async fn asset_ids_by_owner(&self, owner_id: i64) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT video_asset_id, thumbnail_asset_id FROM videos WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .flat_map(|(video, thumbnail)| [video, thumbnail])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::db::test_support::{seed_user, seed_video};

    #[tokio::test]
    async fn test_new_video_defaults() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;
        let video = seed_video(&db, &alice, "intro").await;

        assert_eq!(video.views, 0);
        assert!(video.is_published);
        assert_eq!(video.owner_id, alice.id);
    }

    #[tokio::test]
    async fn test_get_with_owner_projection() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;
        let video = seed_video(&db, &alice, "intro").await;

        let found = db.videos().get_with_owner(&video.uuid).await.unwrap().unwrap();
        let owner = found.owner.unwrap();
        assert_eq!(owner.username, "alice");
        assert_eq!(owner.full_name, alice.full_name);
        assert_eq!(owner.avatar, alice.avatar_url);

        assert!(db.videos().get_with_owner("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_asset_ids_by_owner() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;
        seed_video(&db, &alice, "one").await;
        seed_video(&db, &alice, "two").await;

        let ids = db.videos().asset_ids_by_owner(alice.id).await.unwrap();
        assert_eq!(ids, vec!["one-video", "one-thumb", "two-video", "two-thumb"]);
    }
}
