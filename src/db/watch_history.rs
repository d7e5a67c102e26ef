//! Per-user watch history, kept in viewing order (most recent last).

use sqlx::sqlite::SqlitePool;

use super::video::{VIDEO_OWNER_COLUMNS, VideoOwnerRow, VideoWithOwner};

/// One resolved watch history entry.
pub type WatchHistoryEntry = VideoWithOwner;

pub struct WatchHistoryStore {
    pool: SqlitePool,
}

impl WatchHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that `user_id` watched `video_id`. A re-watched video moves to the end.
    pub async fn record(&self, user_id: i64, video_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM watch_history WHERE user_id = ? AND video_id = ?")
            .bind(user_id)
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO watch_history (user_id, video_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Resolve the stored history into videos with their owner projection,
    /// in stored order.
    pub async fn list(&self, user_id: i64) -> Result<Vec<WatchHistoryEntry>, sqlx::Error> {
        let rows: Vec<VideoOwnerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM watch_history w \
             JOIN videos v ON v.id = w.video_id \
             LEFT JOIN users o ON o.id = v.owner_id \
             WHERE w.user_id = ? ORDER BY w.id",
            VIDEO_OWNER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(VideoWithOwner::from).collect())
    }
}
