//! Subscription edges and the channel profile aggregation.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

/// Channel profile with subscription counts, as seen by a requester.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub full_name: String,
    pub username: String,
    #[serde(rename = "avatar")]
    pub avatar_url: String,
    #[serde(rename = "coverImage")]
    pub cover_image_url: String,
    /// Edges with this user as channel
    pub subscriber_count: i64,
    /// Edges with this user as subscriber
    pub subscribed_to_count: i64,
    pub is_subscribed_by_requester: bool,
}

pub struct SubscriptionStore {
    pool: SqlitePool,
}

impl SubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record `subscriber_id -> channel_id`. Returns false if the edge already existed.
    /// Subscribing has no route; tests seed edges with it.
    #[cfg(test)]
    pub(crate) async fn subscribe(&self, subscriber_id: i64, channel_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscriptions (subscriber_id, channel_id) VALUES (?, ?)",
        )
        .bind(subscriber_id)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Build the channel profile for `username`.
    ///
    /// `requester_id` is the viewing user, if any; an anonymous requester is
    /// never subscribed. Returns `None` when no such user exists.
    pub async fn channel_profile(
        &self,
        username: &str,
        requester_id: Option<i64>,
    ) -> Result<Option<ChannelProfile>, sqlx::Error> {
        sqlx::query_as(
            "SELECT u.full_name, u.username, u.avatar_url, \
                COALESCE(u.cover_image_url, '') AS cover_image_url, \
                (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id) AS subscriber_count, \
                (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id) AS subscribed_to_count, \
                EXISTS(SELECT 1 FROM subscriptions s \
                       WHERE s.channel_id = u.id AND s.subscriber_id = ?) AS is_subscribed_by_requester \
             FROM users u WHERE u.username = ?",
        )
        .bind(requester_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }
}
