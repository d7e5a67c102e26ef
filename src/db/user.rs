use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// A stored user. Carries the password hash and refresh token, so it is never
/// serialized directly; see `api::users::UserProfile` for the public shape.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar_url: String,
    pub avatar_asset_id: String,
    pub cover_image_url: Option<String>,
    pub cover_image_asset_id: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar_url: String,
    pub avatar_asset_id: String,
    pub cover_image_url: Option<String>,
    pub cover_image_asset_id: Option<String>,
}

/// Profile fields to change. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.email.is_none() && self.username.is_none()
    }
}

const USER_COLUMNS: &str = "id, uuid, username, email, full_name, password_hash, avatar_url, \
     avatar_asset_id, cover_image_url, cover_image_asset_id, refresh_token, created_at, updated_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    pub async fn create(&self, user: &NewUser) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, username, email, full_name, password_hash, avatar_url, \
             avatar_asset_id, cover_image_url, cover_image_asset_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.uuid)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(&user.avatar_url)
        .bind(&user.avatar_asset_id)
        .bind(&user.cover_image_url)
        .bind(&user.cover_image_asset_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM users WHERE uuid = ?", USER_COLUMNS))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a user by username (case-insensitive).
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    /// Find the user matching either the username or the email.
    /// Username takes precedence when both match different users.
    pub async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ? OR email = ? \
             ORDER BY CASE WHEN username = ? THEN 0 ELSE 1 END LIMIT 1",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(email)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    /// Whether a username is already taken, optionally ignoring one user.
    pub async fn is_username_taken(
        &self,
        username: &str,
        except_id: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ? AND id IS NOT ?")
                .bind(username)
                .bind(except_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    /// Whether an email is already registered, optionally ignoring one user.
    pub async fn is_email_taken(
        &self,
        email: &str,
        except_id: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ? AND id IS NOT ?")
                .bind(email)
                .bind(except_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    /// Apply a profile patch. Only present fields are written.
    pub async fn update_details(&self, id: i64, patch: &UserPatch) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET \
                full_name = COALESCE(?, full_name), \
                email = COALESCE(?, email), \
                username = COALESCE(?, username), \
                updated_at = datetime('now') \
             WHERE id = ?",
        )
        .bind(&patch.full_name)
        .bind(&patch.email)
        .bind(&patch.username)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the avatar reference.
    pub async fn set_avatar(&self, id: i64, url: &str, asset_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET avatar_url = ?, avatar_asset_id = ?, updated_at = datetime('now') \
             WHERE id = ?",
        )
        .bind(url)
        .bind(asset_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the cover image reference.
    pub async fn set_cover_image(
        &self,
        id: i64,
        url: &str,
        asset_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET cover_image_url = ?, cover_image_asset_id = ?, \
             updated_at = datetime('now') WHERE id = ?",
        )
        .bind(url)
        .bind(asset_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored password hash.
    pub async fn set_password_hash(&self, id: i64, hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(hash)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unconditionally store a new refresh token (login).
    pub async fn set_refresh_token(&self, id: i64, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ?")
            .bind(token)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store `new` only if the stored refresh token still equals `expected`.
    /// Returns false when another rotation or a logout got there first.
    pub async fn swap_refresh_token(
        &self,
        id: i64,
        expected: &str,
        new: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ? AND refresh_token = ?")
                .bind(new)
                .bind(id)
                .bind(expected)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the stored refresh token, invalidating every outstanding one.
    pub async fn clear_refresh_token(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET refresh_token = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stored refresh token of the user with the given UUID.
    pub async fn refresh_token_of(&self, uuid: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT refresh_token FROM users WHERE uuid = ?")
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|r| r.0))
    }

    /// Delete a user by ID. Videos, subscriptions and history rows cascade.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::db::test_support::seed_user;

    use super::*;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;

        let by_uuid = db.users().get_by_uuid(&alice.uuid).await.unwrap().unwrap();
        assert_eq!(by_uuid.id, alice.id);
        assert_eq!(by_uuid.email, "alice@example.com");
        assert!(by_uuid.refresh_token.is_none());

        let by_name = db.users().get_by_username("ALICE").await.unwrap().unwrap();
        assert_eq!(by_name.id, alice.id);
    }

    #[tokio::test]
    async fn test_duplicate_username_or_email_fails() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;

        let mut duplicate = NewUser {
            uuid: uuid::Uuid::new_v4().to_string(),
            username: "Alice".to_string(),
            email: "other@example.com".to_string(),
            full_name: "Other".to_string(),
            password_hash: "x".to_string(),
            avatar_url: "u".to_string(),
            avatar_asset_id: "a".to_string(),
            cover_image_url: None,
            cover_image_asset_id: None,
        };
        let err = db.users().create(&duplicate).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));

        duplicate.username = "other".to_string();
        duplicate.email = alice.email.to_uppercase();
        let err = db.users().create(&duplicate).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_find_by_username_or_email() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;

        let users = db.users();
        let found = users
            .find_by_username_or_email(None, Some("bob@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, bob.id);

        let found = users
            .find_by_username_or_email(Some("alice"), Some("bob@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, alice.id);

        assert!(
            users
                .find_by_username_or_email(Some("carol"), None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_taken_checks_ignore_self() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;

        assert!(db.users().is_username_taken("alice", None).await.unwrap());
        assert!(
            !db.users()
                .is_username_taken("alice", Some(alice.id))
                .await
                .unwrap()
        );
        assert!(
            db.users()
                .is_email_taken("alice@example.com", None)
                .await
                .unwrap()
        );
        assert!(!db.users().is_email_taken("new@example.com", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_patch_only_touches_present_fields() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;

        let patch = UserPatch {
            full_name: Some("Alice Liddell".to_string()),
            ..Default::default()
        };
        db.users().update_details(alice.id, &patch).await.unwrap();

        let updated = db.users().get_by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(updated.full_name, "Alice Liddell");
        assert_eq!(updated.username, alice.username);
        assert_eq!(updated.email, alice.email);
    }

    #[tokio::test]
    async fn test_refresh_token_compare_and_swap() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;
        let users = db.users();

        users.set_refresh_token(alice.id, "first").await.unwrap();
        assert!(users.swap_refresh_token(alice.id, "first", "second").await.unwrap());
        // Stale expectation loses
        assert!(!users.swap_refresh_token(alice.id, "first", "third").await.unwrap());
        assert_eq!(
            users.refresh_token_of(&alice.uuid).await.unwrap().as_deref(),
            Some("second")
        );

        users.clear_refresh_token(alice.id).await.unwrap();
        assert!(users.refresh_token_of(&alice.uuid).await.unwrap().is_none());
        // Nothing to swap against after logout
        assert!(!users.swap_refresh_token(alice.id, "second", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = seed_user(&db, "alice").await;

        assert!(db.users().delete(alice.id).await.unwrap());
        assert!(db.users().get_by_id(alice.id).await.unwrap().is_none());
        assert!(!db.users().delete(alice.id).await.unwrap());
    }
}
