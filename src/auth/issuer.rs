//! Token pair issuance and rotation.
//!
//! Issuing a pair signs both tokens and persists the refresh token on the
//! user row before anything is returned. Rotation only succeeds while the
//! stored refresh token still equals the presented one.

use std::sync::Arc;

use serde::Serialize;

use crate::db::{Database, User};
use crate::jwt::{JwtConfig, JwtError};

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(skip)]
    pub access_ttl_secs: u64,
    #[serde(skip)]
    pub refresh_ttl_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenIssuanceError {
    #[error("Failed to sign token: {0}")]
    Signing(#[from] JwtError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("User not found")]
    UserNotFound,
    /// The presented refresh token is no longer the stored one
    #[error("Refresh token was already used or revoked")]
    Superseded,
}

#[derive(Clone)]
pub struct TokenIssuer {
    jwt: Arc<JwtConfig>,
    db: Database,
}

impl TokenIssuer {
    pub fn new(jwt: Arc<JwtConfig>, db: Database) -> Self {
        Self { jwt, db }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Issue a pair for `user_id` and store its refresh token unconditionally.
    /// The user is re-read so the access token never carries stale claims.
    pub async fn issue_pair(&self, user_id: i64) -> Result<(TokenPair, User), TokenIssuanceError> {
        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or(TokenIssuanceError::UserNotFound)?;
        let pair = self.sign_pair(&user)?;

        if !self
            .db
            .users()
            .set_refresh_token(user.id, &pair.refresh_token)
            .await?
        {
            return Err(TokenIssuanceError::UserNotFound);
        }

        Ok((pair, user))
    }

    /// Exchange `presented` for a new pair. Fails with `Superseded` when the
    /// stored token differs, including when a concurrent rotation won.
    pub async fn rotate_pair(
        &self,
        user_id: i64,
        presented: &str,
    ) -> Result<(TokenPair, User), TokenIssuanceError> {
        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or(TokenIssuanceError::UserNotFound)?;
        let pair = self.sign_pair(&user)?;

        let swapped = self
            .db
            .users()
            .swap_refresh_token(user.id, presented, &pair.refresh_token)
            .await?;
        if !swapped {
            return Err(TokenIssuanceError::Superseded);
        }

        Ok((pair, user))
    }

    fn sign_pair(&self, user: &User) -> Result<TokenPair, JwtError> {
        let access = self.jwt.generate_access_token(&user.uuid, &user.username)?;
        let refresh = self.jwt.generate_refresh_token(&user.uuid)?;
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            access_ttl_secs: access.duration,
            refresh_ttl_secs: refresh.duration,
        })
    }
}
