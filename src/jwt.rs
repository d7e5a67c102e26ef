//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate secrets so that one can
//! never be replayed as the other, even if the `typ` claim were ignored.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token - stateless, never persisted
    Access,
    /// Long-lived refresh token - the current one is stored on the user row
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// Username at the time of issuance
    pub username: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID, makes every issued refresh token distinct
    pub jti: String,
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token duration: 1 hour
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Default refresh token duration: 10 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 10 * 24 * 60 * 60;

/// Secrets and lifetimes for both token kinds.
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl TokenSettings {
    /// Settings with the default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access_secret: access_secret.to_vec(),
            refresh_secret: refresh_secret.to_vec(),
            access_ttl_secs: ACCESS_TOKEN_DURATION_SECS,
            refresh_ttl_secs: REFRESH_TOKEN_DURATION_SECS,
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// The JWT token string
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

impl JwtConfig {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(&settings.access_secret),
            access_decoding: DecodingKey::from_secret(&settings.access_secret),
            refresh_encoding: EncodingKey::from_secret(&settings.refresh_secret),
            refresh_decoding: DecodingKey::from_secret(&settings.refresh_secret),
            access_ttl_secs: settings.access_ttl_secs,
            refresh_ttl_secs: settings.refresh_ttl_secs,
        }
    }

    /// Sign an access token for a user.
    pub fn generate_access_token(
        &self,
        user_uuid: &str,
        username: &str,
    ) -> Result<SignedToken, JwtError> {
        let now = unix_now()?;

        let claims = AccessClaims {
            sub: user_uuid.to_string(),
            username: username.to_string(),
            token_type: TokenType::Access,
            iat: now,
            exp: expires_at(now, self.access_ttl_secs)?,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(JwtError::Encoding)?;

        Ok(SignedToken {
            token,
            duration: self.access_ttl_secs,
        })
    }

    /// Sign a refresh token for a user.
    pub fn generate_refresh_token(&self, user_uuid: &str) -> Result<SignedToken, JwtError> {
        let now = unix_now()?;

        let claims = RefreshClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user_uuid.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: expires_at(now, self.refresh_ttl_secs)?,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(JwtError::Encoding)?;

        Ok(SignedToken {
            token,
            duration: self.refresh_ttl_secs,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let claims = jsonwebtoken::decode::<AccessClaims>(
            token,
            &self.access_decoding,
            &strict_validation(),
        )
        .map_err(JwtError::from_decode)?
        .claims;

        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let claims = jsonwebtoken::decode::<RefreshClaims>(
            token,
            &self.refresh_decoding,
            &strict_validation(),
        )
        .map_err(JwtError::from_decode)?
        .claims;

        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }

        Ok(claims)
    }
}

fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

fn unix_now() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

fn expires_at(now: u64, ttl_secs: u64) -> Result<u64, JwtError> {
    now.checked_add(ttl_secs).ok_or(JwtError::LifetimeOverflow)
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    /// Signature and shape were fine but `exp` has passed
    #[error("Token has expired")]
    Expired,
    /// Malformed token or bad signature
    #[error("Invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("System time error")]
    TimeError,
    #[error("Token lifetime does not fit in an expiry timestamp")]
    LifetimeOverflow,
    /// e.g. an access token presented where a refresh token is expected
    #[error("Wrong token type")]
    WrongTokenType,
}

impl JwtError {
    fn from_decode(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e),
        }
    }
}
