//! Password hashing with Argon2id.
//!
//! Hashing is CPU-bound, so both operations run on the blocking pool and carry
//! the caller's span with them.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version,
    password_hash::{PasswordHasher, SaltString, rand_core},
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    Hash(String),
    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),
    #[error("Hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(15000, 2, 1, None).map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into a PHC string.
#[tracing::instrument(name = "Computing password hash", skip_all)]
pub async fn hash_password(password: String) -> Result<String, PasswordError> {
    let current_span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        current_span.in_scope(|| {
            let salt = SaltString::generate(rand_core::OsRng);
            hasher()?
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| PasswordError::Hash(e.to_string()))
        })
    })
    .await?
}

/// Check a candidate password against a stored PHC string.
/// Returns `Ok(false)` for a wrong password.
#[tracing::instrument(name = "Verifying password hash", skip_all)]
pub async fn verify_password(expected_hash: String, candidate: String) -> Result<bool, PasswordError> {
    let current_span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        current_span.in_scope(|| {
            let expected = PasswordHash::new(&expected_hash)
                .map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
            match hasher()?.verify_password(candidate.as_bytes(), &expected) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(PasswordError::Hash(e.to_string())),
            }
        })
    })
    .await?
}
