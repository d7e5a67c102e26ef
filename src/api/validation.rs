//! Input normalization for account fields. Each function returns the value to
//! store or a 400.

use std::sync::LazyLock;

use regex::Regex;

use super::error::ApiError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9-]+(\.[a-z0-9-]+)*\.[a-z]{2,}$")
        .expect("email pattern is valid")
});

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 32;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;
pub const FULL_NAME_MAX: usize = 100;

pub fn normalize_username(raw: &str) -> Result<String, ApiError> {
    let username = raw.trim().to_lowercase();

    if username.len() < USERNAME_MIN || username.len() > USERNAME_MAX {
        return Err(ApiError::bad_request(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(ApiError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    Ok(username)
}

pub fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    if email.len() > 254 || !EMAIL_RE.is_match(&email) {
        return Err(ApiError::bad_request("ERROR: invalid email address"));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    let length = password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&length) {
        return Err(ApiError::bad_request(format!(
            "Password must be between {} and {} characters",
            PASSWORD_MIN, PASSWORD_MAX
        )));
    }
    if password
        .chars()
        .any(|c| c == '<' || c == '>' || c.is_control())
    {
        return Err(ApiError::bad_request(
            "Password cannot contain '<', '>' or control characters",
        ));
    }
    Ok(())
}

pub fn normalize_full_name(raw: &str) -> Result<String, ApiError> {
    let full_name = raw.trim();
    let length = full_name.chars().count();
    if length == 0 || length > FULL_NAME_MAX {
        return Err(ApiError::bad_request(format!(
            "Full name must be between 1 and {} characters",
            FULL_NAME_MAX
        )));
    }
    Ok(full_name.to_string())
}
