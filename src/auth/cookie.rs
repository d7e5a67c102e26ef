//! Cookie and header parsing, and the `Set-Cookie` policy for token cookies.

use axum::http::{HeaderMap, HeaderValue, header};

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Builds `Set-Cookie` values for the token cookies.
#[derive(Debug, Clone, Copy)]
pub struct SessionCookies {
    pub secure: bool,
}

impl SessionCookies {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    pub fn set(&self, name: &str, value: &str, max_age_secs: u64) -> String {
        format!(
            "{}={}; HttpOnly; Path=/; Max-Age={}{}",
            name,
            value,
            max_age_secs,
            self.secure_suffix()
        )
    }

    pub fn clear(&self, name: &str) -> String {
        format!("{}=; HttpOnly; Path=/; Max-Age=0{}", name, self.secure_suffix())
    }

    /// Clearing values for both token cookies.
    pub fn clear_both(&self) -> [String; 2] {
        [self.clear(ACCESS_COOKIE_NAME), self.clear(REFRESH_COOKIE_NAME)]
    }

    fn secure_suffix(&self) -> &'static str {
        if self.secure { "; Secure" } else { "" }
    }
}

/// Append `Set-Cookie` headers, skipping values that are not valid header text.
pub fn append_set_cookies<I>(headers: &mut HeaderMap, cookies: I)
where
    I: IntoIterator<Item = String>,
{
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

/// Name of the cookie a `Set-Cookie` value targets.
pub fn set_cookie_name(value: &str) -> Option<&str> {
    value.split_once('=').map(|(name, _)| name.trim())
}
