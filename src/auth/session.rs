//! Per-request session evaluation.
//!
//! `evaluate_session` is a pure function of the presented tokens, the token
//! configuration and the refresh token currently stored for the user. It
//! performs no I/O; the extractor fetches the stored token and acts on the
//! resulting state.

use axum::http::HeaderMap;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, bearer_token, get_cookie};
use crate::jwt::{AccessClaims, JwtConfig, JwtError, RefreshClaims};

/// Tokens presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    /// From the access cookie, else the `Authorization: Bearer` header
    pub access: Option<String>,
    /// From the refresh cookie only
    pub refresh: Option<String>,
}

impl SessionCredentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let access = get_cookie(headers, ACCESS_COOKIE_NAME)
            .filter(|v| !v.is_empty())
            .or_else(|| bearer_token(headers))
            .map(str::to_string);
        let refresh = get_cookie(headers, REFRESH_COOKIE_NAME)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Self { access, refresh }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Why a refresh token could not revive a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    Missing,
    Expired,
    Invalid,
    /// Verifies, but is not the token stored for the user (rotated away or logged out)
    NotCurrent,
}

#[derive(Debug, Clone)]
pub enum SessionState {
    NoCredentials,
    AccessValid(AccessClaims),
    /// Access failed; the refresh token verifies and is the stored one. Rotate.
    AccessExpiredRefreshValid(RefreshClaims),
    AccessExpiredRefreshInvalid(RefreshRejection),
}

/// Verify the presented refresh token without comparing it to storage.
/// Returns the claims so the caller can look up the stored token by `sub`.
pub fn decode_refresh(
    credentials: &SessionCredentials,
    jwt: &JwtConfig,
) -> Result<RefreshClaims, RefreshRejection> {
    let token = credentials
        .refresh
        .as_deref()
        .ok_or(RefreshRejection::Missing)?;
    jwt.validate_refresh_token(token).map_err(|e| match e {
        JwtError::Expired => RefreshRejection::Expired,
        _ => RefreshRejection::Invalid,
    })
}

/// Decide the session state for one request.
///
/// `stored_refresh` is the refresh token currently persisted for the user named
/// by the refresh token's `sub`; it is only consulted when the access token
/// does not verify.
pub fn evaluate_session(
    credentials: &SessionCredentials,
    jwt: &JwtConfig,
    stored_refresh: Option<&str>,
) -> SessionState {
    if credentials.is_empty() {
        return SessionState::NoCredentials;
    }

    if let Some(access) = credentials.access.as_deref() {
        if let Ok(claims) = jwt.validate_access_token(access) {
            return SessionState::AccessValid(claims);
        }
    }

    let claims = match decode_refresh(credentials, jwt) {
        Ok(claims) => claims,
        Err(rejection) => return SessionState::AccessExpiredRefreshInvalid(rejection),
    };

    match (credentials.refresh.as_deref(), stored_refresh) {
        (Some(presented), Some(stored)) if presented == stored => {
            SessionState::AccessExpiredRefreshValid(claims)
        }
        _ => SessionState::AccessExpiredRefreshInvalid(RefreshRejection::NotCurrent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{TokenSettings, TokenType};
    use axum::http::{HeaderValue, header};
    use jsonwebtoken::{EncodingKey, Header};

    const ACCESS_SECRET: &[u8] = b"session-access-secret-for-tests-0000";
    const REFRESH_SECRET: &[u8] = b"session-refresh-secret-for-tests-000";

    fn jwt() -> JwtConfig {
        JwtConfig::new(&TokenSettings::new(ACCESS_SECRET, REFRESH_SECRET))
    }

    fn expired_access() -> String {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = AccessClaims {
            sub: "user-1".to_string(),
            username: "alice".to_string(),
            token_type: TokenType::Access,
            iat: now - 7200,
            exp: now - 3600,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(ACCESS_SECRET),
        )
        .unwrap()
    }

    fn creds(access: Option<&str>, refresh: Option<&str>) -> SessionCredentials {
        SessionCredentials {
            access: access.map(str::to_string),
            refresh: refresh.map(str::to_string),
        }
    }

    #[test]
    fn test_no_credentials() {
        let state = evaluate_session(&creds(None, None), &jwt(), None);
        assert!(matches!(state, SessionState::NoCredentials));
    }

    #[test]
    fn test_access_valid_ignores_refresh() {
        let jwt = jwt();
        let access = jwt.generate_access_token("user-1", "alice").unwrap().token;

        let state = evaluate_session(&creds(Some(&access), Some("garbage")), &jwt, None);
        match state {
            SessionState::AccessValid(claims) => assert_eq!(claims.sub, "user-1"),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_expired_access_with_current_refresh() {
        let jwt = jwt();
        let refresh = jwt.generate_refresh_token("user-1").unwrap().token;

        let state = evaluate_session(
            &creds(Some(&expired_access()), Some(&refresh)),
            &jwt,
            Some(&refresh),
        );
        match state {
            SessionState::AccessExpiredRefreshValid(claims) => assert_eq!(claims.sub, "user-1"),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_refresh_only_request_rotates() {
        let jwt = jwt();
        let refresh = jwt.generate_refresh_token("user-1").unwrap().token;

        let state = evaluate_session(&creds(None, Some(&refresh)), &jwt, Some(&refresh));
        assert!(matches!(state, SessionState::AccessExpiredRefreshValid(_)));
    }

    #[test]
    fn test_stale_refresh_is_rejected() {
        let jwt = jwt();
        let stale = jwt.generate_refresh_token("user-1").unwrap().token;
        let current = jwt.generate_refresh_token("user-1").unwrap().token;

        let state = evaluate_session(
            &creds(Some(&expired_access()), Some(&stale)),
            &jwt,
            Some(&current),
        );
        assert!(matches!(
            state,
            SessionState::AccessExpiredRefreshInvalid(RefreshRejection::NotCurrent)
        ));
    }

    #[test]
    fn test_logged_out_refresh_is_rejected() {
        let jwt = jwt();
        let refresh = jwt.generate_refresh_token("user-1").unwrap().token;

        let state = evaluate_session(&creds(None, Some(&refresh)), &jwt, None);
        assert!(matches!(
            state,
            SessionState::AccessExpiredRefreshInvalid(RefreshRejection::NotCurrent)
        ));
    }

    #[test]
    fn test_missing_or_malformed_refresh() {
        let jwt = jwt();

        let state = evaluate_session(&creds(Some(&expired_access()), None), &jwt, None);
        assert!(matches!(
            state,
            SessionState::AccessExpiredRefreshInvalid(RefreshRejection::Missing)
        ));

        let state = evaluate_session(&creds(None, Some("not-a-jwt")), &jwt, Some("not-a-jwt"));
        assert!(matches!(
            state,
            SessionState::AccessExpiredRefreshInvalid(RefreshRejection::Invalid)
        ));
    }

    #[test]
    fn test_access_token_is_not_a_refresh_token() {
        let jwt = jwt();
        let access = jwt.generate_access_token("user-1", "alice").unwrap().token;

        let state = evaluate_session(&creds(None, Some(&access)), &jwt, Some(&access));
        assert!(matches!(
            state,
            SessionState::AccessExpiredRefreshInvalid(RefreshRejection::Invalid)
        ));
    }

    #[test]
    fn test_credentials_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        let credentials = SessionCredentials::from_headers(&headers);
        assert_eq!(credentials.access.as_deref(), Some("from-header"));
        assert_eq!(credentials.refresh, None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("accessToken=from-cookie; refreshToken=r"),
        );
        let credentials = SessionCredentials::from_headers(&headers);
        assert_eq!(credentials.access.as_deref(), Some("from-cookie"));
        assert_eq!(credentials.refresh.as_deref(), Some("r"));
    }
}
