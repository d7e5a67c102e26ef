//! Axum extractors for sessions, and the middleware that delivers rotated
//! token cookies.

use std::cell::RefCell;

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use super::cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, append_set_cookies, set_cookie_name,
};
use super::errors::{SessionError, SessionErrorKind};
use super::issuer::TokenIssuanceError;
use super::session::{
    RefreshRejection, SessionCredentials, SessionState, decode_refresh, evaluate_session,
};
use super::state::HasSessionBackend;
use super::types::SessionUser;

tokio::task_local! {
    /// Cookies produced by a refresh-token rotation inside an extractor.
    /// Drained by `attach_rotated_cookies` once the handler has responded.
    static ROTATED_SESSION_COOKIES: RefCell<Vec<String>>;
}

/// Resolve the session for a request. `Ok(None)` means no credentials were
/// presented at all.
async fn authenticate_request<S>(
    parts: &Parts,
    state: &S,
) -> Result<Option<SessionUser>, SessionErrorKind>
where
    S: HasSessionBackend + Send + Sync,
{
    let credentials = SessionCredentials::from_headers(&parts.headers);
    let jwt = state.jwt();

    // Storage is only consulted once the refresh token itself verifies
    let session = match evaluate_session(&credentials, jwt, None) {
        SessionState::AccessExpiredRefreshInvalid(RefreshRejection::NotCurrent) => {
            let stored = match decode_refresh(&credentials, jwt) {
                Ok(claims) => state
                    .db()
                    .users()
                    .refresh_token_of(&claims.sub)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to load stored refresh token");
                        SessionErrorKind::Internal
                    })?,
                Err(_) => None,
            };
            evaluate_session(&credentials, jwt, stored.as_deref())
        }
        other => other,
    };

    match session {
        SessionState::NoCredentials => Ok(None),
        SessionState::AccessValid(claims) => {
            let user = state
                .db()
                .users()
                .get_by_uuid(&claims.sub)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to load session user");
                    SessionErrorKind::Internal
                })?
                .ok_or(SessionErrorKind::InvalidAccessToken)?;
            Ok(Some(SessionUser { user }))
        }
        SessionState::AccessExpiredRefreshValid(claims) => {
            let presented = credentials
                .refresh
                .as_deref()
                .ok_or(SessionErrorKind::InvalidRefreshToken)?;
            let user = state
                .db()
                .users()
                .get_by_uuid(&claims.sub)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to load session user");
                    SessionErrorKind::Internal
                })?
                .ok_or(SessionErrorKind::InvalidRefreshToken)?;

            let (pair, user) = state
                .issuer()
                .rotate_pair(user.id, presented)
                .await
                .map_err(|e| match e {
                    TokenIssuanceError::Superseded => {
                        tracing::debug!(
                            user = %claims.sub,
                            "Refresh token rotated by a concurrent request"
                        );
                        SessionErrorKind::RefreshSuperseded
                    }
                    TokenIssuanceError::UserNotFound => SessionErrorKind::InvalidRefreshToken,
                    e => {
                        tracing::error!(error = %e, "Failed to rotate session tokens");
                        SessionErrorKind::Internal
                    }
                })?;

            tracing::debug!(user = %user.uuid, "Session revived with refresh token");

            let cookies = state.cookies();
            let new_cookies = [
                cookies.set(ACCESS_COOKIE_NAME, &pair.access_token, pair.access_ttl_secs),
                cookies.set(REFRESH_COOKIE_NAME, &pair.refresh_token, pair.refresh_ttl_secs),
            ];
            let _ = ROTATED_SESSION_COOKIES.try_with(|cell| {
                cell.borrow_mut().extend(new_cookies);
            });

            Ok(Some(SessionUser { user }))
        }
        SessionState::AccessExpiredRefreshInvalid(RefreshRejection::Missing) => {
            // Only a bad access token was presented
            Err(SessionErrorKind::InvalidAccessToken)
        }
        SessionState::AccessExpiredRefreshInvalid(_) => Err(SessionErrorKind::InvalidRefreshToken),
    }
}

/// Extractor for routes that require a session.
pub struct Session(pub SessionUser);

impl<S> FromRequestParts<S> for Session
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match authenticate_request(parts, state).await {
            Ok(Some(user)) => Ok(Session(user)),
            Ok(None) => Err(SessionError::new(
                SessionErrorKind::NotAuthenticated,
                state.cookies(),
            )),
            Err(kind) => Err(SessionError::new(kind, state.cookies())),
        }
    }
}

/// Optional session extractor. Never fails; any failure reads as anonymous.
pub struct MaybeSession(pub Option<SessionUser>);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(
            authenticate_request(parts, state).await.ok().flatten(),
        ))
    }
}

/// Middleware that appends cookies from a refresh-token rotation to the
/// response. A cookie the handler already set itself (login, logout) wins.
pub async fn attach_rotated_cookies(request: Request, next: Next) -> Response {
    let (mut response, rotated) = ROTATED_SESSION_COOKIES
        .scope(RefCell::new(Vec::new()), async move {
            let response = next.run(request).await;
            let rotated = ROTATED_SESSION_COOKIES.with(|cell| cell.take());
            (response, rotated)
        })
        .await;

    if rotated.is_empty() {
        return response;
    }

    let already_set: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(set_cookie_name)
        .map(str::to_string)
        .collect();

    let pending = rotated.into_iter().filter(|cookie| {
        set_cookie_name(cookie).is_none_or(|name| !already_set.iter().any(|set| set == name))
    });
    append_set_cookies(response.headers_mut(), pending);

    response
}
