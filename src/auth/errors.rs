//! Session rejection responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::{SessionCookies, append_set_cookies};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    NotAuthenticated,
    InvalidAccessToken,
    InvalidRefreshToken,
    /// A concurrent request rotated the same refresh token first. The
    /// client's cookies are left alone; the winner's response replaces them.
    RefreshSuperseded,
    Internal,
}

/// Rejection for routes that require a session. Renders the error envelope
/// and clears both token cookies unless the failure was transient.
#[derive(Debug)]
pub struct SessionError {
    pub(super) kind: SessionErrorKind,
    pub(super) cookies: SessionCookies,
}

impl SessionError {
    pub(super) fn new(kind: SessionErrorKind, cookies: SessionCookies) -> Self {
        Self { kind, cookies }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            SessionErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Rejections caused by a transient condition keep the token cookies.
    fn clears_cookies(&self) -> bool {
        !matches!(
            self.kind,
            SessionErrorKind::RefreshSuperseded | SessionErrorKind::Internal
        )
    }

    fn message(&self) -> &'static str {
        match self.kind {
            SessionErrorKind::NotAuthenticated => "Unauthorized request",
            SessionErrorKind::InvalidAccessToken => "Invalid access token",
            SessionErrorKind::InvalidRefreshToken => "Refresh token is expired or used",
            SessionErrorKind::RefreshSuperseded => "Session was refreshed by another request",
            SessionErrorKind::Internal => "Failed to authenticate request",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    status_code: u16,
    message: &'static str,
    success: bool,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                status_code: status.as_u16(),
                message: self.message(),
                success: false,
            }),
        )
            .into_response();

        if self.clears_cookies() {
            append_set_cookies(response.headers_mut(), self.cookies.clear_both());
        }
        response
    }
}
