use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::auth::append_set_cookies;

/// Success envelope: `{statusCode, data, message, success: true}`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    status_code: u16,
    data: T,
    message: String,
    success: bool,
    #[serde(skip)]
    cookies: Vec<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with_status(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.into(),
            success: true,
            cookies: Vec::new(),
        }
    }

    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, data, message)
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CREATED, data, message)
    }

    /// Attach `Set-Cookie` values.
    pub fn with_cookies(mut self, cookies: impl IntoIterator<Item = String>) -> Self {
        self.cookies.extend(cookies);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(mut self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        let cookies = std::mem::take(&mut self.cookies);
        let mut response = (status, Json(self)).into_response();
        append_set_cookies(response.headers_mut(), cookies);
        response
    }
}
