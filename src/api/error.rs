//! Shared error handling for API endpoints.

use axum::{
    Form, Json,
    extract::{
        FromRequest, Request,
        multipart::MultipartRejection,
        rejection::{FormRejection, JsonRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::error;

use crate::auth::TokenIssuanceError;
use crate::password::PasswordError;
use crate::uploads::UploadError;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
    fn media_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
    fn media_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::media_error(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Authentication(String),
    NotFound(String),
    Conflict(String),
    Dependency(String),
    TokenIssuance(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!(error = %e, "{}", context);
        Self::Dependency("Database error".into())
    }

    /// Media failures keep the handler's message; the cause is only logged.
    pub fn media_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!(error = %e, "{}", context);
        Self::Dependency(context.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Dependency(_) | ApiError::TokenIssuance(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation(msg)
            | ApiError::Authentication(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Dependency(msg)
            | ApiError::TokenIssuance(msg) => msg,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse<'a> {
    status_code: u16,
    message: &'a str,
    success: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            status_code: status.as_u16(),
            message: self.message(),
            success: false,
        });
        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        if e.is_client_error() {
            Self::bad_request(e.to_string())
        } else {
            error!(error = %e, "Failed to stage upload");
            Self::Dependency("Failed to store uploaded file".into())
        }
    }
}

impl From<TokenIssuanceError> for ApiError {
    fn from(e: TokenIssuanceError) -> Self {
        error!(error = %e, "Failed to issue tokens");
        Self::TokenIssuance("Failed to generate access and refresh tokens".into())
    }
}

impl From<PasswordError> for ApiError {
    fn from(e: PasswordError) -> Self {
        error!(error = %e, "Password hashing failed");
        Self::Dependency("Failed to process password".into())
    }
}

/// Whether the request declares an urlencoded form body.
pub(super) fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Request body given as JSON or as an urlencoded form. Rejections render as
/// an `ApiError`.
pub struct ApiPayload<T>(pub T);

impl<T, S> FromRequest<S> for ApiPayload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form_encoded(req.headers()) {
            let Form(value) = Form::<T>::from_request(req, state).await?;
            return Ok(ApiPayload(value));
        }
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiPayload(value))
    }
}

/// Validate a UUID string format.
pub fn validate_uuid(uuid: &str, what: &str) -> Result<(), ApiError> {
    if uuid.is_empty() || uuid.len() > 36 || uuid::Uuid::parse_str(uuid).is_err() {
        return Err(ApiError::bad_request(format!("Invalid {} id", what)));
    }
    Ok(())
}
