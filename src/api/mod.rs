mod error;
mod response;
mod users;
mod validation;
mod videos;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, middleware};

use crate::auth::{SessionCookies, TokenIssuer, attach_rotated_cookies};
use crate::db::Database;
use crate::media::MediaStore;

pub use error::{ApiError, ApiPayload, ResultExt};
pub use response::ApiResponse;
pub use users::{UserProfile, UsersState};
pub use videos::VideosState;

/// Body limit for JSON requests.
pub const JSON_BODY_LIMIT: usize = 16 * 1024;

/// Body limit for image uploads (avatar, cover image).
pub const IMAGE_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Body limit for video uploads (video plus thumbnail).
pub const VIDEO_BODY_LIMIT: usize = 512 * 1024 * 1024;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    issuer: TokenIssuer,
    cookies: SessionCookies,
    media: Arc<dyn MediaStore>,
    temp_dir: PathBuf,
) -> Router {
    let temp_dir = Arc::new(temp_dir);

    let videos_state = videos::VideosState {
        db: db.clone(),
        issuer: issuer.clone(),
        cookies,
        media: media.clone(),
        temp_dir: temp_dir.clone(),
    };

    let users_state = users::UsersState {
        db,
        issuer,
        cookies,
        media,
        temp_dir,
    };

    Router::new()
        .nest("/users", users::router(users_state))
        .nest("/videos", videos::router(videos_state))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(middleware::from_fn(attach_rotated_cookies))
}
