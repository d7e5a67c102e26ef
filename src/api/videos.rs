use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartRejection},
    routing::{get, post},
};
use tracing::{info, warn};

use super::VIDEO_BODY_LIMIT;
use super::error::{ApiError, ResultExt, validate_uuid};
use super::response::ApiResponse;
use crate::auth::{MaybeSession, Session, SessionCookies, TokenIssuer};
use crate::db::{Database, NewVideo, VideoWithOwner};
use crate::impl_has_session_backend;
use crate::media::MediaStore;
use crate::uploads::{FileField, UploadForm};

const TITLE_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 5000;

#[derive(Clone)]
pub struct VideosState {
    pub db: Database,
    pub issuer: TokenIssuer,
    pub cookies: SessionCookies,
    pub media: Arc<dyn MediaStore>,
    pub temp_dir: Arc<PathBuf>,
}

impl_has_session_backend!(VideosState);

pub fn router(state: VideosState) -> Router {
    Router::new()
        .route(
            "/upload",
            post(upload_video).layer(DefaultBodyLimit::max(VIDEO_BODY_LIMIT)),
        )
        .route("/{video_id}", get(get_video))
        .with_state(state)
}

async fn upload_video(
    State(state): State<VideosState>,
    Session(session): Session,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<VideoWithOwner>, ApiError> {
    let mut form = UploadForm::read(
        multipart?,
        &state.temp_dir,
        &[FileField::video("video"), FileField::image("thumbnail")],
    )
    .await?;

    let title = form
        .text("title")
        .ok_or_else(|| ApiError::bad_request("video title required"))?
        .to_string();
    // Description defaults to the title
    let description = form.text("description").unwrap_or(&title).to_string();

    if title.chars().count() > TITLE_MAX {
        return Err(ApiError::bad_request(format!(
            "video title cannot be longer than {} characters",
            TITLE_MAX
        )));
    }
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(ApiError::bad_request(format!(
            "video description cannot be longer than {} characters",
            DESCRIPTION_MAX
        )));
    }

    let video_file = form
        .take_file("video")
        .ok_or_else(|| ApiError::bad_request("no video uploaded"))?;
    let thumbnail_file = form
        .take_file("thumbnail")
        .ok_or_else(|| ApiError::bad_request("no thumbnail was uploaded"))?;

    let video = state
        .media
        .upload(video_file.path())
        .await
        .media_err("failed to upload video")?;

    let thumbnail = match state.media.upload(thumbnail_file.path()).await {
        Ok(asset) => asset,
        Err(e) => {
            discard_assets(state.media.as_ref(), vec![video.asset_id]).await;
            return Err(ApiError::media_error("failed to upload thumbnail", e));
        }
    };

    let new_video = NewVideo {
        uuid: uuid::Uuid::new_v4().to_string(),
        owner_id: session.user.id,
        video_url: video.url,
        video_asset_id: video.asset_id,
        thumbnail_url: thumbnail.url,
        thumbnail_asset_id: thumbnail.asset_id,
        title,
        description,
        duration: video.duration.unwrap_or(0.0),
    };

    if let Err(e) = state.db.videos().create(&new_video).await {
        discard_assets(
            state.media.as_ref(),
            vec![new_video.video_asset_id, new_video.thumbnail_asset_id],
        )
        .await;
        return Err(ApiError::db_error("failed to store video", e));
    }

    let stored = state
        .db
        .videos()
        .get_with_owner(&new_video.uuid)
        .await
        .db_err("Failed to load video")?
        .ok_or_else(|| ApiError::not_found("no such video exists"))?;

    info!(video = %new_video.uuid, owner = %session.user.uuid, "Video uploaded");

    Ok(ApiResponse::created(stored, "video uploaded successfully"))
}

async fn discard_assets(media: &dyn MediaStore, asset_ids: Vec<String>) {
    let report = media.remove_many(&asset_ids).await;
    if !report.complete {
        warn!(failed = ?report.failed, "Could not remove assets of failed video upload");
    }
}

async fn get_video(
    State(state): State<VideosState>,
    MaybeSession(session): MaybeSession,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<VideoWithOwner>, ApiError> {
    validate_uuid(&video_id, "video")?;

    let video = state
        .db
        .videos()
        .get_by_uuid(&video_id)
        .await
        .db_err("Failed to load video")?
        .ok_or_else(|| ApiError::not_found("no such video exists"))?;

    let viewer = session.map(|s| s.user);
    let is_owner = viewer.as_ref().is_some_and(|u| u.id == video.owner_id);
    if !video.is_published && !is_owner {
        return Err(ApiError::not_found("no such video exists"));
    }

    if let Some(viewer) = &viewer {
        if let Err(e) = state.db.watch_history().record(viewer.id, video.id).await {
            warn!(video = %video.uuid, error = %e, "Failed to record watch history");
        }
    }

    let video = state
        .db
        .videos()
        .get_with_owner(&video_id)
        .await
        .db_err("Failed to load video")?
        .ok_or_else(|| ApiError::not_found("no such video exists"))?;

    Ok(ApiResponse::ok(video, "video fetched successfully"))
}
