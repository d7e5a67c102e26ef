use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartRejection},
    http::HeaderMap,
    routing::{delete, get, patch, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::IMAGE_BODY_LIMIT;
use super::error::{ApiError, ApiPayload, ResultExt, is_form_encoded};
use super::response::ApiResponse;
use super::validation::{
    normalize_email, normalize_full_name, normalize_username, validate_password,
};
use crate::auth::{
    ACCESS_COOKIE_NAME, MaybeSession, REFRESH_COOKIE_NAME, Session, SessionCookies,
    TokenIssuanceError, TokenIssuer, TokenPair, get_cookie,
};
use crate::db::{ChannelProfile, Database, NewUser, User, UserPatch, WatchHistoryEntry, is_unique_violation};
use crate::impl_has_session_backend;
use crate::media::{MediaStore, RemovalReport};
use crate::password::{hash_password, verify_password};
use crate::uploads::{FileField, UploadForm};

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub issuer: TokenIssuer,
    pub cookies: SessionCookies,
    pub media: Arc<dyn MediaStore>,
    pub temp_dir: Arc<PathBuf>,
}

impl_has_session_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route(
            "/register",
            post(register).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/current", get(current_user))
        .route("/change-password", post(change_password))
        .route("/update-details", patch(update_details))
        .route(
            "/avatar",
            patch(update_avatar).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
        .route(
            "/cover-image",
            patch(update_cover_image).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
        .route("/delete-account", delete(delete_account))
        .route("/channel/{username}", get(channel_profile))
        .route("/watch-history", get(watch_history))
        .with_state(state)
}

/// User as exposed over the API. Never carries the password hash or refresh token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.uuid.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar_url.clone(),
            cover_image: user.cover_image_url.clone().unwrap_or_default(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

fn token_cookies(cookies: SessionCookies, pair: &TokenPair) -> [String; 2] {
    [
        cookies.set(ACCESS_COOKIE_NAME, &pair.access_token, pair.access_ttl_secs),
        cookies.set(REFRESH_COOKIE_NAME, &pair.refresh_token, pair.refresh_ttl_secs),
    ]
}

/// Best-effort removal of assets uploaded earlier in a request that failed later.
async fn compensate(media: &dyn MediaStore, asset_ids: Vec<String>) {
    if asset_ids.is_empty() {
        return;
    }
    let report = media.remove_many(&asset_ids).await;
    if report.complete {
        warn!(assets = ?report.deleted, "Removed assets of failed request");
    } else {
        warn!(failed = ?report.failed, "Could not remove assets of failed request");
    }
}

async fn reload(db: &Database, id: i64) -> Result<User, ApiError> {
    db.users()
        .get_by_id(id)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::not_found("user does not exist"))
}

// =============================================================================
// Registration and login
// =============================================================================

async fn register(
    State(state): State<UsersState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<UserProfile>, ApiError> {
    let mut form = UploadForm::read(
        multipart?,
        &state.temp_dir,
        &[FileField::image("avatar"), FileField::image("coverImage")],
    )
    .await?;

    let (Some(full_name), Some(email), Some(username), Some(password)) = (
        form.text("fullName"),
        form.text("email"),
        form.text("username"),
        form.text("password"),
    ) else {
        return Err(ApiError::bad_request("ERROR: all fields are required"));
    };

    let full_name = normalize_full_name(full_name)?;
    let email = normalize_email(email)?;
    let username = normalize_username(username)?;
    validate_password(password)?;
    let password = password.to_string();

    let users = state.db.users();
    if users
        .is_username_taken(&username, None)
        .await
        .db_err("Failed to check username")?
    {
        return Err(ApiError::conflict("ERROR: username already taken"));
    }
    if users
        .is_email_taken(&email, None)
        .await
        .db_err("Failed to check email")?
    {
        return Err(ApiError::conflict(
            "ERROR: another account with this email already exists",
        ));
    }

    let avatar_file = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::bad_request("ERROR: please upload a avatar"))?;
    let cover_file = form.take_file("coverImage");

    let password_hash = hash_password(password).await?;

    let avatar = state
        .media
        .upload(avatar_file.path())
        .await
        .media_err("ERROR: avatar not uploaded")?;

    let cover = match &cover_file {
        Some(file) => match state.media.upload(file.path()).await {
            Ok(asset) => Some(asset),
            Err(e) => {
                compensate(state.media.as_ref(), vec![avatar.asset_id.clone()]).await;
                return Err(ApiError::media_error("ERROR: cover image not uploaded", e));
            }
        },
        None => None,
    };

    let new_user = NewUser {
        uuid: uuid::Uuid::new_v4().to_string(),
        username,
        email,
        full_name,
        password_hash,
        avatar_url: avatar.url.clone(),
        avatar_asset_id: avatar.asset_id.clone(),
        cover_image_url: cover.as_ref().map(|c| c.url.clone()),
        cover_image_asset_id: cover.as_ref().map(|c| c.asset_id.clone()),
    };

    let id = match users.create(&new_user).await {
        Ok(id) => id,
        Err(e) => {
            let mut uploaded = vec![avatar.asset_id];
            uploaded.extend(cover.map(|c| c.asset_id));
            compensate(state.media.as_ref(), uploaded).await;

            if is_unique_violation(&e) {
                return Err(ApiError::conflict("ERROR: username or email already taken"));
            }
            return Err(ApiError::db_error("ERROR: failed to create new user", e));
        }
    };

    let user = reload(&state.db, id).await?;
    info!(user = %user.uuid, username = %user.username, "Account created");

    Ok(ApiResponse::created(
        UserProfile::from(&user),
        "User created successfully",
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: UserProfile,
    #[serde(flatten)]
    tokens: TokenPair,
}

async fn login(
    State(state): State<UsersState>,
    ApiPayload(payload): ApiPayload<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    let username = payload
        .username
        .as_deref()
        .map(|u| u.trim().to_lowercase())
        .filter(|u| !u.is_empty());
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());

    if username.is_none() && email.is_none() {
        return Err(ApiError::bad_request(
            "ERROR: please provide email or username",
        ));
    }

    let password = payload
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("ERROR: password is required"))?;

    let user = state
        .db
        .users()
        .find_by_username_or_email(username.as_deref(), email.as_deref())
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::not_found("ERROR: User does not exist"))?;

    if !verify_password(user.password_hash.clone(), password).await? {
        return Err(ApiError::unauthorized("ERROR: wrong password"));
    }

    let (tokens, user) = state.issuer.issue_pair(user.id).await?;
    info!(user = %user.uuid, "User logged in");

    let cookies = token_cookies(state.cookies, &tokens);
    Ok(ApiResponse::ok(
        LoginResponse {
            user: UserProfile::from(&user),
            tokens,
        },
        "user logged in successfully",
    )
    .with_cookies(cookies))
}

async fn logout(
    State(state): State<UsersState>,
    Session(session): Session,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    state
        .db
        .users()
        .clear_refresh_token(session.user.id)
        .await
        .db_err("Failed to clear refresh token")?;

    info!(user = %session.user.uuid, "User logged out");

    Ok(
        ApiResponse::ok(serde_json::json!({}), "user logged out successfully")
            .with_cookies(state.cookies.clear_both()),
    )
}

/// Refresh token from the cookie, else from the body's `refreshToken` field
/// (JSON or urlencoded form).
fn presented_refresh_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    if let Some(token) = get_cookie(headers, REFRESH_COOKIE_NAME).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RefreshBody {
        refresh_token: Option<String>,
    }

    let from_body = if is_form_encoded(headers) {
        url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "refreshToken")
            .map(|(_, value)| value.into_owned())
    } else {
        serde_json::from_slice::<RefreshBody>(body)
            .ok()
            .and_then(|b| b.refresh_token)
    };
    from_body.filter(|t| !t.is_empty())
}

async fn refresh_token(
    State(state): State<UsersState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<TokenPair>, ApiError> {
    let presented = presented_refresh_token(&headers, &body)
        .ok_or_else(|| ApiError::unauthorized("unauthorized request"))?;

    let claims = state
        .issuer
        .jwt()
        .validate_refresh_token(&presented)
        .map_err(|_| ApiError::unauthorized("refresh token expired or invalid"))?;

    let user = state
        .db
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    let (tokens, _) = match state.issuer.rotate_pair(user.id, &presented).await {
        Ok(rotated) => rotated,
        Err(TokenIssuanceError::Superseded) => {
            return Err(ApiError::unauthorized("refresh token expired or invalid"));
        }
        Err(e) => return Err(e.into()),
    };

    let cookies = token_cookies(state.cookies, &tokens);
    Ok(ApiResponse::ok(tokens, "access token generated").with_cookies(cookies))
}

// =============================================================================
// Profile
// =============================================================================

async fn current_user(Session(session): Session) -> ApiResponse<UserProfile> {
    ApiResponse::ok(
        UserProfile::from(&session.user),
        "user fetched successfully",
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: Option<String>,
    new_password: Option<String>,
}

async fn change_password(
    State(state): State<UsersState>,
    Session(session): Session,
    ApiPayload(payload): ApiPayload<ChangePasswordRequest>,
) -> Result<ApiResponse<TokenPair>, ApiError> {
    let (Some(current), Some(new)) = (payload.current_password, payload.new_password) else {
        return Err(ApiError::bad_request(
            "current and new password are required",
        ));
    };

    if !verify_password(session.user.password_hash.clone(), current).await? {
        return Err(ApiError::unauthorized("entered password is incorrect"));
    }
    validate_password(&new)?;

    let hash = hash_password(new).await?;
    state
        .db
        .users()
        .set_password_hash(session.user.id, &hash)
        .await
        .db_err("Failed to update password")?;

    // Every other session's refresh token dies with the old password
    let (tokens, user) = state.issuer.issue_pair(session.user.id).await?;
    info!(user = %user.uuid, "Password changed");

    let cookies = token_cookies(state.cookies, &tokens);
    Ok(ApiResponse::ok(tokens, "password changed successfully").with_cookies(cookies))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateDetailsRequest {
    full_name: Option<String>,
    email: Option<String>,
    username: Option<String>,
}

async fn update_details(
    State(state): State<UsersState>,
    Session(session): Session,
    ApiPayload(payload): ApiPayload<UpdateDetailsRequest>,
) -> Result<ApiResponse<UserProfile>, ApiError> {
    let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let patch = UserPatch {
        full_name: present(payload.full_name)
            .map(|v| normalize_full_name(&v))
            .transpose()?,
        email: present(payload.email)
            .map(|v| normalize_email(&v))
            .transpose()?,
        username: present(payload.username)
            .map(|v| normalize_username(&v))
            .transpose()?,
    };

    if patch.is_empty() {
        return Err(ApiError::bad_request("none of the details are changed"));
    }

    let users = state.db.users();
    let id = session.user.id;

    if let Some(username) = &patch.username {
        if users
            .is_username_taken(username, Some(id))
            .await
            .db_err("Failed to check username")?
        {
            return Err(ApiError::conflict("ERROR: username already taken"));
        }
    }
    if let Some(email) = &patch.email {
        if users
            .is_email_taken(email, Some(id))
            .await
            .db_err("Failed to check email")?
        {
            return Err(ApiError::conflict(
                "ERROR: another account with this email already exists",
            ));
        }
    }

    if let Err(e) = users.update_details(id, &patch).await {
        if is_unique_violation(&e) {
            return Err(ApiError::conflict("ERROR: username or email already taken"));
        }
        return Err(ApiError::db_error("Failed to update user details", e));
    }

    let user = reload(&state.db, id).await?;
    Ok(ApiResponse::ok(UserProfile::from(&user), "user details updated"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AvatarUpdateResponse {
    user: UserProfile,
    avatar_delete_status: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CoverImageUpdateResponse {
    user: UserProfile,
    cover_image_delete_status: Option<&'static str>,
}

/// Which image of the profile an upload replaces.
#[derive(Clone, Copy)]
enum ProfileImage {
    Avatar,
    CoverImage,
}

impl ProfileImage {
    fn field(self) -> &'static str {
        match self {
            ProfileImage::Avatar => "avatar",
            ProfileImage::CoverImage => "coverImage",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ProfileImage::Avatar => "avatar",
            ProfileImage::CoverImage => "cover image",
        }
    }
}

/// Upload a replacement image, persist it, then best-effort remove the old
/// asset. Returns the reloaded user and whether the old asset was deleted.
async fn replace_profile_image(
    state: &UsersState,
    user: &User,
    multipart: Multipart,
    image: ProfileImage,
) -> Result<(User, Option<&'static str>), ApiError> {
    let mut form =
        UploadForm::read(multipart, &state.temp_dir, &[FileField::image(image.field())]).await?;
    let file = form
        .take_file(image.field())
        .ok_or_else(|| ApiError::bad_request(format!("no {} was uploaded", image.label())))?;

    let asset = state
        .media
        .upload(file.path())
        .await
        .media_err(&format!("unable to upload {}", image.label()))?;

    let users = state.db.users();
    let (stored, previous) = match image {
        ProfileImage::Avatar => (
            users.set_avatar(user.id, &asset.url, &asset.asset_id).await,
            Some(user.avatar_asset_id.clone()),
        ),
        ProfileImage::CoverImage => (
            users
                .set_cover_image(user.id, &asset.url, &asset.asset_id)
                .await,
            user.cover_image_asset_id.clone(),
        ),
    };

    match stored {
        Ok(true) => {}
        Ok(false) => {
            compensate(state.media.as_ref(), vec![asset.asset_id]).await;
            return Err(ApiError::not_found("user does not exist"));
        }
        Err(e) => {
            compensate(state.media.as_ref(), vec![asset.asset_id]).await;
            return Err(ApiError::db_error(
                &format!("failed to update {}", image.label()),
                e,
            ));
        }
    }

    let delete_status = match previous {
        Some(old) => match state.media.remove(&old).await {
            Ok(()) => Some("deleted"),
            Err(e) => {
                warn!(asset_id = %old, error = %e, "Failed to remove replaced {}", image.label());
                None
            }
        },
        None => None,
    };

    let user = reload(&state.db, user.id).await?;
    Ok((user, delete_status))
}

async fn update_avatar(
    State(state): State<UsersState>,
    Session(session): Session,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<AvatarUpdateResponse>, ApiError> {
    let (user, status) =
        replace_profile_image(&state, &session.user, multipart?, ProfileImage::Avatar).await?;

    Ok(ApiResponse::ok(
        AvatarUpdateResponse {
            user: UserProfile::from(&user),
            avatar_delete_status: status,
        },
        "avatar updated successfully",
    ))
}

async fn update_cover_image(
    State(state): State<UsersState>,
    Session(session): Session,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<CoverImageUpdateResponse>, ApiError> {
    let (user, status) =
        replace_profile_image(&state, &session.user, multipart?, ProfileImage::CoverImage)
            .await?;

    Ok(ApiResponse::ok(
        CoverImageUpdateResponse {
            user: UserProfile::from(&user),
            cover_image_delete_status: status,
        },
        "cover image updated successfully",
    ))
}

// =============================================================================
// Account deletion
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAccountResponse {
    deleted_user: UserProfile,
    cleanup_status: RemovalReport,
}

async fn delete_account(
    State(state): State<UsersState>,
    Session(session): Session,
) -> Result<ApiResponse<DeleteAccountResponse>, ApiError> {
    let user = session.user;

    // Collected before the row goes, videos cascade with it
    let mut asset_ids = vec![user.avatar_asset_id.clone()];
    asset_ids.extend(user.cover_image_asset_id.clone());
    asset_ids.extend(
        state
            .db
            .videos()
            .asset_ids_by_owner(user.id)
            .await
            .db_err("Failed to list user videos")?,
    );

    let deleted = state
        .db
        .users()
        .delete(user.id)
        .await
        .db_err("failed to delete user")?;
    if !deleted {
        return Err(ApiError::not_found("user does not exist"));
    }

    let cleanup_status = state.media.remove_many(&asset_ids).await;
    if cleanup_status.complete {
        info!(user = %user.uuid, assets = asset_ids.len(), "Account deleted");
    } else {
        warn!(
            user = %user.uuid,
            failed = ?cleanup_status.failed,
            "Account deleted, some assets could not be removed"
        );
    }

    Ok(ApiResponse::ok(
        DeleteAccountResponse {
            deleted_user: UserProfile::from(&user),
            cleanup_status,
        },
        "user deleted successfully",
    )
    .with_cookies(state.cookies.clear_both()))
}

// =============================================================================
// Aggregations
// =============================================================================

async fn channel_profile(
    State(state): State<UsersState>,
    MaybeSession(session): MaybeSession,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>, ApiError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::bad_request("no username provided"));
    }

    let requester = session.map(|s| s.user.id);
    let channel = state
        .db
        .subscriptions()
        .channel_profile(&username, requester)
        .await
        .db_err("Failed to load channel")?
        .ok_or_else(|| ApiError::not_found("no such channel exists"))?;

    Ok(ApiResponse::ok(channel, "channel fetched successfully"))
}

async fn watch_history(
    State(state): State<UsersState>,
    Session(session): Session,
) -> Result<ApiResponse<Vec<WatchHistoryEntry>>, ApiError> {
    let history = state
        .db
        .watch_history()
        .list(session.user.id)
        .await
        .db_err("Failed to load watch history")?;

    Ok(ApiResponse::ok(
        history,
        "user watch history fetched successfully",
    ))
}
