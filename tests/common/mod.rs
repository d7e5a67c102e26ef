#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, Response, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;
use vidshare::{
    ServerConfig, create_app,
    db::Database,
    jwt::{JwtConfig, TokenSettings},
    media::{MediaError, MediaStore, UploadedAsset},
};

pub const ACCESS_SECRET: &[u8] = b"integration-access-secret-0123456789";
pub const REFRESH_SECRET: &[u8] = b"integration-refresh-secret-012345678";
pub const PASSWORD: &str = "correct-horse-battery";

/// A 1x1 PNG, enough to pass the upload filters.
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

/// In-memory media store that records what happened to each asset.
pub struct FakeMediaStore {
    uploads: AtomicUsize,
    fail_uploads_from: AtomicUsize,
    uploaded: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    failing_removals: Mutex<HashSet<String>>,
}

impl Default for FakeMediaStore {
    fn default() -> Self {
        Self {
            uploads: AtomicUsize::new(0),
            fail_uploads_from: AtomicUsize::new(usize::MAX),
            uploaded: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            failing_removals: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeMediaStore {
    /// Upload number `n` (1-based) and every later one fails.
    pub fn fail_uploads_from(&self, n: usize) {
        self.fail_uploads_from.store(n, Ordering::SeqCst);
    }

    /// Removing this asset fails.
    pub fn fail_removal_of(&self, asset_id: &str) {
        self.failing_removals
            .lock()
            .unwrap()
            .insert(asset_id.to_string());
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStore for FakeMediaStore {
    async fn upload(&self, path: &Path) -> Result<UploadedAsset, MediaError> {
        // The staged file must still exist while it is being uploaded
        tokio::fs::metadata(path).await?;

        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.fail_uploads_from.load(Ordering::SeqCst) {
            return Err(MediaError::Rejected(503));
        }

        let asset_id = format!("asset-{}", n);
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "mp4");
        self.uploaded.lock().unwrap().push(asset_id.clone());

        Ok(UploadedAsset {
            url: format!("https://media.test/{}", asset_id),
            asset_id,
            duration: is_video.then_some(42.5),
        })
    }

    async fn remove(&self, asset_id: &str) -> Result<(), MediaError> {
        if self.failing_removals.lock().unwrap().contains(asset_id) {
            return Err(MediaError::Rejected(503));
        }
        self.removed.lock().unwrap().push(asset_id.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub jwt: JwtConfig,
    pub media: Arc<FakeMediaStore>,
    pub temp_dir: tempfile::TempDir,
}

/// Create a test app backed by an in-memory database and a fake media store.
pub async fn create_test_app() -> TestApp {
    create_test_app_with_cors(&[]).await
}

/// Same as `create_test_app`, with CORS enabled for `origins`.
pub async fn create_test_app_with_cors(origins: &[&str]) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let token_settings = TokenSettings::new(ACCESS_SECRET, REFRESH_SECRET);
    let jwt = JwtConfig::new(&token_settings);
    let media = Arc::new(FakeMediaStore::default());
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let config = ServerConfig {
        db: db.clone(),
        token_settings,
        secure_cookies: false,
        media: media.clone(),
        temp_dir: temp_dir.path().to_path_buf(),
        cors_origins: origins
            .iter()
            .map(|origin| HeaderValue::from_str(origin).unwrap())
            .collect(),
    };

    TestApp {
        app: create_app(&config),
        db,
        jwt,
        media,
        temp_dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Number of files left in the upload staging directory.
    pub fn staged_file_count(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path()).unwrap().count()
    }

    /// Register `username` with an avatar.
    pub async fn register(&self, username: &str) -> Response<Body> {
        let form = MultipartBody::new()
            .text("fullName", &format!("{} Example", username))
            .text("email", &format!("{}@example.com", username))
            .text("username", username)
            .text("password", PASSWORD)
            .file("avatar", "avatar.png", "image/png", PNG_BYTES);
        self.send(form.into_request("POST", "/users/register", None))
            .await
    }

    /// Register and log in `username`. Returns (access token, refresh token).
    pub async fn signed_in(&self, username: &str) -> (String, String) {
        let response = self.register(username).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        self.login(username).await
    }

    pub async fn login(&self, username: &str) -> (String, String) {
        let response = self
            .send(json_request(
                "POST",
                "/users/login",
                serde_json::json!({ "username": username, "password": PASSWORD }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        (
            body["data"]["accessToken"].as_str().unwrap().to_string(),
            body["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }
}

/// Hand-built multipart/form-data body.
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "vidshare-test-boundary".to_string(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        let mut builder = Request::builder().method(method).uri(uri).header(
            "content-type",
            format!("multipart/form-data; boundary={}", self.boundary),
        );
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        builder.body(Body::from(self.body)).unwrap()
    }
}

pub fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn auth_cookies(access_token: &str, refresh_token: &str) -> String {
    format!("accessToken={}; refreshToken={}", access_token, refresh_token)
}

pub fn access_cookie(access_token: &str) -> String {
    format!("accessToken={}", access_token)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie being set (not cleared) in the given Set-Cookie headers.
pub fn set_cookie_value(cookies: &[String], cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(&prefix))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=", cookie_name)) && c.contains("Max-Age=0"))
}

/// Access token for `uuid` that expired an hour ago.
pub fn expired_access_token(uuid: &str, username: &str) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &serde_json::json!({
            "sub": uuid,
            "username": username,
            "typ": "access",
            "iat": now - 7200,
            "exp": now - 3600,
        }),
        &jsonwebtoken::EncodingKey::from_secret(ACCESS_SECRET),
    )
    .unwrap()
}
