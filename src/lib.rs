pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod media;
pub mod password;
pub mod uploads;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use api::create_api_router;
use auth::{SessionCookies, TokenIssuer};
use axum::Router;
use axum::http::{HeaderValue, Method, header, request};
use db::Database;
use jwt::{JwtConfig, TokenSettings};
use media::MediaStore;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secrets and lifetimes for access and refresh tokens
    pub token_settings: TokenSettings,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Where uploaded images and videos are stored
    pub media: Arc<dyn MediaStore>,
    /// Staging directory for multipart uploads
    pub temp_dir: PathBuf,
    /// Browser origins allowed to make credentialed requests. Empty disables CORS
    pub cors_origins: Vec<HeaderValue>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.token_settings));
    let issuer = TokenIssuer::new(jwt, config.db.clone());

    let router = create_api_router(
        config.db.clone(),
        issuer,
        SessionCookies::new(config.secure_cookies),
        config.media.clone(),
        config.temp_dir.clone(),
    );

    if config.cors_origins.is_empty() {
        router
    } else {
        router.layer(cors_layer(config.cors_origins.clone()))
    }
}

/// CORS for the configured origins, with cookies allowed.
fn cors_layer(allowed_origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &request::Parts| allowed_origins.contains(origin),
        ))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(temp_dir: &Path) {
    cleanup::run_cleanup(temp_dir).await;
    cleanup::spawn_cleanup_scheduler(temp_dir.to_path_buf());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app).await
}
