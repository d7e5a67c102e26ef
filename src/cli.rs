//! CLI argument parsing, validation, and startup helpers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::HeaderValue;
use clap::Parser;
use tracing::{error, info};

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS, TokenSettings};
use crate::media::{HttpMediaStore, LocalMediaStore, MediaStore};

const MIN_TOKEN_SECRET_LENGTH: usize = 32;

/// Upper bound for either token lifetime: one year.
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

const ACCESS_SECRET_VAR: &str = "ACCESS_TOKEN_SECRET";
const REFRESH_SECRET_VAR: &str = "REFRESH_TOKEN_SECRET";
const MEDIA_API_KEY_VAR: &str = "MEDIA_API_KEY";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MediaBackend {
    /// Files in a local directory
    #[default]
    Local,
    /// Remote media host over HTTP
    Http,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vidshare",
    about = "Video sharing backend with JWT sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "vidshare.db")]
    pub database: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value_t = ACCESS_TOKEN_DURATION_SECS)]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value_t = REFRESH_TOKEN_DURATION_SECS)]
    pub refresh_token_ttl: u64,

    /// Directory multipart uploads are staged in
    #[arg(long, env = "UPLOAD_TEMP_DIR", default_value = "./public/temp")]
    pub temp_dir: PathBuf,

    /// Where uploaded media is stored
    #[arg(long, env = "MEDIA_BACKEND", value_enum, default_value = "local")]
    pub media_backend: MediaBackend,

    /// Root directory of the local media backend
    #[arg(long, env = "MEDIA_DIR", default_value = "./public/media")]
    pub media_dir: PathBuf,

    /// Public URL prefix (local backend) or API base URL (http backend)
    #[arg(long, env = "MEDIA_URL", default_value = "http://localhost:8000/media/")]
    pub media_url: String,

    /// Browser origins allowed to call the API with credentials (comma separated)
    #[arg(long, env = "CORS_ORIGIN", value_delimiter = ',')]
    pub cors_origin: Vec<String>,

    /// Omit the Secure attribute on cookies. Only for plain-HTTP development
    #[arg(long, env = "INSECURE_COOKIES")]
    pub insecure_cookies: bool,

    /// Log output format
    #[arg(short, long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a secret from the environment and remove it from there.
///
/// Only call this from `main` before the database or media store is opened.
fn take_env_secret(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    // SAFETY: no task has been spawned and no database connection or HTTP
    // client exists yet. The runtime's idle worker threads do not read the
    // environment, so nothing reads it concurrently with this removal.
    unsafe { std::env::remove_var(name) };
    Some(value)
}

/// Check both token secrets.
pub fn validate_token_secrets(access: &str, refresh: &str) -> Result<(), String> {
    for (name, secret) in [(ACCESS_SECRET_VAR, access), (REFRESH_SECRET_VAR, refresh)] {
        if secret.len() < MIN_TOKEN_SECRET_LENGTH {
            return Err(format!(
                "{} is shorter than {} characters. Use a longer secret",
                name, MIN_TOKEN_SECRET_LENGTH
            ));
        }
    }
    if access == refresh {
        return Err(format!(
            "{} and {} must be different",
            ACCESS_SECRET_VAR, REFRESH_SECRET_VAR
        ));
    }
    Ok(())
}

/// Check the configured token lifetimes.
pub fn validate_token_lifetimes(access_ttl: u64, refresh_ttl: u64) -> Result<(), String> {
    if access_ttl == 0 || refresh_ttl <= access_ttl {
        return Err(
            "Token lifetimes must be positive and the refresh lifetime longer than the access lifetime"
                .to_string(),
        );
    }
    if refresh_ttl > MAX_TOKEN_TTL_SECS {
        return Err(format!(
            "Token lifetimes cannot exceed {} seconds",
            MAX_TOKEN_TTL_SECS
        ));
    }
    Ok(())
}

/// Load token secrets from the environment and combine them with the
/// configured lifetimes. Returns None and logs an error when they are unusable.
pub fn load_token_settings(args: &Args) -> Option<TokenSettings> {
    let (Some(access), Some(refresh)) = (
        take_env_secret(ACCESS_SECRET_VAR),
        take_env_secret(REFRESH_SECRET_VAR),
    ) else {
        error!(
            "Token secrets are required. Set {} and {} environment variables",
            ACCESS_SECRET_VAR, REFRESH_SECRET_VAR
        );
        return None;
    };

    if let Err(message) = validate_token_secrets(&access, &refresh) {
        error!("{}", message);
        return None;
    }

    if let Err(message) =
        validate_token_lifetimes(args.access_token_ttl, args.refresh_token_ttl)
    {
        error!("{}", message);
        return None;
    }

    let mut settings = TokenSettings::new(access.as_bytes(), refresh.as_bytes());
    settings.access_ttl_secs = args.access_token_ttl;
    settings.refresh_ttl_secs = args.refresh_token_ttl;
    Some(settings)
}

/// Secrets the media backend needs, taken from the environment at startup.
#[derive(Default)]
pub struct MediaCredentials {
    api_key: Option<String>,
}

/// Load the credentials for the configured media backend. Returns None and
/// logs an error when a required one is missing.
pub fn load_media_credentials(args: &Args) -> Option<MediaCredentials> {
    match args.media_backend {
        MediaBackend::Local => Some(MediaCredentials::default()),
        MediaBackend::Http => {
            let Some(api_key) = take_env_secret(MEDIA_API_KEY_VAR) else {
                error!("{} is required for the http media backend", MEDIA_API_KEY_VAR);
                return None;
            };
            Some(MediaCredentials {
                api_key: Some(api_key),
            })
        }
    }
}

/// Build the configured media backend, logging errors if it fails.
pub async fn open_media_store(
    args: &Args,
    credentials: MediaCredentials,
) -> Option<Arc<dyn MediaStore>> {
    match args.media_backend {
        MediaBackend::Local => match LocalMediaStore::new(&args.media_dir, &args.media_url).await {
            Ok(store) => {
                info!(dir = %args.media_dir.display(), "Using local media store");
                Some(Arc::new(store))
            }
            Err(e) => {
                error!(dir = %args.media_dir.display(), error = %e, "Failed to open local media store");
                None
            }
        },
        MediaBackend::Http => {
            let Some(api_key) = credentials.api_key else {
                error!("{} is required for the http media backend", MEDIA_API_KEY_VAR);
                return None;
            };
            match HttpMediaStore::new(&args.media_url, api_key) {
                Ok(store) => {
                    info!(url = %args.media_url, "Using remote media host");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    error!(url = %args.media_url, error = %e, "Invalid media host configuration");
                    None
                }
            }
        }
    }
}

/// Create the staging directory for uploads.
pub async fn prepare_temp_dir(path: &std::path::Path) -> Option<()> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => Some(()),
        Err(e) => {
            error!(dir = %path.display(), error = %e, "Failed to create upload staging directory");
            None
        }
    }
}

/// Parse the allowed CORS origins. A wildcard is rejected since responses
/// carry credentials.
pub fn parse_cors_origins(origins: &[String]) -> Result<Vec<HeaderValue>, String> {
    origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            if origin == "*" {
                return Err(
                    "CORS_ORIGIN cannot be * because cookies are sent with requests".to_string(),
                );
            }
            HeaderValue::from_str(origin).map_err(|_| format!("Invalid CORS origin: {}", origin))
        })
        .collect()
}

/// Build ServerConfig from validated arguments. Returns None and logs an
/// error when the CORS origins are unusable.
pub fn build_config(
    db: Database,
    token_settings: TokenSettings,
    media: Arc<dyn MediaStore>,
    args: &Args,
) -> Option<ServerConfig> {
    let cors_origins = match parse_cors_origins(&args.cors_origin) {
        Ok(origins) => origins,
        Err(message) => {
            error!("{}", message);
            return None;
        }
    };

    Some(ServerConfig {
        db,
        token_settings,
        secure_cookies: !args.insecure_cookies,
        media,
        temp_dir: args.temp_dir.clone(),
        cors_origins,
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
