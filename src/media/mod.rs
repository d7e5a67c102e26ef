//! Media storage backends.
//!
//! Uploaded images and videos live outside the database; rows keep the public
//! URL and the backend's asset id needed to delete them again.

mod http;
mod local;

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

pub use http::HttpMediaStore;
pub use local::LocalMediaStore;

/// An asset accepted by the media store.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedAsset {
    pub url: String,
    pub asset_id: String,
    /// Seconds, for videos when the backend knows it
    pub duration: Option<f64>,
}

/// Outcome of a best-effort bulk removal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemovalReport {
    pub complete: bool,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

impl RemovalReport {
    pub fn from_parts(deleted: Vec<String>, failed: Vec<String>) -> Self {
        Self {
            complete: failed.is_empty(),
            deleted,
            failed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Media file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Media host request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Media host rejected the request with status {0}")]
    Rejected(u16),
    #[error("Asset not found: {0}")]
    NotFound(String),
    #[error("Invalid asset id: {0}")]
    InvalidAssetId(String),
    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload a staged local file.
    async fn upload(&self, path: &Path) -> Result<UploadedAsset, MediaError>;

    /// Remove one asset.
    async fn remove(&self, asset_id: &str) -> Result<(), MediaError>;

    /// Remove several assets. Never fails as a whole; the report lists what
    /// could not be removed.
    async fn remove_many(&self, asset_ids: &[String]) -> RemovalReport {
        let results =
            futures::future::join_all(asset_ids.iter().map(|id| self.remove(id))).await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (id, result) in asset_ids.iter().zip(results) {
            match result {
                Ok(()) => deleted.push(id.clone()),
                Err(e) => {
                    tracing::warn!(asset_id = %id, error = %e, "Failed to remove asset");
                    failed.push(id.clone());
                }
            }
        }
        RemovalReport::from_parts(deleted, failed)
    }
}

/// Extension of a file name, lower-cased, without the dot.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
