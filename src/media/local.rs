use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use super::{MediaError, MediaStore, UploadedAsset, extension_of};

/// Stores assets in a local directory served under a public URL prefix.
pub struct LocalMediaStore {
    root: PathBuf,
    public_base: Url,
}

impl LocalMediaStore {
    /// `public_base` is the URL the directory is reachable under.
    pub async fn new(root: impl Into<PathBuf>, public_base: &str) -> Result<Self, MediaError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let mut public_base =
            Url::parse(public_base).map_err(|e| MediaError::InvalidUrl(e.to_string()))?;
        if !public_base.path().ends_with('/') {
            let path = format!("{}/", public_base.path());
            public_base.set_path(&path);
        }

        Ok(Self { root, public_base })
    }

    fn asset_path(&self, asset_id: &str) -> Result<PathBuf, MediaError> {
        let valid = !asset_id.is_empty()
            && asset_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !asset_id.starts_with('.');
        if !valid {
            return Err(MediaError::InvalidAssetId(asset_id.to_string()));
        }
        Ok(self.root.join(asset_id))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    #[tracing::instrument(name = "Storing local asset", skip_all)]
    async fn upload(&self, path: &Path) -> Result<UploadedAsset, MediaError> {
        let asset_id = match extension_of(path) {
            Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext),
            None => uuid::Uuid::new_v4().to_string(),
        };

        tokio::fs::copy(path, self.root.join(&asset_id)).await?;

        let url = self
            .public_base
            .join(&asset_id)
            .map_err(|e| MediaError::InvalidUrl(e.to_string()))?;

        Ok(UploadedAsset {
            url: url.to_string(),
            asset_id,
            duration: None,
        })
    }

    async fn remove(&self, asset_id: &str) -> Result<(), MediaError> {
        let path = self.asset_path(asset_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaError::NotFound(asset_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
