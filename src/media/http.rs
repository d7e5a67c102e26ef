use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, multipart};
use serde::{Deserialize, Serialize};

use super::{MediaError, MediaStore, RemovalReport, UploadedAsset};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote media host reached over HTTP with a bearer API key.
pub struct HttpMediaStore {
    http_client: Client,
    base_url: Url,
    api_key: String,
}

impl HttpMediaStore {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, MediaError> {
        let base_url = Url::parse(base_url).map_err(|e| MediaError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(MediaError::InvalidUrl(base_url.to_string()));
        }
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, MediaError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MediaError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
    public_id: String,
    duration: Option<f64>,
}

#[derive(Serialize)]
struct BulkDeleteRequest<'a> {
    public_ids: &'a [String],
}

#[derive(Deserialize)]
struct BulkDeleteResponse {
    deleted: HashMap<String, String>,
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    #[tracing::instrument(name = "Uploading asset to media host", skip_all)]
    async fn upload(&self, path: &Path) -> Result<UploadedAsset, MediaError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        let file = tokio::fs::File::open(path).await?;
        let part = multipart::Part::stream(reqwest::Body::from(file)).file_name(file_name);
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(self.endpoint(["upload"])?)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MediaError::Rejected(response.status().as_u16()));
        }

        let body: UploadResponse = response.json().await?;
        Ok(UploadedAsset {
            url: body.url,
            asset_id: body.public_id,
            duration: body.duration,
        })
    }

    #[tracing::instrument(name = "Removing asset from media host", skip(self))]
    async fn remove(&self, asset_id: &str) -> Result<(), MediaError> {
        let response = self
            .http_client
            .delete(self.endpoint(["assets", asset_id])?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(MediaError::NotFound(asset_id.to_string())),
            status => Err(MediaError::Rejected(status.as_u16())),
        }
    }

    #[tracing::instrument(name = "Removing assets from media host", skip_all)]
    async fn remove_many(&self, asset_ids: &[String]) -> RemovalReport {
        if asset_ids.is_empty() {
            return RemovalReport::from_parts(Vec::new(), Vec::new());
        }

        let result = async {
            let response = self
                .http_client
                .post(self.endpoint(["assets", "delete"])?)
                .bearer_auth(&self.api_key)
                .json(&BulkDeleteRequest {
                    public_ids: asset_ids,
                })
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(MediaError::Rejected(response.status().as_u16()));
            }
            Ok::<BulkDeleteResponse, MediaError>(response.json().await?)
        }
        .await;

        let outcome = match result {
            Ok(body) => body.deleted,
            Err(e) => {
                tracing::warn!(error = %e, count = asset_ids.len(), "Bulk asset removal failed");
                HashMap::new()
            }
        };

        let (deleted, failed): (Vec<String>, Vec<String>) = asset_ids
            .iter()
            .cloned()
            .partition(|id| outcome.get(id).is_some_and(|status| status == "deleted"));
        RemovalReport::from_parts(deleted, failed)
    }
}
