//! Hosted object storage over HTTP
//!
//! The backend issues pre-signed upload URLs and hands back an opaque storage
//! id once bytes arrive:
//!
//! | Step | Request | Response |
//! |------|---------|----------|
//! | Destination | `POST {base}/upload-urls` | `{"uploadUrl": "..."}` |
//! | Transfer | `POST {uploadUrl}` with the raw bytes | `{"storageId": "..."}` |
//! | Resolve | `GET {base}/objects/{id}/url` | `{"url": "..."}`, or 404 |

use super::traits::StorageGateway;
use super::types::{MediaCandidate, StorageError, StorageReference, StorageResult, UploadTarget};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    storage_id: String,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    url: Option<String>,
}

/// Storage gateway for a hosted object store
#[derive(Debug, Clone)]
pub struct HttpStorageGateway {
    client: Client,
    base_url: Url,
}

impl HttpStorageGateway {
    /// Creates a gateway for the service rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageUnavailable` if the URL cannot be parsed or
    /// the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::StorageUnavailable(format!("HTTP client: {e}")))?;
        Self::with_client(client, base_url)
    }

    /// Creates a gateway sharing an existing HTTP client
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageUnavailable` if the URL cannot be parsed or
    /// cannot carry path segments
    pub fn with_client(client: Client, base_url: &str) -> StorageResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            StorageError::StorageUnavailable(format!("Invalid storage URL {base_url}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::StorageUnavailable(format!(
                "Storage URL {base_url} cannot be a base"
            )));
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was ruled out in with_client
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Error text without the request URL
///
/// Base URLs may carry userinfo and pre-signed upload URLs carry tokens in the
/// query string; neither belongs in an error that ends up in logs.
fn describe(error: reqwest::Error) -> String {
    error.without_url().to_string()
}

#[async_trait]
impl StorageGateway for HttpStorageGateway {
    async fn request_upload_destination(&self) -> StorageResult<UploadTarget> {
        let url = self.endpoint(&["upload-urls"]);
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| StorageError::StorageUnavailable(describe(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::StorageUnavailable(format!(
                "Upload URL request returned {status}"
            )));
        }

        let body: UploadUrlResponse = response
            .json()
            .await
            .map_err(|e| {
                StorageError::StorageUnavailable(format!("Malformed upload URL: {}", describe(e)))
            })?;

        tracing::debug!(backend = self.name(), "upload destination issued");
        Ok(UploadTarget::new(body.upload_url))
    }

    async fn commit_upload(
        &self,
        target: UploadTarget,
        candidate: &MediaCandidate,
    ) -> StorageResult<StorageReference> {
        let url = Url::parse(target.endpoint())
            .map_err(|e| StorageError::UploadFailed(format!("Invalid upload URL: {e}")))?;

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, candidate.mime_essence())
            .body(candidate.data.clone())
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(describe(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::UploadFailed(format!("Upload returned {status}")));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| {
                StorageError::UploadFailed(format!("Malformed upload response: {}", describe(e)))
            })?;

        if body.storage_id.trim().is_empty() {
            return Err(StorageError::UploadFailed("Empty storage id".to_string()));
        }

        tracing::info!(
            backend = self.name(),
            storage_id = %body.storage_id,
            size = candidate.size(),
            "upload committed"
        );
        Ok(StorageReference::new(body.storage_id))
    }

    async fn resolve(&self, reference: &StorageReference) -> StorageResult<Option<String>> {
        let url = self.endpoint(&["objects", reference.as_str(), "url"]);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::StorageUnavailable(describe(e)))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            status if status.is_success() => {
                let body: ResolveResponse = response.json().await.map_err(|e| {
                    StorageError::StorageUnavailable(format!(
                        "Malformed resolve response: {}",
                        describe(e)
                    ))
                })?;
                Ok(body.url.filter(|url| !url.is_empty()))
            }
            status => Err(StorageError::StorageUnavailable(format!(
                "Resolve returned {status}"
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "HTTP Object Storage"
    }
}
