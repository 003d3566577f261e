//! Local filesystem storage gateway

use super::traits::StorageGateway;
use super::types::{
    MediaCandidate, StorageError, StorageReference, StorageResult, StoredObject, UploadTarget,
};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const METADATA_FILE: &str = ".metadata.json";
const MAX_FILENAME_LEN: usize = 128;

/// Local filesystem storage backend
///
/// Destinations are UUID directories reserved under a base path and sharded by
/// the first 2 characters of the id to avoid hitting filesystem limits on
/// entries per directory. A JSON sidecar marks a committed object.
///
/// # Directory Structure
///
/// ```text
/// /var/uploads/
/// ├── 55/
/// │   └── 550e8400-e29b-41d4-a716-446655440000/
/// │       ├── .metadata.json
/// │       └── avatar.png
/// ```
///
/// Resolved URLs have the form `{public_base_url}/{prefix}/{id}/{filename}`;
/// serving that path is the web server's job.
#[derive(Debug, Clone)]
pub struct LocalStorageGateway {
    /// Base directory for stored objects
    base_path: PathBuf,

    /// URL prefix the base directory is served under
    public_base_url: String,
}

impl LocalStorageGateway {
    /// Creates a new local storage gateway
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageUnavailable` if the base path exists but is
    /// not a directory
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use taleforge::storage::LocalStorageGateway;
    /// use std::path::PathBuf;
    ///
    /// let storage = LocalStorageGateway::new(PathBuf::from("/var/uploads"), "/uploads")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_path: PathBuf, public_base_url: impl Into<String>) -> StorageResult<Self> {
        if base_path.exists() && !base_path.is_dir() {
            return Err(StorageError::StorageUnavailable(format!(
                "{} is not a directory",
                base_path.display()
            )));
        }

        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn object_directory(&self, id: &str) -> PathBuf {
        let prefix = &id[..2.min(id.len())];
        self.base_path.join(prefix).join(id)
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.object_directory(id).join(METADATA_FILE)
    }

    async fn read_metadata(path: &Path) -> StorageResult<Option<StoredObject>> {
        let json = match fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::StorageUnavailable(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        serde_json::from_str(&json).map(Some).map_err(|e| {
            StorageError::StorageUnavailable(format!("Corrupt metadata at {}: {e}", path.display()))
        })
    }
}

/// Reduces a client-supplied filename to a safe single path component
fn sanitize_filename(candidate: &MediaCandidate) -> String {
    let raw = candidate
        .filename
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    let cleaned: String = raw
        .chars()
        .take(MAX_FILENAME_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // Leading dots would hide the file next to the sidecar.
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() || cleaned.contains("..") {
        format!("image.{}", candidate.default_extension())
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl StorageGateway for LocalStorageGateway {
    async fn request_upload_destination(&self) -> StorageResult<UploadTarget> {
        let id = Uuid::new_v4().to_string();
        let dir = self.object_directory(&id);

        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::StorageUnavailable(format!("Failed to reserve {}: {e}", dir.display()))
        })?;

        Ok(UploadTarget::new(id))
    }

    async fn commit_upload(
        &self,
        target: UploadTarget,
        candidate: &MediaCandidate,
    ) -> StorageResult<StorageReference> {
        let id = Uuid::parse_str(target.endpoint())
            .map_err(|_| StorageError::UploadFailed(format!("Unknown upload target {}", target.endpoint())))?
            .to_string();

        let dir = self.object_directory(&id);
        if !dir.is_dir() {
            return Err(StorageError::UploadFailed(format!(
                "Upload target {id} was not issued by this gateway"
            )));
        }

        let metadata_path = self.metadata_path(&id);
        if metadata_path.exists() {
            return Err(StorageError::UploadFailed(format!(
                "Upload target {id} has already been used"
            )));
        }

        let filename = sanitize_filename(candidate);
        let file_path = dir.join(&filename);
        let write = async {
            let mut f = fs::File::create(&file_path).await?;
            f.write_all(&candidate.data).await?;
            f.flush().await
        };
        write
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to write {}: {e}", file_path.display())))?;

        let stored = StoredObject {
            id: id.clone(),
            filename,
            content_type: candidate.content_type.clone(),
            size: candidate.size(),
            stored_at: Utc::now(),
        };

        // The sidecar is written last: its presence marks the object as committed.
        let metadata_json = serde_json::to_string_pretty(&stored)
            .map_err(|e| StorageError::UploadFailed(format!("Failed to serialize metadata: {e}")))?;
        fs::write(&metadata_path, metadata_json)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to write metadata: {e}")))?;

        Ok(StorageReference::new(id))
    }

    async fn resolve(&self, reference: &StorageReference) -> StorageResult<Option<String>> {
        // Anything that is not one of our ids cannot exist here.
        let Ok(id) = Uuid::parse_str(reference.as_str()) else {
            return Ok(None);
        };
        let id = id.to_string();

        let Some(stored) = Self::read_metadata(&self.metadata_path(&id)).await? else {
            return Ok(None);
        };

        if !self.object_directory(&id).join(&stored.filename).is_file() {
            return Ok(None);
        }

        let prefix = &id[..2];
        Ok(Some(format!(
            "{}/{prefix}/{id}/{}",
            self.public_base_url, stored.filename
        )))
    }

    fn name(&self) -> &'static str {
        "Local Storage"
    }
}
