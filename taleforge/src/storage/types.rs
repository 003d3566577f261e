//! Core types for media storage

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while handing media to durable storage
///
/// Both variants are transient from the caller's point of view: an attempt may
/// be repeated with backoff. The gateway itself never retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The backing service could not issue a destination or answer a lookup
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Transferring bytes to an issued destination failed
    #[error("Upload failed: {0}")]
    UploadFailed(String),
}

impl StorageError {
    /// Whether the caller may retry the attempt after backing off
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::UploadFailed(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// An image selected for admission but not yet stored
///
/// A candidate only lives for the duration of one admission attempt.
///
/// # Examples
///
/// ```rust
/// use taleforge::storage::MediaCandidate;
///
/// let candidate = MediaCandidate::new("image/png", vec![0x89, 0x50, 0x4E, 0x47])
///     .with_filename("avatar.png");
///
/// assert_eq!(candidate.size(), 4);
/// assert_eq!(candidate.filename.as_deref(), Some("avatar.png"));
/// ```
#[derive(Clone)]
pub struct MediaCandidate {
    /// Declared MIME type (e.g. "image/png")
    pub content_type: String,

    /// Original filename, used only to name the stored object
    pub filename: Option<String>,

    /// Raw image bytes; clones share the buffer
    pub data: Bytes,
}

impl MediaCandidate {
    /// Creates a new candidate from a declared MIME type and its payload
    #[must_use]
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            filename: None,
            data: Bytes::from(data),
        }
    }

    /// Attaches the original filename
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Returns the size of the payload in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns the declared type reduced to its lowercase essence
    ///
    /// Parameters are dropped, so `image/PNG; charset=binary` becomes `image/png`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use taleforge::storage::MediaCandidate;
    ///
    /// let candidate = MediaCandidate::new("Image/PNG; charset=binary", vec![]);
    /// assert_eq!(candidate.mime_essence(), "image/png");
    /// ```
    #[must_use]
    pub fn mime_essence(&self) -> String {
        self.content_type.parse::<mime::Mime>().map_or_else(
            |_| self.content_type.trim().to_ascii_lowercase(),
            |parsed| parsed.essence_str().to_ascii_lowercase(),
        )
    }

    /// File extension matching the declared type, used when no filename was given
    #[must_use]
    pub fn default_extension(&self) -> &'static str {
        match self.mime_essence().as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

// Payloads run to megabytes; keep them out of logs.
impl fmt::Debug for MediaCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaCandidate")
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Opaque, globally unique handle to a stored object
///
/// Issued by a [`StorageGateway`](super::StorageGateway) once bytes are durably
/// stored. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageReference(String);

impl StorageReference {
    /// Wraps an identifier issued by a storage backend
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the reference, returning the identifier
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single-use write destination issued by a storage backend
///
/// Consumed by [`StorageGateway::commit_upload`](super::StorageGateway::commit_upload),
/// so one target can never be committed twice through the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    endpoint: String,
}

impl UploadTarget {
    /// Creates a target for a backend-specific endpoint
    ///
    /// - For local storage: the reserved object id
    /// - For hosted storage: the pre-issued upload URL
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Returns the backend-specific endpoint
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Metadata kept alongside a stored object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredObject {
    /// Identifier the object was stored under
    pub id: String,

    /// Sanitized filename on the backend
    pub filename: String,

    /// MIME content type declared at upload
    pub content_type: String,

    /// Object size in bytes
    pub size: u64,

    /// When the upload was committed
    pub stored_at: DateTime<Utc>,
}

impl fmt::Display for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoredObject(id={}, filename={}, size={})",
            self.id, self.filename, self.size
        )
    }
}
