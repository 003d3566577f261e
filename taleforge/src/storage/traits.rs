//! Storage gateway trait definitions

use super::types::{MediaCandidate, StorageReference, StorageResult, UploadTarget};
use async_trait::async_trait;

/// Abstraction over durable media storage
///
/// The admission pipeline talks to storage through exactly three calls: obtain
/// a write destination, transfer bytes to it, and resolve a stored object back
/// to a fetchable URL. Backends (local filesystem, hosted object storage) only
/// differ in how they implement those calls.
///
/// # Implementation Requirements
///
/// Implementations must:
/// - Issue globally unique references
/// - Be safe to share across concurrent admission attempts (no per-call locking)
/// - Never retry a failed transfer internally
/// - Report a missing reference from [`resolve`](Self::resolve) as `Ok(None)`
///
/// # Examples
///
/// ```rust,no_run
/// use taleforge::storage::{LocalStorageGateway, MediaCandidate, StorageGateway};
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let storage = LocalStorageGateway::new(PathBuf::from("/var/uploads"), "/uploads")?;
///
/// let candidate = MediaCandidate::new("image/png", vec![/* ... */]);
/// let target = storage.request_upload_destination().await?;
/// let reference = storage.commit_upload(target, &candidate).await?;
///
/// if let Some(url) = storage.resolve(&reference).await? {
///     println!("Stored at {url}");
/// }
/// # Ok(())
/// # }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Obtains a single-use write destination
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageUnavailable` if the backend cannot issue one
    async fn request_upload_destination(&self) -> StorageResult<UploadTarget>;

    /// Transfers the candidate's bytes to a previously issued destination
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UploadFailed` on any transport failure, including
    /// non-2xx responses and reuse of a consumed destination
    async fn commit_upload(
        &self,
        target: UploadTarget,
        candidate: &MediaCandidate,
    ) -> StorageResult<StorageReference>;

    /// Resolves a stored object to a fetchable URL
    ///
    /// Returns `Ok(None)` when the reference does not exist or was deleted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageUnavailable` only when the backend itself
    /// cannot be reached
    async fn resolve(&self, reference: &StorageReference) -> StorageResult<Option<String>>;

    /// Returns the name of the backend, for logs
    fn name(&self) -> &'static str;
}
