//! Media storage abstraction and implementations
//!
//! This module covers everything that happens to an image on its way into, and
//! back out of, durable storage:
//! - Local validation of candidates before any network activity
//! - A trait-based gateway with local filesystem and hosted HTTP backends
//! - Cache-stable display URLs for rendering stored references
//!
//! # Architecture
//!
//! The [`StorageGateway`] trait exposes the three-step upload protocol used by
//! hosted object stores (issue a destination, transfer bytes, resolve a
//! reference). The local backend emulates it on disk so development and tests
//! run without a remote service.
//!
//! # Examples
//!
//! ```rust,no_run
//! use taleforge::storage::{
//!     validation::{validate, UploadConstraints},
//!     LocalStorageGateway, MediaCandidate, StorageGateway,
//! };
//! use std::path::PathBuf;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = LocalStorageGateway::new(PathBuf::from("/var/uploads"), "/uploads")?;
//!
//! let candidate = MediaCandidate::new("image/png", vec![/* ... */]).with_filename("cover.png");
//! validate(&candidate, &UploadConstraints::default())?;
//!
//! let target = storage.request_upload_destination().await?;
//! let reference = storage.commit_upload(target, &candidate).await?;
//! println!("Stored: {reference}");
//! # Ok(())
//! # }
//! ```

pub mod display;
mod http;
mod local;
mod traits;
mod types;
pub mod validation;

pub use display::{DisplayResolver, DisplayUrl};
pub use http::HttpStorageGateway;
pub use local::LocalStorageGateway;
#[cfg(test)]
pub use traits::MockStorageGateway;
pub use traits::StorageGateway;
pub use types::{
    MediaCandidate, StorageError, StorageReference, StorageResult, StoredObject, UploadTarget,
};
pub use validation::{validate, UploadConstraints, ValidationError};
