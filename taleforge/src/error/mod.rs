//! Error types and error handling
//!
//! Every component owns its error enum. [`AdmissionError`] wraps whichever one
//! ended an attempt, unchanged, and adds the helpers callers need to report it:
//! a stable [`ErrorKind`], a retry hint, and a message safe to show end users.

use crate::admission::PersistenceError;
use crate::moderation::ClassificationError;
use crate::storage::{StorageError, ValidationError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

const GENERIC_MESSAGE: &str = "Something went wrong while uploading your image. Please try again.";

/// Error that ended an admission attempt
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdmissionError {
    /// Local validation refused the candidate
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage could not accept or resolve the object
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The classification service failed
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    /// The owning record could not be updated
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Stable, machine-readable error identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Declared type not allowed
    UnsupportedType,
    /// Payload above the size ceiling
    TooLarge,
    /// Payload below the size floor
    TooSmall,
    /// Payload does not match its declared type
    ContentMismatch,
    /// Storage backend unreachable
    StorageUnavailable,
    /// Byte transfer failed
    UploadFailed,
    /// Classifier credentials missing
    NotConfigured,
    /// Classifier credentials rejected
    InvalidCredentials,
    /// Classifier quota exhausted
    QuotaExceeded,
    /// Classifier unreachable
    ClassificationUnavailable,
    /// Classifier answered with invalid data
    ContractViolation,
    /// Owning record missing
    OwnerNotFound,
    /// Owning record write failed
    Database,
}

impl ErrorKind {
    /// Returns the identifier as a string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedType => "UnsupportedType",
            Self::TooLarge => "TooLarge",
            Self::TooSmall => "TooSmall",
            Self::ContentMismatch => "ContentMismatch",
            Self::StorageUnavailable => "StorageUnavailable",
            Self::UploadFailed => "UploadFailed",
            Self::NotConfigured => "NotConfigured",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::QuotaExceeded => "QuotaExceeded",
            Self::ClassificationUnavailable => "ClassificationUnavailable",
            Self::ContractViolation => "ContractViolation",
            Self::OwnerNotFound => "OwnerNotFound",
            Self::Database => "Database",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AdmissionError {
    /// Returns the kind of the wrapped error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(e) => match e {
                ValidationError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
                ValidationError::TooLarge { .. } => ErrorKind::TooLarge,
                ValidationError::TooSmall { .. } => ErrorKind::TooSmall,
                ValidationError::ContentMismatch { .. } => ErrorKind::ContentMismatch,
            },
            Self::Storage(e) => match e {
                StorageError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
                StorageError::UploadFailed(_) => ErrorKind::UploadFailed,
            },
            Self::Classification(e) => match e {
                ClassificationError::NotConfigured { .. } => ErrorKind::NotConfigured,
                ClassificationError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
                ClassificationError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
                ClassificationError::ClassificationUnavailable(_) => {
                    ErrorKind::ClassificationUnavailable
                }
                ClassificationError::ContractViolation(_) => ErrorKind::ContractViolation,
            },
            Self::Persistence(e) => match e {
                PersistenceError::OwnerNotFound(_) => ErrorKind::OwnerNotFound,
                PersistenceError::Database(_) => ErrorKind::Database,
            },
        }
    }

    /// Whether repeating the attempt later may succeed without intervention
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Storage(e) => e.is_retryable(),
            Self::Classification(e) => e.is_retryable(),
            Self::Persistence(e) => matches!(e, PersistenceError::Database(_)),
        }
    }

    /// Message suitable for end users
    ///
    /// Validation failures say what to fix. Everything else is reported
    /// generically; the details belong in logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::UnsupportedType { .. }) => {
                "This file type isn't supported. Please choose a PNG, JPEG, WebP or GIF image."
                    .to_string()
            }
            Self::Validation(ValidationError::TooLarge { limit, .. }) => format!(
                "This image is too large. The maximum size is {}.",
                human_size(*limit)
            ),
            Self::Validation(ValidationError::TooSmall { .. }) => {
                "This file is empty or too small to be an image.".to_string()
            }
            Self::Validation(ValidationError::ContentMismatch { .. }) => {
                "This file's contents don't match its type. Please choose a different image."
                    .to_string()
            }
            Self::Classification(ClassificationError::QuotaExceeded(_)) => {
                "Image uploads are temporarily unavailable. Please try again later.".to_string()
            }
            _ => GENERIC_MESSAGE.to_string(),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;

    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{} KB", bytes / KIB)
    } else {
        format!("{bytes} bytes")
    }
}
