//! Local validation of media candidates
//!
//! Validation is the cheap rejection step: it runs before any network or storage
//! call, has no side effects, and gives the same answer for the same input.
//!
//! Checks run in a fixed order:
//! 1. Declared MIME type against the allowlist
//! 2. Byte length against the configured ceiling (and optional floor)
//! 3. Optionally, the payload's magic number against the declared type
//!
//! # Examples
//!
//! ```rust
//! use taleforge::storage::{MediaCandidate, validation::{validate, UploadConstraints, ValidationError}};
//!
//! let constraints = UploadConstraints::default();
//!
//! let png = MediaCandidate::new("image/png", vec![0x89, 0x50, 0x4E, 0x47]);
//! assert!(validate(&png, &constraints).is_ok());
//!
//! let pdf = MediaCandidate::new("application/pdf", b"%PDF-1.4".to_vec());
//! assert!(matches!(
//!     validate(&pdf, &constraints),
//!     Err(ValidationError::UnsupportedType { .. })
//! ));
//! ```
//!
//! # Zero-byte files
//!
//! An empty payload passes by default. Callers that want to refuse it set a
//! minimum with [`UploadConstraints::min_size_bytes`].

use super::types::MediaCandidate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default upload ceiling: 5 MiB
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Image types accepted by default
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/webp",
    "image/gif",
];

/// Reasons a candidate is refused before any network activity
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Declared MIME type is not in the allowlist
    #[error("Unsupported file type: {actual}")]
    UnsupportedType {
        /// Declared type, normalized
        actual: String,
        /// Types that would have been accepted
        allowed: Vec<String>,
    },

    /// Payload is larger than the configured ceiling
    #[error("File size {actual} exceeds limit of {limit} bytes")]
    TooLarge {
        /// Actual size in bytes
        actual: u64,
        /// Maximum allowed size in bytes
        limit: u64,
    },

    /// Payload is smaller than the configured floor
    #[error("File size {actual} is below the minimum of {minimum} bytes")]
    TooSmall {
        /// Actual size in bytes
        actual: u64,
        /// Minimum required size in bytes
        minimum: u64,
    },

    /// Payload content does not match the declared type
    #[error("Declared type {declared} does not match detected content ({detected})")]
    ContentMismatch {
        /// Declared type, normalized
        declared: String,
        /// Type detected from the magic number, or "unknown"
        detected: String,
    },
}

/// Limits applied by [`validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConstraints {
    /// Allowed MIME types (compared case-insensitively, without parameters)
    pub allowed_types: Vec<String>,

    /// Maximum payload size in bytes (inclusive)
    pub max_size_bytes: u64,

    /// Minimum payload size in bytes (0 = no minimum)
    pub min_size_bytes: u64,

    /// Verify magic numbers against the declared type
    pub sniff_content: bool,
}

impl Default for UploadConstraints {
    fn default() -> Self {
        Self {
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|s| (*s).to_string()).collect(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            min_size_bytes: 0,
            sniff_content: false,
        }
    }
}

impl UploadConstraints {
    /// Overrides the size ceiling
    #[must_use]
    pub fn max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Sets a size floor (e.g. `1` to refuse zero-byte files)
    #[must_use]
    pub fn min_size_bytes(mut self, bytes: u64) -> Self {
        self.min_size_bytes = bytes;
        self
    }

    /// Replaces the MIME allowlist
    #[must_use]
    pub fn allowed_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Enables magic-number verification
    #[must_use]
    pub fn sniff_content(mut self, enabled: bool) -> Self {
        self.sniff_content = enabled;
        self
    }

    fn allows(&self, essence: &str) -> bool {
        self.allowed_types
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(essence))
    }
}

/// `image/jpg` is common in the wild but not a registered type.
fn canonical(essence: &str) -> &str {
    if essence == "image/jpg" {
        "image/jpeg"
    } else {
        essence
    }
}

/// Validates a candidate against upload constraints
///
/// # Errors
///
/// Returns the first violated rule, checked in this order:
/// `UnsupportedType`, `TooLarge`, `TooSmall`, `ContentMismatch`
pub fn validate(
    candidate: &MediaCandidate,
    constraints: &UploadConstraints,
) -> Result<(), ValidationError> {
    let essence = candidate.mime_essence();
    if !constraints.allows(&essence) {
        return Err(ValidationError::UnsupportedType {
            actual: essence,
            allowed: constraints.allowed_types.clone(),
        });
    }

    let size = candidate.size();
    if size > constraints.max_size_bytes {
        return Err(ValidationError::TooLarge {
            actual: size,
            limit: constraints.max_size_bytes,
        });
    }
    if size < constraints.min_size_bytes {
        return Err(ValidationError::TooSmall {
            actual: size,
            minimum: constraints.min_size_bytes,
        });
    }

    if constraints.sniff_content {
        let detected = infer::get(&candidate.data).map(|kind| kind.mime_type());
        if detected != Some(canonical(&essence)) {
            return Err(ValidationError::ContentMismatch {
                declared: essence,
                detected: detected.unwrap_or("unknown").to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];
    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];

    #[test]
    fn test_accepts_every_default_type() {
        let constraints = UploadConstraints::default();
        for mime in DEFAULT_ALLOWED_TYPES {
            let candidate = MediaCandidate::new(*mime, vec![0; 16]);
            assert!(validate(&candidate, &constraints).is_ok(), "{mime} should be accepted");
        }
    }

    #[test]
    fn test_type_match_ignores_case_and_parameters() {
        let candidate = MediaCandidate::new("Image/PNG; charset=binary", vec![0; 4]);
        assert!(validate(&candidate, &UploadConstraints::default()).is_ok());
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let candidate = MediaCandidate::new("image/svg+xml", b"<svg/>".to_vec());
        let result = validate(&candidate, &UploadConstraints::default());
        assert!(matches!(
            result,
            Err(ValidationError::UnsupportedType { ref actual, .. }) if actual == "image/svg+xml"
        ));
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let constraints = UploadConstraints::default().max_size_bytes(4);

        let at_limit = MediaCandidate::new("image/png", vec![0; 4]);
        assert!(validate(&at_limit, &constraints).is_ok());

        let over = MediaCandidate::new("image/png", vec![0; 5]);
        assert_eq!(
            validate(&over, &constraints),
            Err(ValidationError::TooLarge { actual: 5, limit: 4 })
        );
    }

    #[test]
    fn test_type_checked_before_size() {
        let constraints = UploadConstraints::default().max_size_bytes(1);
        let candidate = MediaCandidate::new("application/zip", vec![0; 10]);
        assert!(matches!(
            validate(&candidate, &constraints),
            Err(ValidationError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_zero_byte_file_accepted_by_default() {
        let candidate = MediaCandidate::new("image/png", Vec::new());
        assert!(validate(&candidate, &UploadConstraints::default()).is_ok());
    }

    #[test]
    fn test_minimum_size_rule() {
        let constraints = UploadConstraints::default().min_size_bytes(1);
        let candidate = MediaCandidate::new("image/png", Vec::new());
        assert_eq!(
            validate(&candidate, &constraints),
            Err(ValidationError::TooSmall { actual: 0, minimum: 1 })
        );
    }

    #[test]
    fn test_sniffing_accepts_honest_content() {
        let constraints = UploadConstraints::default().sniff_content(true);

        let png = MediaCandidate::new("image/png", PNG_MAGIC.to_vec());
        assert!(validate(&png, &constraints).is_ok());

        // image/jpg is an alias for the registered image/jpeg
        let jpg = MediaCandidate::new("image/jpg", JPEG_MAGIC.to_vec());
        assert!(validate(&jpg, &constraints).is_ok());
    }

    #[test]
    fn test_sniffing_rejects_forged_content() {
        let constraints = UploadConstraints::default().sniff_content(true);

        let forged = MediaCandidate::new("image/jpeg", ZIP_MAGIC.to_vec());
        assert!(matches!(
            validate(&forged, &constraints),
            Err(ValidationError::ContentMismatch { .. })
        ));

        let unknown = MediaCandidate::new("image/png", b"hello".to_vec());
        assert!(matches!(
            validate(&unknown, &constraints),
            Err(ValidationError::ContentMismatch { ref detected, .. }) if detected == "unknown"
        ));
    }

    #[test]
    fn test_sniffing_disabled_by_default() {
        let forged = MediaCandidate::new("image/png", ZIP_MAGIC.to_vec());
        assert!(validate(&forged, &UploadConstraints::default()).is_ok());
    }

    proptest! {
        #[test]
        fn prop_disallowed_types_are_unsupported(subtype in "[a-z]{1,12}") {
            prop_assume!(!["png", "jpeg", "jpg", "webp", "gif"].contains(&subtype.as_str()));
            let candidate = MediaCandidate::new(format!("image/{subtype}"), vec![0; 8]);
            let is_unsupported = matches!(
                validate(&candidate, &UploadConstraints::default()),
                Err(ValidationError::UnsupportedType { .. })
            );
            prop_assert!(is_unsupported);
        }

        #[test]
        fn prop_oversized_files_are_too_large(limit in 0u64..2048, excess in 1u64..2048) {
            let size = limit + excess;
            let constraints = UploadConstraints::default().max_size_bytes(limit);
            let candidate = MediaCandidate::new("image/webp", vec![0; usize::try_from(size).unwrap()]);
            prop_assert_eq!(
                validate(&candidate, &constraints),
                Err(ValidationError::TooLarge { actual: size, limit })
            );
        }
    }
}
