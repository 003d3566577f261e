//! Media admission orchestration
//!
//! [`AdmissionPipeline`] takes one selected image through
//! validate, upload, classify, decide, and (only when the image is safe)
//! commits the new storage reference to the owner's profile.
//!
//! ```text
//! Selected -> Validated -> Uploaded -> Classified -> Admitted
//!     |           |           |             |
//!     +-----------+-----------+-------------+-> Failed
//!                                           +-> Rejected
//! ```
//!
//! Every attempt ends in exactly one terminal [`AdmissionResult`]. Nothing is
//! retried, and a failed or rejected attempt leaves the profile untouched.
//!
//! # Examples
//!
//! ```rust,no_run
//! use taleforge::admission::{AdmissionPipeline, AdmissionResult, InMemoryProfileStore};
//! use taleforge::moderation::{ClassifierConfig, ClassifierCredentials, HttpClassifier};
//! use taleforge::storage::{LocalStorageGateway, MediaCandidate};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = Arc::new(LocalStorageGateway::new(PathBuf::from("./uploads"), "https://example.com/uploads")?);
//! let classifier = Arc::new(HttpClassifier::new(ClassifierConfig::new(
//!     ClassifierCredentials::new("api-user", "api-secret"),
//! ))?);
//! let profiles = Arc::new(InMemoryProfileStore::new().with_owner("user-42"));
//!
//! let pipeline = AdmissionPipeline::new(storage, classifier, profiles);
//! let candidate = MediaCandidate::new("image/png", std::fs::read("avatar.png")?);
//!
//! match pipeline.admit(candidate, "user-42").await {
//!     AdmissionResult::Admitted { storage_reference, .. } => println!("Avatar set: {storage_reference}"),
//!     other => println!("{}", other.user_message()),
//! }
//! # Ok(())
//! # }
//! ```

mod persistence;

#[cfg(test)]
pub use persistence::MockProfileStore;
pub use persistence::{InMemoryProfileStore, PersistenceError, ProfileStore, SqlProfileStore};

use crate::error::AdmissionError;
use crate::moderation::{Category, DecisionPolicy, ImageClassifier};
use crate::storage::{
    validate, MediaCandidate, StorageError, StorageGateway, StorageReference, UploadConstraints,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// Where an admission attempt stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AdmissionState {
    /// Candidate chosen, nothing checked yet
    Selected,
    /// Passed local validation
    Validated,
    /// Bytes durably stored
    Uploaded,
    /// Scores received and a verdict reached
    Classified,
    /// Reference committed to the owner (terminal)
    Admitted,
    /// Refused by moderation (terminal)
    Rejected,
    /// Ended by an error (terminal)
    Failed,
}

impl AdmissionState {
    /// Whether `next` is a legal successor of this state
    ///
    /// # Examples
    ///
    /// ```rust
    /// use taleforge::admission::AdmissionState;
    ///
    /// assert!(AdmissionState::Selected.can_advance_to(AdmissionState::Validated));
    /// assert!(!AdmissionState::Selected.can_advance_to(AdmissionState::Uploaded));
    /// assert!(!AdmissionState::Admitted.can_advance_to(AdmissionState::Failed));
    /// ```
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Selected, Self::Validated | Self::Failed)
                | (Self::Validated, Self::Uploaded | Self::Failed)
                | (Self::Uploaded, Self::Classified | Self::Failed)
                | (Self::Classified, Self::Admitted | Self::Rejected | Self::Failed)
        )
    }

    /// Whether the attempt is over
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Admitted | Self::Rejected | Self::Failed)
    }
}

impl fmt::Display for AdmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Selected => "selected",
            Self::Validated => "validated",
            Self::Uploaded => "uploaded",
            Self::Classified => "classified",
            Self::Admitted => "admitted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one admission attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionResult {
    /// Stored, classified safe, and committed to the owner
    Admitted {
        /// Reference now set on the owner's profile
        storage_reference: StorageReference,
        /// Highest observed risk score
        confidence: f64,
    },

    /// Classified unsafe; the owner's profile is unchanged
    Rejected {
        /// Categories at or above the threshold
        violated_categories: BTreeSet<Category>,
        /// Highest observed risk score
        confidence: f64,
    },

    /// An error ended the attempt; the owner's profile is unchanged
    Failed {
        /// The error, as raised by the failing component
        error: AdmissionError,
        /// Last state reached before the failing step
        state: AdmissionState,
    },
}

impl AdmissionResult {
    /// Terminal state of the attempt
    #[must_use]
    pub const fn state(&self) -> AdmissionState {
        match self {
            Self::Admitted { .. } => AdmissionState::Admitted,
            Self::Rejected { .. } => AdmissionState::Rejected,
            Self::Failed { .. } => AdmissionState::Failed,
        }
    }

    /// Whether the image was admitted
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Message suitable for end users
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Admitted { .. } => "Your image has been updated.".to_string(),
            Self::Rejected {
                violated_categories,
                ..
            } => {
                let categories: Vec<_> = violated_categories.iter().map(|c| c.as_str()).collect();
                format!(
                    "This image was flagged for {} and can't be used. Please choose a different image.",
                    categories.join(", ")
                )
            }
            Self::Failed { error, .. } => error.user_message(),
        }
    }
}

/// Tracks one attempt's progress through [`AdmissionState`]
struct Attempt {
    state: AdmissionState,
}

impl Attempt {
    const fn new() -> Self {
        Self {
            state: AdmissionState::Selected,
        }
    }

    fn advance(&mut self, next: AdmissionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal admission transition {} -> {next}",
            self.state
        );
        tracing::debug!(from = %self.state, to = %next, "admission advanced");
        self.state = next;
    }

    fn fail(&self, error: impl Into<AdmissionError>) -> AdmissionResult {
        let error = error.into();
        tracing::info!(
            state = %self.state,
            kind = %error.kind(),
            retryable = error.is_retryable(),
            error = %error,
            "admission failed"
        );
        AdmissionResult::Failed {
            error,
            state: self.state,
        }
    }
}

fn orphaned(reference: &StorageReference, reason: &dyn fmt::Display) {
    tracing::warn!(reference = %reference, reason = %reason, "stored object orphaned");
}

/// Runs admission attempts against shared collaborators
///
/// Cheap to share: wrap it in an `Arc` and call [`admit`](Self::admit) from
/// as many tasks as needed. Attempts do not share mutable state.
pub struct AdmissionPipeline {
    storage: Arc<dyn StorageGateway>,
    classifier: Arc<dyn ImageClassifier>,
    profiles: Arc<dyn ProfileStore>,
    constraints: UploadConstraints,
    policy: DecisionPolicy,
}

impl AdmissionPipeline {
    /// Creates a pipeline with default constraints and policy
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        classifier: Arc<dyn ImageClassifier>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            storage,
            classifier,
            profiles,
            constraints: UploadConstraints::default(),
            policy: DecisionPolicy::default(),
        }
    }

    /// Overrides the upload constraints
    #[must_use]
    pub fn with_constraints(mut self, constraints: UploadConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Overrides the decision policy
    #[must_use]
    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the active upload constraints
    #[must_use]
    pub const fn constraints(&self) -> &UploadConstraints {
        &self.constraints
    }

    /// Runs one admission attempt for `owner_id`'s avatar
    pub async fn admit(&self, candidate: MediaCandidate, owner_id: &str) -> AdmissionResult {
        let span = tracing::info_span!(
            "admission",
            owner_id,
            mime_type = %candidate.mime_essence(),
            size = candidate.size(),
        );
        self.run(candidate, owner_id).instrument(span).await
    }

    async fn run(&self, candidate: MediaCandidate, owner_id: &str) -> AdmissionResult {
        let mut attempt = Attempt::new();

        if let Err(e) = validate(&candidate, &self.constraints) {
            return attempt.fail(e);
        }
        attempt.advance(AdmissionState::Validated);

        let target = match self.storage.request_upload_destination().await {
            Ok(target) => target,
            Err(e) => return attempt.fail(e),
        };
        let reference = match self.storage.commit_upload(target, &candidate).await {
            Ok(reference) => reference,
            Err(e) => return attempt.fail(e),
        };
        drop(candidate);
        attempt.advance(AdmissionState::Uploaded);

        let url = match self.storage.resolve(&reference).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                let error = StorageError::StorageUnavailable(format!(
                    "stored object {reference} could not be resolved"
                ));
                orphaned(&reference, &error);
                return attempt.fail(error);
            }
            Err(e) => {
                orphaned(&reference, &e);
                return attempt.fail(e);
            }
        };

        let raw = match self.classifier.classify(&url).await {
            Ok(raw) => raw,
            Err(e) => {
                orphaned(&reference, &e);
                return attempt.fail(e);
            }
        };
        let verdict = self.policy.decide(&raw);
        attempt.advance(AdmissionState::Classified);

        if !verdict.is_safe() {
            attempt.advance(AdmissionState::Rejected);
            let violated: Vec<_> = verdict.violated_categories().iter().map(|c| c.as_str()).collect();
            tracing::warn!(
                reference = %reference,
                violated = ?violated,
                confidence = verdict.confidence(),
                "upload rejected by moderation; stored object orphaned"
            );
            return AdmissionResult::Rejected {
                violated_categories: verdict.violated_categories().clone(),
                confidence: verdict.confidence(),
            };
        }

        if let Err(e) = self.profiles.set_avatar_reference(owner_id, &reference).await {
            orphaned(&reference, &e);
            return attempt.fail(e);
        }
        attempt.advance(AdmissionState::Admitted);

        tracing::info!(
            reference = %reference,
            confidence = verdict.confidence(),
            "upload admitted"
        );
        AdmissionResult::Admitted {
            storage_reference: reference,
            confidence: verdict.confidence(),
        }
    }
}

impl fmt::Debug for AdmissionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPipeline")
            .field("storage", &self.storage.name())
            .field("classifier", &self.classifier.name())
            .field("constraints", &self.constraints)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
