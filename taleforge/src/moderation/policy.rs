//! Admission decision policy
//!
//! Turns per-category risk scores into a binary verdict. A single uniform
//! threshold applies to every category: an image is safe iff every score is
//! strictly below it.

use super::types::{Category, ModerationRawResult, ModerationVerdict};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Default admission threshold
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Errors building a policy
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum PolicyError {
    /// Threshold is not in `(0.0, 1.0]`
    #[error("Moderation threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
}

/// Maps raw scores to a [`ModerationVerdict`]
///
/// # Examples
///
/// ```rust
/// use taleforge::moderation::{Category, DecisionPolicy, ModerationRawResult};
///
/// let raw = ModerationRawResult::from_scores([
///     (Category::Nudity, 0.6),
///     (Category::Gore, 0.1),
/// ])?;
///
/// let verdict = DecisionPolicy::default().decide(&raw);
/// assert!(!verdict.is_safe());
/// assert!(verdict.violated_categories().contains(&Category::Nudity));
/// assert!((verdict.confidence() - 0.6).abs() < f64::EPSILON);
/// # Ok::<(), taleforge::moderation::ClassificationError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl DecisionPolicy {
    /// Creates a policy with a custom threshold
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidThreshold` unless `0.0 < threshold <= 1.0`
    pub fn with_threshold(threshold: f64) -> Result<Self, PolicyError> {
        if threshold > 0.0 && threshold <= 1.0 {
            Ok(Self { threshold })
        } else {
            Err(PolicyError::InvalidThreshold(threshold))
        }
    }

    /// Returns the admission threshold
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decides whether a classified image is safe
    #[must_use]
    pub fn decide(&self, raw: &ModerationRawResult) -> ModerationVerdict {
        let mut scores = BTreeMap::new();
        let mut missing = BTreeSet::new();

        for category in Category::ALL {
            let score = raw.score(category).unwrap_or_else(|| {
                missing.insert(category);
                0.0
            });
            scores.insert(category, score);
        }

        if !missing.is_empty() {
            let missing_list: Vec<_> = missing.iter().map(|c| c.as_str()).collect();
            tracing::warn!(
                missing = ?missing_list,
                "classification result is missing categories; scoring them as 0.0"
            );
        }

        let confidence = scores.values().copied().fold(0.0, f64::max);
        let violated: BTreeSet<_> = scores
            .iter()
            .filter(|(_, score)| **score >= self.threshold)
            .map(|(category, _)| *category)
            .collect();

        ModerationVerdict::new(confidence, violated, scores, missing)
    }
}
