//! Core types for content moderation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Risk categories scored by the classification service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Explicit or partial nudity
    Nudity,
    /// Firearms and other weapons
    Weapons,
    /// Blood, wounds, violence
    Gore,
    /// Offensive signs and gestures
    Offensive,
    /// Recreational drugs
    Drugs,
}

impl Category {
    /// Every category, in the order the service is asked for them
    pub const ALL: [Self; 5] = [
        Self::Nudity,
        Self::Weapons,
        Self::Gore,
        Self::Offensive,
        Self::Drugs,
    ];

    /// Returns the category's canonical name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nudity => "nudity",
            Self::Weapons => "weapons",
            Self::Gore => "gore",
            Self::Offensive => "offensive",
            Self::Drugs => "drugs",
        }
    }

    /// Returns the model name the classification service uses for this category
    #[must_use]
    pub const fn model(self) -> &'static str {
        match self {
            Self::Nudity => "nudity",
            Self::Weapons => "weapon",
            Self::Gore => "gore",
            Self::Offensive => "offensive",
            Self::Drugs => "recreational_drug",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| {
                category.as_str().eq_ignore_ascii_case(s) || category.model().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| format!("unknown moderation category: {s}"))
    }
}

/// Errors from the classification service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassificationError {
    /// Credentials are missing; nothing was sent
    #[error("Image classification is not configured: {hint}")]
    NotConfigured {
        /// How to fix the configuration
        hint: String,
    },

    /// The service refused the configured credentials
    #[error("Image classification credentials were rejected: {0}")]
    InvalidCredentials(String),

    /// The account's quota or rate limit is exhausted
    #[error("Image classification quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The service could not be reached or failed transiently
    #[error("Image classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// The service answered with something other than valid scores
    #[error("Image classification returned an invalid result: {0}")]
    ContractViolation(String),
}

impl ClassificationError {
    /// Whether the caller may retry the attempt after backing off
    ///
    /// Only transient outages qualify. A quota error needs external remediation
    /// first; the others need an operator.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ClassificationUnavailable(_))
    }
}

/// Per-category scores as returned by the service, validated at the boundary
///
/// Holds at least one score, each finite and within `[0.0, 1.0]`. Categories
/// the service did not report are simply absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationRawResult {
    scores: BTreeMap<Category, f64>,
}

impl ModerationRawResult {
    /// Builds a raw result from category scores
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::ContractViolation` if there are no scores,
    /// or any score is non-finite or outside `[0.0, 1.0]`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use taleforge::moderation::{Category, ModerationRawResult};
    ///
    /// let raw = ModerationRawResult::from_scores([(Category::Gore, 0.1)]).unwrap();
    /// assert_eq!(raw.score(Category::Gore), Some(0.1));
    /// assert_eq!(raw.score(Category::Nudity), None);
    ///
    /// assert!(ModerationRawResult::from_scores([]).is_err());
    /// ```
    pub fn from_scores(
        scores: impl IntoIterator<Item = (Category, f64)>,
    ) -> Result<Self, ClassificationError> {
        let scores: BTreeMap<_, _> = scores.into_iter().collect();

        if scores.is_empty() {
            return Err(ClassificationError::ContractViolation(
                "no category scores in response".to_string(),
            ));
        }
        if let Some((category, score)) = scores
            .iter()
            .find(|(_, score)| !score.is_finite() || !(0.0..=1.0).contains(*score))
        {
            return Err(ClassificationError::ContractViolation(format!(
                "{category} score {score} is outside [0, 1]"
            )));
        }

        Ok(Self { scores })
    }

    /// Returns the score reported for a category
    #[must_use]
    pub fn score(&self, category: Category) -> Option<f64> {
        self.scores.get(&category).copied()
    }

    /// Returns every reported score
    #[must_use]
    pub const fn scores(&self) -> &BTreeMap<Category, f64> {
        &self.scores
    }
}

/// Outcome of applying the decision policy to a raw result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationVerdict {
    safe: bool,
    confidence: f64,
    violated_categories: BTreeSet<Category>,
    raw_scores: BTreeMap<Category, f64>,
    missing_categories: BTreeSet<Category>,
}

impl ModerationVerdict {
    pub(crate) fn new(
        confidence: f64,
        violated_categories: BTreeSet<Category>,
        raw_scores: BTreeMap<Category, f64>,
        missing_categories: BTreeSet<Category>,
    ) -> Self {
        Self {
            safe: violated_categories.is_empty(),
            confidence,
            violated_categories,
            raw_scores,
            missing_categories,
        }
    }

    /// Whether the image may be admitted
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        self.safe
    }

    /// Highest observed score, regardless of the verdict
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Categories at or above the threshold; empty iff safe
    #[must_use]
    pub const fn violated_categories(&self) -> &BTreeSet<Category> {
        &self.violated_categories
    }

    /// Every category's score, with unreported categories at 0.0
    #[must_use]
    pub const fn raw_scores(&self) -> &BTreeMap<Category, f64> {
        &self.raw_scores
    }

    /// Categories the service did not report
    #[must_use]
    pub const fn missing_categories(&self) -> &BTreeSet<Category> {
        &self.missing_categories
    }
}
