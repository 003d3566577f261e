//! Content moderation for uploaded images
//!
//! Two pieces that never call each other:
//! - [`client`]: talks to the hosted classification service and returns
//!   validated per-category scores
//! - [`policy`]: turns those scores into an admit/reject verdict
//!
//! # Examples
//!
//! ```rust,no_run
//! use taleforge::moderation::{
//!     ClassifierConfig, ClassifierCredentials, DecisionPolicy, HttpClassifier, ImageClassifier,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let classifier = HttpClassifier::new(ClassifierConfig::new(ClassifierCredentials::new(
//!     "api-user",
//!     "api-secret",
//! )))?;
//!
//! let raw = classifier.classify("https://cdn.example/covers/abc.png").await?;
//! let verdict = DecisionPolicy::default().decide(&raw);
//!
//! if !verdict.is_safe() {
//!     println!("Rejected for: {:?}", verdict.violated_categories());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod policy;
mod types;

#[cfg(test)]
pub use client::MockImageClassifier;
pub use client::{
    classify_failure, parse_response, ClassifierConfig, ClassifierCredentials, HttpClassifier,
    ImageClassifier,
};
pub use policy::{DecisionPolicy, PolicyError, DEFAULT_THRESHOLD};
pub use types::{Category, ClassificationError, ModerationRawResult, ModerationVerdict};
