//! taleforge: media admission for story covers and profile avatars
//!
//! Every image a user picks goes through the same synchronous check before it
//! can appear on their profile:
//!
//! 1. **Validate** locally: type allowlist, size limits, optional magic numbers
//! 2. **Upload** to durable storage and obtain a reference
//! 3. **Classify** the stored image with a hosted moderation service
//! 4. **Decide** admit or reject from per-category risk scores
//! 5. **Commit** the reference to the owner's profile, only when admitted
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use taleforge::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     taleforge::observability::init()?;
//!     let config = TaleforgeConfig::load_for_service("web")?;
//!
//!     let profiles = SqlProfileStore::connect(&config.persistence.database_url).await?;
//!     profiles.ensure_schema().await?;
//!
//!     let pipeline = AdmissionPipeline::new(
//!         config.storage_gateway()?,
//!         Arc::new(HttpClassifier::new(config.classifier_config())?),
//!         Arc::new(profiles),
//!     )
//!     .with_constraints(config.upload_constraints())
//!     .with_policy(config.decision_policy()?);
//!
//!     let candidate = MediaCandidate::new("image/png", std::fs::read("avatar.png")?);
//!     let result = pipeline.admit(candidate, "user-42").await;
//!     println!("{}", result.user_message());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`storage`]: validation, storage gateways, display URLs
//! - [`moderation`]: classification client and decision policy
//! - [`admission`]: the orchestrating state machine and profile persistence
//! - [`config`], [`observability`], [`error`]: ambient plumbing

pub mod admission;
pub mod config;
pub mod error;
pub mod moderation;
pub mod observability;
pub mod storage;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use taleforge::prelude::*;
    //! ```

    // Orchestration
    pub use crate::admission::{
        AdmissionPipeline, AdmissionResult, AdmissionState, InMemoryProfileStore,
        PersistenceError, ProfileStore, SqlProfileStore,
    };

    // Storage
    pub use crate::storage::{
        validate, DisplayResolver, DisplayUrl, HttpStorageGateway, LocalStorageGateway,
        MediaCandidate, StorageError, StorageGateway, StorageReference, UploadConstraints,
        ValidationError,
    };

    // Moderation
    pub use crate::moderation::{
        Category, ClassificationError, ClassifierConfig, ClassifierCredentials, DecisionPolicy,
        HttpClassifier, ImageClassifier, ModerationRawResult, ModerationVerdict,
    };

    // Errors and configuration
    pub use crate::config::TaleforgeConfig;
    pub use crate::error::{AdmissionError, ErrorKind};
}
