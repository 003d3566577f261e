//! Owning-record persistence
//!
//! The pipeline writes exactly one field: the avatar reference on a profile.
//! Everything else about profiles belongs to other parts of the application.

use crate::storage::StorageReference;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors writing or reading the owning record
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// No profile exists for the owner
    #[error("Profile not found: {0}")]
    OwnerNotFound(String),

    /// The database rejected or failed the operation
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Store of profiles whose avatar reference the pipeline updates
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Replaces the owner's avatar reference; no other field is touched
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::OwnerNotFound` for an unknown owner, or
    /// `PersistenceError::Database` if the write fails
    async fn set_avatar_reference(
        &self,
        owner_id: &str,
        reference: &StorageReference,
    ) -> Result<(), PersistenceError>;

    /// Returns the owner's current avatar reference, if one is set
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::OwnerNotFound` for an unknown owner, or
    /// `PersistenceError::Database` if the read fails
    async fn avatar_reference(
        &self,
        owner_id: &str,
    ) -> Result<Option<StorageReference>, PersistenceError>;
}

/// In-process profile store
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    avatars: RwLock<HashMap<String, Option<StorageReference>>>,
}

impl InMemoryProfileStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a profile with no avatar
    #[must_use]
    pub fn with_owner(self, owner_id: impl Into<String>) -> Self {
        self.insert_owner(owner_id);
        self
    }

    /// Adds a profile with no avatar, keeping any existing one
    pub fn insert_owner(&self, owner_id: impl Into<String>) {
        self.avatars.write().entry(owner_id.into()).or_default();
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn set_avatar_reference(
        &self,
        owner_id: &str,
        reference: &StorageReference,
    ) -> Result<(), PersistenceError> {
        let mut avatars = self.avatars.write();
        let slot = avatars
            .get_mut(owner_id)
            .ok_or_else(|| PersistenceError::OwnerNotFound(owner_id.to_string()))?;
        *slot = Some(reference.clone());
        Ok(())
    }

    async fn avatar_reference(
        &self,
        owner_id: &str,
    ) -> Result<Option<StorageReference>, PersistenceError> {
        self.avatars
            .read()
            .get(owner_id)
            .cloned()
            .ok_or_else(|| PersistenceError::OwnerNotFound(owner_id.to_string()))
    }
}

/// SQLite-backed profile store
///
/// Expects a `profiles` table with `id` and `avatar_ref` columns;
/// [`ensure_schema`](Self::ensure_schema) creates it when missing.
#[derive(Debug, Clone)]
pub struct SqlProfileStore {
    pool: SqlitePool,
}

impl SqlProfileStore {
    /// Wraps an existing pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `database_url`
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the URL is invalid or the
    /// database cannot be opened
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Creates the `profiles` table if it does not exist
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the statement fails
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY NOT NULL,
                avatar_ref TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts a profile with no avatar; existing profiles are left alone
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the insert fails
    pub async fn insert_profile(&self, owner_id: &str) -> Result<(), PersistenceError> {
        sqlx::query("INSERT OR IGNORE INTO profiles (id) VALUES (?)")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqlProfileStore {
    async fn set_avatar_reference(
        &self,
        owner_id: &str,
        reference: &StorageReference,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query("UPDATE profiles SET avatar_ref = ? WHERE id = ?")
            .bind(reference.as_str())
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::OwnerNotFound(owner_id.to_string()));
        }
        tracing::debug!(owner_id, reference = %reference, "avatar reference updated");
        Ok(())
    }

    async fn avatar_reference(
        &self,
        owner_id: &str,
    ) -> Result<Option<StorageReference>, PersistenceError> {
        let row = sqlx::query("SELECT avatar_ref FROM profiles WHERE id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::OwnerNotFound(owner_id.to_string()))?;

        let avatar: Option<String> = row.try_get("avatar_ref")?;
        Ok(avatar.map(StorageReference::new))
    }
}
