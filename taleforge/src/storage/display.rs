//! Cache-stable display URLs
//!
//! Browsers and CDNs happily serve a stale avatar when the URL does not change.
//! [`DisplayResolver`] decorates resolved URLs with a `v=<token>` parameter whose
//! value only moves when the reference shown in a slot changes. Re-rendering the
//! same avatar yields the same URL, so caches stay warm.
//!
//! # Examples
//!
//! ```rust,no_run
//! use taleforge::storage::{DisplayResolver, LocalStorageGateway, StorageReference};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = Arc::new(LocalStorageGateway::new(PathBuf::from("/var/uploads"), "/uploads")?);
//! let resolver = DisplayResolver::new(storage);
//!
//! let reference = StorageReference::new("550e8400-e29b-41d4-a716-446655440000");
//! if let Some(url) = resolver.resolve("user-42/avatar", &reference).await? {
//!     println!("<img src=\"{url}\">");
//! }
//! # Ok(())
//! # }
//! ```

use super::traits::StorageGateway;
use super::types::{StorageReference, StorageResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A resolved URL decorated with a cache-version token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayUrl {
    base: String,
    version: u64,
}

impl DisplayUrl {
    /// URL as returned by the storage backend
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Cache-version token
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }
}

impl fmt::Display for DisplayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (path, fragment) = match self.base.split_once('#') {
            Some((path, fragment)) => (path, Some(fragment)),
            None => (self.base.as_str(), None),
        };
        let separator = if path.contains('?') { '&' } else { '?' };

        write!(f, "{path}{separator}v={}", self.version)?;
        if let Some(fragment) = fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct SlotState {
    reference: StorageReference,
    version: u64,
}

/// Resolves references to display URLs, tracking a version per slot
///
/// A slot is the place a reference is shown, such as one user's avatar. The
/// version of a slot starts at 1 and increments only when the slot is resolved
/// with a reference different from the previous one.
pub struct DisplayResolver {
    gateway: Arc<dyn StorageGateway>,
    slots: Mutex<HashMap<String, SlotState>>,
}

impl DisplayResolver {
    /// Creates a resolver over a storage gateway
    #[must_use]
    pub fn new(gateway: Arc<dyn StorageGateway>) -> Self {
        Self {
            gateway,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves a reference for display in a slot
    ///
    /// Returns `Ok(None)` when the reference does not exist; the slot's version
    /// is left untouched in that case.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageUnavailable` if the backend cannot be reached
    pub async fn resolve(
        &self,
        slot: &str,
        reference: &StorageReference,
    ) -> StorageResult<Option<DisplayUrl>> {
        let Some(base) = self.gateway.resolve(reference).await? else {
            return Ok(None);
        };

        let version = self.observe(slot, reference);
        Ok(Some(DisplayUrl { base, version }))
    }

    /// Returns the slot's current version, if it was ever resolved
    #[must_use]
    pub fn current_version(&self, slot: &str) -> Option<u64> {
        self.slots.lock().get(slot).map(|state| state.version)
    }

    /// Drops the state kept for a slot
    pub fn forget(&self, slot: &str) {
        self.slots.lock().remove(slot);
    }

    fn observe(&self, slot: &str, reference: &StorageReference) -> u64 {
        let mut slots = self.slots.lock();
        match slots.get_mut(slot) {
            Some(state) if state.reference == *reference => state.version,
            Some(state) => {
                state.reference = reference.clone();
                state.version += 1;
                tracing::debug!(slot, version = state.version, "display reference changed");
                state.version
            }
            None => {
                slots.insert(
                    slot.to_string(),
                    SlotState {
                        reference: reference.clone(),
                        version: 1,
                    },
                );
                1
            }
        }
    }
}

impl fmt::Debug for DisplayResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayResolver")
            .field("gateway", &self.gateway.name())
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}
