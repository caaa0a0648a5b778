//! Cache store abstraction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// What a cache hit replays: wrapped markup (markers intact) and its content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
    /// Rendered markup with donut hole markers.
    pub content: String,
    /// Content type of the response.
    pub content_type: String,
}

impl CacheItem {
    /// Create a cache item.
    pub fn new(content: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
        }
    }
}

/// Cache store backend.
///
/// Implementations must be safe for concurrent use; each operation must be
/// atomic per key. Expired entries must not be returned by `get`.
pub trait CacheStore: Send + Sync {
    /// Get a live entry.
    fn get(&self, key: &str) -> Result<Option<CacheItem>, StoreError>;

    /// Store an entry until `expires_at`, replacing any previous one.
    fn set(&self, key: &str, item: CacheItem, expires_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Remove an entry, returning whether one was present.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// List stored keys. Needed only for prefix eviction.
    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::ListingUnsupported)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    item: CacheItem,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-memory store for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheItem>, StoreError> {
        let now = Utc::now();
        match self.entries.read().get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.item.clone())),
            Some(_) => {}
        }

        // Expired: drop it unless a concurrent set replaced it meanwhile.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, item: CacheItem, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(key.to_string(), CacheEntry { item, expires_at });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
