//! Store access with graceful degradation, and administrative eviction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use donut_core::RouteValues;
use tracing::{debug, warn};

use crate::key::{keyed_route_values, CacheKey, KeyBuilder};
use crate::store::{CacheItem, CacheStore};

/// Reads, writes and evicts cached pages.
///
/// Store failures never fail a request: reads degrade to a miss and
/// writes or removals to a no-op, each logged at `warn`.
#[derive(Clone)]
pub struct OutputCacheManager {
    store: Arc<dyn CacheStore>,
    key_builder: KeyBuilder,
}

impl std::fmt::Debug for OutputCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCacheManager")
            .field("key_builder", &self.key_builder)
            .finish_non_exhaustive()
    }
}

impl OutputCacheManager {
    /// Create a manager over a store.
    pub fn new(store: Arc<dyn CacheStore>, key_builder: KeyBuilder) -> Self {
        Self { store, key_builder }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Store an item until `expires_at`.
    pub fn add_item(&self, key: &CacheKey, item: CacheItem, expires_at: DateTime<Utc>) {
        match self.store.set(key.as_str(), item, expires_at) {
            Ok(()) => debug!(cache_key = %key, %expires_at, "stored page"),
            Err(e) => warn!(cache_key = %key, error = %e, "cache store write failed"),
        }
    }

    /// Get a live item, treating store failures as a miss.
    pub fn get_item(&self, key: &CacheKey) -> Option<CacheItem> {
        match self.store.get(key.as_str()) {
            Ok(item) => item,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "cache store read failed, treating as miss");
                None
            }
        }
    }

    /// Remove the entry of an action cached without varying values.
    pub fn remove_item(&self, controller: &str, action: &str) -> bool {
        self.remove_item_with(controller, action, &RouteValues::new(), &[])
    }

    /// Remove the entry of an action cached under specific varying values.
    ///
    /// Route values may be given in any order; they are keyed the way the
    /// key generator keys them. `params` are the varied request parameters
    /// in the order the handler's vary-by-param rule lists them.
    pub fn remove_item_with(
        &self,
        controller: &str,
        action: &str,
        route_values: &RouteValues,
        params: &[(&str, &str)],
    ) -> bool {
        let pairs = keyed_route_values(route_values)
            .into_iter()
            .chain(params.iter().copied());
        let key = self.key_builder.build_key(controller, action, pairs);
        self.remove_key(&key)
    }

    /// Remove a single key.
    pub fn remove_key(&self, key: &CacheKey) -> bool {
        match self.store.remove(key.as_str()) {
            Ok(removed) => {
                debug!(cache_key = %key, removed, "evicted page");
                removed
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "cache store remove failed");
                false
            }
        }
    }

    /// Remove every cached variant of an action, or of a whole controller.
    ///
    /// Returns the number of entries removed. Requires a store that can list
    /// its keys; otherwise nothing is removed.
    pub fn remove_items(&self, controller: &str, action: Option<&str>) -> usize {
        let prefix = self.key_builder.build_prefix(controller, action);

        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "cache store listing failed");
                return 0;
            }
        };

        keys.into_iter()
            .filter(|key| KeyBuilder::key_matches_prefix(key, &prefix))
            .filter(|key| self.remove_key(&CacheKey::new(key.as_str())))
            .count()
    }
}
