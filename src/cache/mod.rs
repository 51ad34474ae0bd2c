//! Two-tier TTL cache for discovery results and fetched pages
//!
//! The local tier is an in-process `DashMap`; the shared tier lives in the
//! SQLite store so entries survive restarts and are visible to every worker.
//! Reads check the local tier first and promote shared hits into it. Writes
//! replace both tiers (last write wins).

use crate::storage::{self, CacheStore, SharedStorage};
use chrono::Utc;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Key prefix for assembled discovery results
pub const DISCOVERY_PREFIX: &str = "discovery:";

/// Key prefix for single protocol documents
pub const DOCUMENT_PREFIX: &str = "doc:";

/// Key prefix for scraped pages
pub const PAGE_PREFIX: &str = "page:";

#[derive(Debug, Clone)]
struct LocalEntry {
    value: String,
    expires_at: i64,
}

/// Counters reported through the stats API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub local_entries: u64,
    pub shared_entries: u64,
}

/// Process-wide cache shared by discovery, scrape and batch paths
pub struct TieredCache {
    local: DashMap<String, LocalEntry>,
    storage: SharedStorage,
    local_max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl TieredCache {
    /// Creates a cache over the given shared store
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared SQLite store backing the second tier
    /// * `local_max_entries` - Capacity of the in-process tier
    pub fn new(storage: SharedStorage, local_max_entries: usize) -> Self {
        Self {
            local: DashMap::new(),
            storage,
            local_max_entries: local_max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks a key up, deserializing the cached JSON
    ///
    /// Entries that no longer deserialize into `T` are treated as misses.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> crate::Result<Option<T>> {
        let now = now_ms();

        let local = self.local.get(key).map(|entry| entry.value().clone());
        let raw = match local {
            Some(entry) if entry.expires_at > now => Some(entry.value),
            Some(_) => {
                self.local.remove(key);
                self.shared_get(key, now)?
            }
            None => self.shared_get(key, now)?,
        };

        let Some(raw) = raw else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Err(e) => {
                tracing::debug!(key, error = %e, "Dropping undecodable cache entry");
                self.invalidate(key)?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Stores a value in both tiers for `ttl`
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> crate::Result<()> {
        let raw = serde_json::to_string(value)?;
        let expires_at = now_ms().saturating_add(ttl.as_millis() as i64);

        storage::lock(&self.storage)?.cache_put(key, &raw, expires_at)?;
        self.insert_local(key, raw, expires_at);
        Ok(())
    }

    /// Removes a key from both tiers
    pub fn invalidate(&self, key: &str) -> crate::Result<()> {
        self.local.remove(key);
        storage::lock(&self.storage)?.cache_delete(key)?;
        Ok(())
    }

    /// Clears all cached discovery and page entries
    ///
    /// Returns the number of shared entries removed.
    pub fn clear(&self) -> crate::Result<u64> {
        self.local.clear();
        let removed = storage::lock(&self.storage)?.cache_clear()?;
        tracing::info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Current cache counters
    pub fn stats(&self) -> crate::Result<CacheStats> {
        let now = now_ms();
        let shared_entries = {
            let mut storage = storage::lock(&self.storage)?;
            storage.purge_expired(now)?;
            storage.cache_count(now)?
        };

        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            local_entries: self.local.iter().filter(|e| e.expires_at > now).count() as u64,
            shared_entries,
        })
    }

    fn shared_get(&self, key: &str, now: i64) -> crate::Result<Option<String>> {
        let entry = storage::lock(&self.storage)?.cache_get(key, now)?;
        Ok(entry.map(|(value, expires_at)| {
            self.insert_local(key, value.clone(), expires_at);
            value
        }))
    }

    fn insert_local(&self, key: &str, value: String, expires_at: i64) {
        if !self.local.contains_key(key) && self.local.len() >= self.local_max_entries {
            self.evict_local();
        }
        self.local
            .insert(key.to_string(), LocalEntry { value, expires_at });
    }

    /// Drops expired local entries, then the soonest-expiring one if still full
    fn evict_local(&self) {
        let now = now_ms();
        self.local.retain(|_, entry| entry.expires_at > now);

        if self.local.len() >= self.local_max_entries {
            let oldest = self
                .local
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());
            if let Some(key) = oldest {
                self.local.remove(&key);
            }
        }
    }
}
