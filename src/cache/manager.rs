//! Expiring record cache on top of a `RecordStore`
//!
//! Provides a `CacheManager` that stores serializable values with an expiry
//! instant. Expired entries are evicted lazily on read, in bulk by
//! `sweep_expired`, or by key prefix. The cache is best-effort: storage
//! failures are logged and never reach the caller.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::{Record, RecordStore, StoreError, CACHE_COLLECTION};

/// Default number of entries removed per sweep pass
pub const DEFAULT_SWEEP_BATCH: usize = 500;

/// Shortest TTL honoured; keeps `expires_at` strictly after `cached_at`
const MIN_TTL_SECONDS: u64 = 1;

/// Wrapper struct for cached data held in the record body
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// The cached data
    data: T,
    /// When the data was cached
    cached_at: DateTime<Utc>,
    /// When the cache entry expires
    expires_at: DateTime<Utc>,
}

/// Result of reading from cache, including metadata about the entry
#[derive(Debug)]
pub struct CachedData<T> {
    /// The cached data
    pub data: T,
    /// When the data was originally cached
    pub cached_at: DateTime<Utc>,
    /// When the entry stops being served
    pub expires_at: DateTime<Utc>,
}

/// Diagnostic counts over the cache collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries stored, expired or not
    pub total: u64,
    /// Entries past their expiry still waiting for a sweep
    pub expired: u64,
    /// Entries that would be served
    pub active: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ total: {}, expired: {}, active: {} }}",
            self.total, self.expired, self.active
        )
    }
}

/// Manages reading and writing cached values to a record store
///
/// Cheap to clone; clones share the same store and clock.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager").finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Creates a CacheManager over `store` using the system clock
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Creates a CacheManager with a custom clock
    ///
    /// Useful for testing expiry without waiting.
    pub fn with_clock(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Stores `value` under `key` for `ttl_seconds`
    ///
    /// Overwrites any existing entry. Failures are logged and swallowed.
    ///
    /// # Arguments
    /// * `key` - Unique identifier for the cache entry (e.g., "football-api:teams_39_2025")
    /// * `value` - The data to cache (must implement Serialize)
    /// * `ttl_seconds` - How long the entry should be served
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let now = self.clock.now();
        let ttl = ttl_seconds.max(MIN_TTL_SECONDS);
        let expires_at = now + Duration::seconds(ttl as i64);

        let entry = CacheEntry {
            data: value,
            cached_at: now,
            expires_at,
        };
        let body = match serde_json::to_value(&entry) {
            Ok(body) => body,
            Err(e) => {
                error!(key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        match self
            .store
            .put(CACHE_COLLECTION, Record::new(key, body, expires_at))
            .await
        {
            Ok(()) => debug!(key, ttl, "Cache set"),
            Err(e) => error!(key, error = %e, "Failed to set cache entry"),
        }
    }

    /// Reads the value stored under `key`
    ///
    /// Returns `None` when the entry is missing, expired (it is deleted first),
    /// undecodable, or when the store fails.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read(key).await.map(|cached| cached.data)
    }

    /// Reads the value stored under `key` together with its metadata
    ///
    /// Same eviction and failure rules as [`CacheManager::get`].
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        let record = match self.store.get(CACHE_COLLECTION, key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                error!(key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        if self.clock.now() >= record.expires_at {
            debug!(key, "Cache entry expired");
            self.delete(key).await;
            return None;
        }

        match serde_json::from_value::<CacheEntry<T>>(record.body) {
            Ok(entry) => {
                debug!(key, "Cache hit");
                Some(CachedData {
                    data: entry.data,
                    cached_at: entry.cached_at,
                    expires_at: record.expires_at,
                })
            }
            Err(e) => {
                warn!(key, error = %e, "Cached entry has an unexpected shape");
                None
            }
        }
    }

    /// Removes `key`; a missing key is not an error
    pub async fn delete(&self, key: &str) {
        match self.store.delete(CACHE_COLLECTION, key).await {
            Ok(_) => debug!(key, "Cache deleted"),
            Err(e) => error!(key, error = %e, "Failed to delete cache entry"),
        }
    }

    /// Removes every entry whose key starts with `prefix`
    ///
    /// # Returns
    /// The number of entries removed (0 if the store fails)
    pub async fn delete_by_prefix(&self, prefix: &str) -> usize {
        match self.try_delete_by_prefix(prefix).await {
            Ok(count) => {
                info!(prefix, count, "Cleared cache with prefix");
                count
            }
            Err(e) => {
                error!(prefix, error = %e, "Failed to clear cache with prefix");
                0
            }
        }
    }

    /// Removes up to `batch_size` entries that expired before now
    ///
    /// Callers loop until the return value drops below `batch_size`.
    pub async fn sweep_expired(&self, batch_size: usize) -> usize {
        match self.try_sweep_expired(batch_size).await {
            Ok(0) => 0,
            Ok(count) => {
                info!(count, "Cleaned up expired cache entries");
                count
            }
            Err(e) => {
                error!(error = %e, "Failed to clean up expired cache entries");
                0
            }
        }
    }

    async fn try_delete_by_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let keys = self.store.keys_with_prefix(CACHE_COLLECTION, prefix).await?;
        self.store.delete_many(CACHE_COLLECTION, &keys).await
    }

    async fn try_sweep_expired(&self, batch_size: usize) -> Result<usize, StoreError> {
        let keys = self
            .store
            .expired_keys(CACHE_COLLECTION, self.clock.now(), batch_size)
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.delete_many(CACHE_COLLECTION, &keys).await
    }

    /// Counts total, expired and active entries
    pub async fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let (total, expired) = futures::future::join(
            self.store.count(CACHE_COLLECTION, None),
            self.store.count(CACHE_COLLECTION, Some(now)),
        )
        .await;

        match (total, expired) {
            (Ok(total), Ok(expired)) => CacheStats {
                total,
                expired,
                active: total.saturating_sub(expired),
            },
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to get cache stats");
                CacheStats::default()
            }
        }
    }
}
