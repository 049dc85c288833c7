//! Keyed record store backing the cache and the rate limiter
//!
//! The store is deliberately small: point reads and writes, prefix scans,
//! expiry scans and counts. Records are grouped into named collections so the
//! cache and the rate limiter never share a key space.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Collection holding cached upstream responses
pub const CACHE_COLLECTION: &str = "api_cache";

/// Collection holding rate limit windows
pub const RATE_LIMIT_COLLECTION: &str = "rate_limits";

/// Errors surfaced by a record store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem or socket failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be decoded
    #[error("Corrupt record '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record body could not be encoded
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The backend cannot be reached at all
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// A single stored record
///
/// The store treats `body` as opaque; only `expires_at` is interpreted, so
/// expiry scans and counts can run without knowing what the record holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique key within the collection
    pub key: String,
    /// Owner-defined payload
    pub body: serde_json::Value,
    /// Instant after which the record is considered stale
    pub expires_at: DateTime<Utc>,
}

impl Record {
    /// Creates a record from its parts
    pub fn new(key: impl Into<String>, body: serde_json::Value, expires_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            body,
            expires_at,
        }
    }

    /// Whether the record expired strictly before `instant`
    pub fn expired_before(&self, instant: DateTime<Utc>) -> bool {
        self.expires_at < instant
    }
}

/// Minimal keyed record store interface
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads one record
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>, StoreError>;

    /// Inserts or replaces one record
    async fn put(&self, collection: &str, record: Record) -> Result<(), StoreError>;

    /// Removes one record, returning whether it existed
    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// Lists keys starting with `prefix`
    async fn keys_with_prefix(&self, collection: &str, prefix: &str)
        -> Result<Vec<String>, StoreError>;

    /// Lists up to `limit` keys whose record expired strictly before `before`
    async fn expired_keys(
        &self,
        collection: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Returns every record still valid strictly after `after`
    async fn active_records(
        &self,
        collection: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Counts records; with `expired_before` set, only those expired before it
    async fn count(
        &self,
        collection: &str,
        expired_before: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError>;

    /// Removes several records, returning how many existed
    ///
    /// Default implementation falls back to sequential deletes.
    async fn delete_many(&self, collection: &str, keys: &[String]) -> Result<usize, StoreError> {
        let mut removed = 0;
        for key in keys {
            if self.delete(collection, key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
