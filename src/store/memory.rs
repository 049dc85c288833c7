//! In-process record store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{Record, RecordStore, StoreError};

type Collection = BTreeMap<String, Record>;

/// Record store held entirely in memory
///
/// Keys are kept ordered per collection so prefix scans are range reads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all collections
    pub async fn len(&self) -> usize {
        self.collections.read().await.values().map(BTreeMap::len).sum()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|records| records.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, record: Record) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map(|records| records.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn keys_with_prefix(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn expired_keys(
        &self,
        collection: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(records
            .values()
            .filter(|record| record.expired_before(before))
            .take(limit)
            .map(|record| record.key.clone())
            .collect())
    }

    async fn active_records(
        &self,
        collection: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(records
            .values()
            .filter(|record| record.expires_at > after)
            .cloned()
            .collect())
    }

    async fn count(
        &self,
        collection: &str,
        expired_before: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(0);
        };

        let count = match expired_before {
            Some(before) => records
                .values()
                .filter(|record| record.expired_before(before))
                .count(),
            None => records.len(),
        };
        Ok(count as u64)
    }

    async fn delete_many(&self, collection: &str, keys: &[String]) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };

        Ok(keys
            .iter()
            .filter(|key| records.remove(key.as_str()).is_some())
            .count())
    }
}
