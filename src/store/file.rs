//! Record store persisting each record as a JSON file on disk
//!
//! Layout: `<root>/<collection>/<encoded key>.json`. Every file carries the
//! full `Record`, so scans read the key back from the file rather than from
//! the (escaped) file name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::{fs, task};
use tracing::warn;

use super::{Record, RecordStore, StoreError};

/// Persists records to JSON files in a cache directory
///
/// Uses an XDG-compliant directory (`~/.cache/matchday/` on Linux) unless a
/// custom root is given.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory holding one sub-directory per collection
    root: PathBuf,
}

impl FileStore {
    /// Creates a FileStore under the platform cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "matchday")?;
        Some(Self {
            root: project_dirs.cache_dir().join("store"),
        })
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(encode_component(collection))
    }

    fn record_path(&self, collection: &str, key: &str) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.json", encode_component(key)))
    }

    /// Reads every decodable record of a collection
    ///
    /// Corrupt files are skipped with a warning; a missing collection
    /// directory is an empty collection.
    async fn load_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let dir = self.collection_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                // Deleted between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match serde_json::from_str::<Record>(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping corrupt record file"),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>, StoreError> {
        let content = match fs::read_to_string(self.record_path(collection, key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    async fn put(&self, collection: &str, record: Record) -> Result<(), StoreError> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir).await?;

        let path = self.record_path(collection, &record.key);
        let json = serde_json::to_vec_pretty(&record)?;

        // Each write gets its own temp file, then replaces the record in one rename
        task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&json)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("write task failed: {}", e)))?
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.record_path(collection, key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys_with_prefix(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .load_all(collection)
            .await?
            .into_iter()
            .map(|record| record.key)
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn expired_keys(
        &self,
        collection: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .load_all(collection)
            .await?
            .into_iter()
            .filter(|record| record.expired_before(before))
            .take(limit)
            .map(|record| record.key)
            .collect())
    }

    async fn active_records(
        &self,
        collection: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .load_all(collection)
            .await?
            .into_iter()
            .filter(|record| record.expires_at > after)
            .collect())
    }

    async fn count(
        &self,
        collection: &str,
        expired_before: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let records = self.load_all(collection).await?;
        let count = match expired_before {
            Some(before) => records
                .iter()
                .filter(|record| record.expired_before(before))
                .count(),
            None => records.len(),
        };
        Ok(count as u64)
    }
}

/// Escapes a key into a file-name-safe component
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`, which keeps distinct keys on distinct files.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_encode_component_escapes_separators() {
        assert_eq!(encode_component("teams_39_2025"), "teams_39_2025");
        assert_eq!(encode_component("football-api:all"), "football-api%3Aall");
        assert_eq!(encode_component("a/b"), "a%2Fb");
        assert_ne!(encode_component("a:b"), encode_component("a_b"));
    }

    #[tokio::test]
    async fn test_put_creates_file_in_collection_directory() {
        let (store, temp_dir) = create_test_store();
        let record = Record::new("football-api:league_39", json!({"id": 39}), Utc::now());

        store.put("api_cache", record).await.expect("Put should succeed");

        let expected = temp_dir
            .path()
            .join("api_cache")
            .join("football-api%3Aleague_39.json");
        assert!(expected.exists(), "Record file should exist");
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        let result = store.get("api_cache", "nonexistent").await.expect("Get should succeed");

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_records_survive_a_new_store_instance() {
        let (store, temp_dir) = create_test_store();
        let expires_at = Utc::now() + Duration::hours(1);
        let record = Record::new("k", json!({"name": "persisted"}), expires_at);

        store.put("api_cache", record.clone()).await.unwrap();

        let reopened = FileStore::with_dir(temp_dir.path().to_path_buf());
        let fetched = reopened.get("api_cache", "k").await.unwrap();
        assert_eq!(fetched, Some(record));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported_on_get_and_skipped_on_scan() {
        let (store, temp_dir) = create_test_store();
        store
            .put("c", Record::new("good", json!(1), Utc::now()))
            .await
            .unwrap();
        std::fs::write(temp_dir.path().join("c").join("bad.json"), "{ not json")
            .expect("Should write corrupt file");

        let err = store.get("c", "bad").await.expect_err("Corrupt record should error");
        assert!(matches!(err, StoreError::Corrupt { .. }));

        assert_eq!(store.count("c", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prefix_and_expiry_scans() {
        let (store, _temp_dir) = create_test_store();
        let now = Utc::now();

        store.put("c", Record::new("p:1", json!(1), now - Duration::seconds(1))).await.unwrap();
        store.put("c", Record::new("p:2", json!(2), now + Duration::hours(1))).await.unwrap();
        store.put("c", Record::new("q:1", json!(3), now - Duration::seconds(1))).await.unwrap();

        assert_eq!(store.keys_with_prefix("c", "p:").await.unwrap(), vec!["p:1", "p:2"]);
        assert_eq!(store.expired_keys("c", now, 10).await.unwrap().len(), 2);
        assert_eq!(store.count("c", Some(now)).await.unwrap(), 2);
        assert_eq!(store.active_records("c", now).await.unwrap().len(), 1);

        assert_eq!(store.delete_many("c", &["p:1".to_string(), "q:1".to_string()]).await.unwrap(), 2);
        assert_eq!(store.count("c", None).await.unwrap(), 1);
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.root.to_string_lossy();
            assert!(path_str.contains("matchday"), "Store path should contain project name");
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_to_one_key_all_succeed() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(FileStore::with_dir(temp_dir.path().to_path_buf()));
        let expires_at = Utc::now() + Duration::minutes(1);

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .put("rate_limits", Record::new("same", json!({ "count": i }), expires_at))
                        .await
                })
            })
            .collect();

        let failures = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|result| !matches!(result, Ok(Ok(()))))
            .count();
        assert_eq!(failures, 0);

        let stored = store
            .get("rate_limits", "same")
            .await
            .expect("Get should succeed")
            .expect("One write should have won");
        assert!(stored.body["count"].is_u64());
        assert_eq!(store.count("rate_limits", None).await.unwrap(), 1);

        // No temp files are left behind
        let leftovers = std::fs::read_dir(store.collection_dir("rate_limits"))
            .expect("collection directory exists")
            .count();
        assert_eq!(leftovers, 1);
    }
}
