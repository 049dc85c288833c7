//! Per-key async locks
//!
//! Serializes work on the same key (a rate window, a cache miss) while letting
//! different keys proceed in parallel. Idle lock slots are dropped as soon as
//! the last holder releases them, so the table only grows with concurrency,
//! never with the number of distinct keys seen.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A table of async mutexes indexed by string key
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: DashMap<String, Arc<AsyncMutex<()>>>,
}

/// Guard for one key; releasing it frees the slot when nobody else waits
#[derive(Debug)]
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    /// Creates an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `key` is free and takes it
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let slot = Arc::clone(
            self.slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .value(),
        );

        let guard = slot.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or waited on
    pub fn active(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Only the table itself still references an idle slot
        self.owner
            .slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
