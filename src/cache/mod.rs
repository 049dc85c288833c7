//! Cache module for storing upstream API responses
//!
//! This module provides a cache manager that keeps API responses in a keyed
//! record store with per-entry TTL (time-to-live). Reads evict expired entries
//! lazily; a periodic sweep bounds storage growth but is not needed for
//! correctness.

mod manager;

pub use manager::{CacheManager, CacheStats, CachedData, DEFAULT_SWEEP_BATCH};
