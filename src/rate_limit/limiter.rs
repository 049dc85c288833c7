//! Fixed-window request counter
//!
//! Each `(endpoint, identity)` pair owns one window. The first request opens
//! it; later requests inside it increment the count (even past the ceiling,
//! so `total_requests` reflects every attempt); the first request after it
//! ages out opens a fresh one. If the store fails, the limiter fails open.
//!
//! Check-then-increment is serialized per key inside this process. Several
//! processes sharing one store can still interleave, so across processes the
//! ceiling is a soft bound.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::config::{Identity, RateLimitConfig};
use crate::clock::{Clock, SystemClock};
use crate::keyed_lock::KeyedLocks;
use crate::store::{Record, RecordStore, StoreError, RATE_LIMIT_COLLECTION};

/// Number of windows listed in [`RateLimitStats::top_endpoints_by_count`]
const TOP_ENDPOINTS: usize = 10;

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window closes
    pub reset_time: DateTime<Utc>,
    /// Requests seen in the current window, including this one
    pub total_requests: u32,
}

/// One window as persisted in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Composite `endpoint:identity` key
    pub key: String,
    /// Operation the window guards
    pub endpoint: String,
    /// Resolved caller identifier
    pub identity: String,
    /// Requests counted in this window
    pub count: u32,
    /// When the window opened
    pub window_start: DateTime<Utc>,
    /// When the window closes
    pub window_expires_at: DateTime<Utc>,
}

/// Active window with its request count, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub identity: String,
    pub count: u32,
}

/// Diagnostic view over all stored windows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    /// Windows stored, expired or not
    pub total_windows: u64,
    /// Windows that have not closed yet
    pub active_windows: u64,
    /// Busiest active windows, highest count first
    pub top_endpoints_by_count: Vec<EndpointCount>,
}

/// Rejection surfaced to callers of [`RateLimiter::enforce`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitError {
    /// The caller used up the window
    #[error("Too many requests to '{endpoint}', try again after {reset_time}")]
    TooManyRequests {
        endpoint: String,
        reset_time: DateTime<Utc>,
        retry_after: std::time::Duration,
    },
}

/// Counts requests per endpoint and caller in fixed windows
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

/// Composite key of a window
///
/// `endpoint:identity`, unless the identity carries its own key.
pub fn window_key(endpoint: &str, identity: &Identity) -> String {
    match identity.key.as_deref().filter(|key| !key.is_empty()) {
        Some(key) => key.to_string(),
        None => format!("{}:{}", endpoint, identity.resolve()),
    }
}

impl RateLimiter {
    /// Creates a limiter over `store` using the system clock
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Creates a limiter with a custom clock
    pub fn with_clock(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Counts one request and decides whether it may proceed
    ///
    /// # Arguments
    /// * `endpoint` - Name of the guarded operation
    /// * `config` - Window length and ceiling for the operation
    /// * `identity` - Who is calling
    ///
    /// # Returns
    /// The decision with remaining quota and reset time. Never fails: a store
    /// error yields an allowed result with a full quota.
    pub async fn check_limit(
        &self,
        endpoint: &str,
        config: &RateLimitConfig,
        identity: &Identity,
    ) -> RateLimitResult {
        let key = window_key(endpoint, identity);
        let _guard = self.locks.lock(&key).await;

        match self.count_request(&key, endpoint, config, identity).await {
            Ok(window) => {
                let allowed = window.count <= config.max_requests;
                if !allowed {
                    warn!(
                        endpoint,
                        identity = identity.resolve(),
                        count = window.count,
                        max_requests = config.max_requests,
                        "Rate limit exceeded"
                    );
                }
                RateLimitResult {
                    allowed,
                    remaining: config.max_requests.saturating_sub(window.count),
                    reset_time: window.window_expires_at,
                    total_requests: window.count,
                }
            }
            Err(e) => {
                error!(endpoint, error = %e, "Failed to check rate limit, allowing request");
                RateLimitResult {
                    allowed: true,
                    remaining: config.max_requests,
                    reset_time: config.window_end(self.clock.now()),
                    total_requests: 0,
                }
            }
        }
    }

    /// Like [`RateLimiter::check_limit`], but turns a denial into an error
    ///
    /// Convenient for caller-facing operations that must reject with a
    /// "too many requests" outcome.
    pub async fn enforce(
        &self,
        endpoint: &str,
        config: &RateLimitConfig,
        identity: &Identity,
    ) -> Result<RateLimitResult, RateLimitError> {
        let result = self.check_limit(endpoint, config, identity).await;
        if result.allowed {
            return Ok(result);
        }

        let retry_after = (result.reset_time - self.clock.now())
            .to_std()
            .unwrap_or_default();
        Err(RateLimitError::TooManyRequests {
            endpoint: endpoint.to_string(),
            reset_time: result.reset_time,
            retry_after,
        })
    }

    /// Forgets the window of one caller, e.g. for an administrative override
    pub async fn reset_limit(&self, endpoint: &str, identity: &Identity) {
        let key = window_key(endpoint, identity);
        let _guard = self.locks.lock(&key).await;

        match self.store.delete(RATE_LIMIT_COLLECTION, &key).await {
            Ok(_) => info!(endpoint, identity = identity.resolve(), "Rate limit reset"),
            Err(e) => error!(endpoint, error = %e, "Failed to reset rate limit"),
        }
    }

    /// Reads the current window of one caller without counting a request
    pub async fn window(&self, endpoint: &str, identity: &Identity) -> Option<RateWindow> {
        let key = window_key(endpoint, identity);
        match self.load_window(&key).await {
            Ok(window) => window,
            Err(e) => {
                error!(endpoint, error = %e, "Failed to read rate limit window");
                None
            }
        }
    }

    /// Removes up to `batch_size` windows that closed before now
    pub async fn sweep_expired(&self, batch_size: usize) -> usize {
        match self.try_sweep_expired(batch_size).await {
            Ok(0) => 0,
            Ok(count) => {
                info!(count, "Cleaned up expired rate limit records");
                count
            }
            Err(e) => {
                error!(error = %e, "Failed to clean up expired rate limits");
                0
            }
        }
    }

    /// Counts stored and active windows and lists the busiest ones
    pub async fn stats(&self) -> RateLimitStats {
        match self.try_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Failed to get rate limit stats");
                RateLimitStats::default()
            }
        }
    }

    async fn count_request(
        &self,
        key: &str,
        endpoint: &str,
        config: &RateLimitConfig,
        identity: &Identity,
    ) -> Result<RateWindow, StoreError> {
        let now = self.clock.now();
        let window_floor = config.window_floor(now);

        let window = match self.load_window(key).await? {
            Some(mut window) if window.window_start >= window_floor => {
                window.count = window.count.saturating_add(1);
                window
            }
            previous => {
                if previous.is_some() {
                    debug!(key, "Rate window aged out, starting a new one");
                }
                RateWindow {
                    key: key.to_string(),
                    endpoint: endpoint.to_string(),
                    identity: identity.resolve().to_string(),
                    count: 1,
                    window_start: now,
                    window_expires_at: config.window_end(now),
                }
            }
        };

        let body = serde_json::to_value(&window)?;
        self.store
            .put(
                RATE_LIMIT_COLLECTION,
                Record::new(key, body, window.window_expires_at),
            )
            .await?;
        Ok(window)
    }

    async fn load_window(&self, key: &str) -> Result<Option<RateWindow>, StoreError> {
        let Some(record) = self.store.get(RATE_LIMIT_COLLECTION, key).await? else {
            return Ok(None);
        };

        match serde_json::from_value(record.body) {
            Ok(window) => Ok(Some(window)),
            Err(e) => {
                // An unreadable window is replaced by a fresh one
                warn!(key, error = %e, "Discarding malformed rate window");
                Ok(None)
            }
        }
    }

    async fn try_sweep_expired(&self, batch_size: usize) -> Result<usize, StoreError> {
        let keys = self
            .store
            .expired_keys(RATE_LIMIT_COLLECTION, self.clock.now(), batch_size)
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.delete_many(RATE_LIMIT_COLLECTION, &keys).await
    }

    async fn try_stats(&self) -> Result<RateLimitStats, StoreError> {
        let now = self.clock.now();
        let (total, active) = futures::future::join(
            self.store.count(RATE_LIMIT_COLLECTION, None),
            self.store.active_records(RATE_LIMIT_COLLECTION, now),
        )
        .await;
        let (total, active) = (total?, active?);

        let mut windows: Vec<RateWindow> = active
            .iter()
            .filter_map(|record| serde_json::from_value(record.body.clone()).ok())
            .collect();
        windows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));

        Ok(RateLimitStats {
            total_windows: total,
            active_windows: active.len() as u64,
            top_endpoints_by_count: windows
                .into_iter()
                .take(TOP_ENDPOINTS)
                .map(|window| EndpointCount {
                    endpoint: window.endpoint,
                    identity: window.identity,
                    count: window.count,
                })
                .collect(),
        })
    }
}
