//! Configuration for the football API client

use std::env;
use std::time::Duration;
use thiserror::Error;

use super::retry::RetryPolicy;

/// Production endpoint of the upstream API
pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";

/// Upper bound on one HTTP exchange
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Key prefix shared by every cached response of this client
pub const DEFAULT_CACHE_NAMESPACE: &str = "football-api";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "FOOTBALL_API_KEY";

/// Environment variable overriding the base URL
pub const BASE_URL_ENV: &str = "FOOTBALL_API_BASE_URL";

/// Environment variable overriding the request timeout, in seconds
pub const TIMEOUT_ENV: &str = "FOOTBALL_API_TIMEOUT_SECS";

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds an unusable value
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Settings for [`crate::api::FootballClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the upstream API, without trailing slash
    pub base_url: String,
    /// Key sent in the `x-apisports-key` header
    pub api_key: String,
    /// Timeout applied to every HTTP request
    pub timeout: Duration,
    /// Retry and backoff for transient failures
    pub retry: RetryPolicy,
    /// Whether responses are read from and written to the cache
    pub cache_enabled: bool,
    /// TTL in seconds applied to every resource instead of its own default
    pub cache_ttl_override: Option<u64>,
    /// Prefix of every cache key written by the client
    pub cache_namespace: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            cache_enabled: true,
            cache_ttl_override: None,
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Reads the API key, base URL and timeout from the environment
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(key) = env::var(API_KEY_ENV) {
            config.api_key = key;
        }
        if let Ok(url) = env::var(BASE_URL_ENV) {
            config.base_url = url;
        }
        if let Ok(raw) = env::var(TIMEOUT_ENV) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: TIMEOUT_ENV,
                    value: raw.clone(),
                })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Sets the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables caching, optionally forcing one TTL for all resources
    pub fn with_cache(mut self, enabled: bool, ttl_override: Option<u64>) -> Self {
        self.cache_enabled = enabled;
        self.cache_ttl_override = ttl_override;
        self
    }
}
