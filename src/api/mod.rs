//! Resilient client for the football data API

mod client;
mod config;
mod error;
mod retry;
mod transport;
mod types;

pub use client::{CacheSettings, FootballClient, TEAMS_PER_LEAGUE};
pub use config::{
    ClientConfig, ConfigError, API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL,
    DEFAULT_CACHE_NAMESPACE, DEFAULT_TIMEOUT, TIMEOUT_ENV,
};
pub use error::ApiError;
pub use retry::{with_retry, RetryContext, RetryPolicy};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};
pub use types::{ApiStatus, Envelope, Paging, RequestQuota, Resource, ResourceRequest};
