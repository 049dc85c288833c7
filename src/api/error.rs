//! Error taxonomy of the football API client

use std::sync::Arc;
use thiserror::Error;

use super::transport::TransportError;

/// Errors that can occur when fetching football data
///
/// Every variant carries the upstream path it concerns; variants produced
/// from an HTTP response also carry the status. Cloneable so one failed
/// request can be reported to every caller that waited on it.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Upstream answered 429; never retried here so the caller can back off
    #[error("Football API rate limit exceeded on {endpoint}")]
    RateLimited { endpoint: String, status: u16 },

    /// Upstream answered 5xx on every attempt
    #[error("Football API server error on {endpoint} (HTTP {status}) after {attempts} attempt(s)")]
    Server {
        endpoint: String,
        status: u16,
        attempts: u32,
        message: Option<String>,
    },

    /// Upstream answered with a non-retryable failure status
    #[error("Football API request to {endpoint} failed with HTTP {status}")]
    Upstream {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },

    /// No HTTP response was obtained on any attempt
    #[error("Football API request to {endpoint} failed after {attempts} attempt(s): {source}")]
    Transport {
        endpoint: String,
        attempts: u32,
        #[source]
        source: Arc<TransportError>,
    },

    /// A successful response listed errors in its envelope
    #[error("Football API errors on {endpoint}: {}", .errors.join("; "))]
    Data {
        endpoint: String,
        status: u16,
        errors: Vec<String>,
    },

    /// The response body is not the expected JSON
    #[error("Failed to parse Football API response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        status: u16,
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl ApiError {
    /// Upstream path the failed request targeted
    pub fn endpoint(&self) -> &str {
        match self {
            ApiError::RateLimited { endpoint, .. }
            | ApiError::Server { endpoint, .. }
            | ApiError::Upstream { endpoint, .. }
            | ApiError::Transport { endpoint, .. }
            | ApiError::Data { endpoint, .. }
            | ApiError::Decode { endpoint, .. } => endpoint,
        }
    }

    /// HTTP status of the failed response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited { status, .. }
            | ApiError::Server { status, .. }
            | ApiError::Upstream { status, .. }
            | ApiError::Data { status, .. }
            | ApiError::Decode { status, .. } => Some(*status),
            ApiError::Transport { .. } => None,
        }
    }

    /// Whether another attempt could succeed (network failure or 5xx)
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Server { .. } | ApiError::Transport { .. })
    }
}
