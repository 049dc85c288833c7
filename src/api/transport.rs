//! HTTP transport underneath the football API client
//!
//! The client only needs "GET this path with these query parameters and give
//! me the status and body", so that is all the `Transport` trait asks for.
//! `HttpTransport` is the reqwest implementation used in production.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::config::ClientConfig;

/// Header carrying the API key
const API_KEY_HEADER: &str = "x-apisports-key";

/// Errors raised before an HTTP status is available
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The request did not complete in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The API key cannot be sent as a header
    #[error("Invalid API key header value")]
    InvalidApiKey,

    /// Connection could not be established
    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Status and body of one HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl RawResponse {
    /// Creates a response from its parts
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests against the upstream API
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs `GET <base><path>?<query>`
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport with a fixed timeout and the API key header
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Builds a transport from client configuration
    ///
    /// # Returns
    /// * `Ok(HttpTransport)` - Ready to issue requests
    /// * `Err(TransportError)` - If the API key is not a valid header value or
    ///   the HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let mut key =
                HeaderValue::from_str(&config.api_key).map_err(|_| TransportError::InvalidApiKey)?;
            key.set_sensitive(true);
            headers.insert(API_KEY_HEADER, key);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, ?query, "Football API request");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        debug!(%url, status, "Football API response");

        Ok(RawResponse { status, body })
    }
}

impl HttpTransport {
    fn classify(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if error.is_connect() {
            TransportError::Connection(error.to_string())
        } else {
            TransportError::RequestFailed(error)
        }
    }
}
