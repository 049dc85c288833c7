//! Retry with exponential backoff for upstream calls
//!
//! One logical request runs `ATTEMPT(1)`, `ATTEMPT(2)`, ... until it succeeds,
//! fails with a non-retryable error, or runs out of retries. The delay after
//! attempt `n` is `2^(n-1) * base_delay`.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::error::ApiError;

/// How often and how patiently to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubles each time
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after `attempt` (1-based) failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Progress of one logical request
#[derive(Debug)]
pub struct RetryContext {
    /// Attempt currently running, starting at 1
    pub attempt: u32,
    /// Attempts allowed in total
    pub max_attempts: u32,
    /// Error of the previous attempt, if any
    pub last_error: Option<ApiError>,
}

impl RetryContext {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            max_attempts: policy.max_attempts(),
            last_error: None,
        }
    }

    fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Remembers the failure of the current attempt and moves to the next
    pub fn record(&mut self, err: ApiError) {
        self.last_error = Some(err);
        self.attempt += 1;
    }

    /// Message of the previous failed attempt
    pub fn previous_failure(&self) -> Option<String> {
        self.last_error.as_ref().map(ToString::to_string)
    }
}

/// Runs `operation` under `policy`
///
/// `operation` receives the 1-based attempt number. Errors for which
/// [`ApiError::is_retryable`] holds are retried while attempts remain; any
/// other error ends the request immediately.
pub async fn with_retry<T, F, Fut>(
    endpoint: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut ctx = RetryContext::new(policy);

    loop {
        match operation(ctx.attempt).await {
            Ok(value) => {
                if ctx.attempt > 1 {
                    info!(endpoint, attempts = ctx.attempt, "Football API request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && ctx.can_retry() => {
                let delay = policy.delay_for(ctx.attempt);
                warn!(
                    endpoint,
                    attempt = ctx.attempt,
                    max_attempts = ctx.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying Football API request"
                );
                ctx.record(err);
                sleep(delay).await;
            }
            Err(err) => {
                if let Some(previous) = ctx.previous_failure() {
                    warn!(
                        endpoint,
                        attempts = ctx.attempt,
                        previous_error = %previous,
                        error = %err,
                        "Giving up on Football API request"
                    );
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn server_error(attempts: u32) -> ApiError {
        ApiError::Server {
            endpoint: "/standings".to_string(),
            status: 503,
            attempts,
            message: None,
        }
    }

    #[test]
    fn test_default_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_context_keeps_previous_failure() {
        let mut ctx = RetryContext::new(&fast());
        assert_eq!(ctx.previous_failure(), None);

        ctx.record(server_error(1));
        assert_eq!(ctx.attempt, 2);
        assert!(ctx.can_retry());
        assert_eq!(
            ctx.previous_failure().as_deref(),
            Some("Football API server error on /standings (HTTP 503) after 1 attempt(s)")
        );

        ctx.record(server_error(2));
        ctx.record(server_error(3));
        assert_eq!(ctx.attempt, 4);
        assert!(!ctx.can_retry());
        assert!(ctx.previous_failure().unwrap().contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_delay_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for(u32::MAX) >= policy.delay_for(31));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = with_retry("/standings", &fast(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(server_error(attempt))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = with_retry("/standings", &fast(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(server_error(attempt)) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Server { attempts: 4, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = with_retry("/standings", &fast(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ApiError::RateLimited {
                    endpoint: "/standings".to_string(),
                    status: 429,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ApiError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_policy_runs_once() {
        let calls = AtomicU32::new(0);

        let _ = with_retry("/status", &RetryPolicy::none(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(server_error(attempt)) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
