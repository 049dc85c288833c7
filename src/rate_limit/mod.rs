//! Request-rate limiting for caller-facing operations
//!
//! A fixed-window counter keyed by operation name and caller identity, with a
//! set of named profiles for the kinds of operations the service exposes.

mod config;
mod limiter;

pub use config::{Identity, RateLimitConfig, ANONYMOUS};
pub use limiter::{
    window_key, EndpointCount, RateLimitError, RateLimitResult, RateLimitStats, RateLimiter,
    RateWindow,
};
