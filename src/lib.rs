//! matchday library
//!
//! Football data over HTTP behind an expiring cache and a fixed-window rate
//! limiter. The CLI binary is a thin layer over these modules.

pub mod api;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod janitor;
pub mod keyed_lock;
pub mod rate_limit;
pub mod store;

pub use api::{ApiError, ClientConfig, FootballClient};
pub use cache::CacheManager;
pub use rate_limit::{Identity, RateLimitConfig, RateLimiter};
