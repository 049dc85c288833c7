//! Rate limit profiles and caller identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token used when a caller has neither an id nor an address
pub const ANONYMOUS: &str = "anonymous";

/// Window length and request ceiling for one kind of operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Length of the window in milliseconds
    pub window_ms: u64,
    /// Requests allowed inside one window
    pub max_requests: u32,
}

impl RateLimitConfig {
    /// General API traffic: 60 requests per minute
    pub const API_GENERAL: Self = Self::new(60 * 1000, 60);

    /// Expensive API operations: 10 requests per minute
    pub const API_INTENSIVE: Self = Self::new(60 * 1000, 10);

    /// Favorite toggling: 20 requests per minute
    pub const USER_FAVORITES: Self = Self::new(60 * 1000, 20);

    /// Profile updates: 5 requests per minute
    pub const USER_PROFILE_UPDATE: Self = Self::new(60 * 1000, 5);

    /// Login attempts: 5 per 15 minutes
    pub const AUTH_LOGIN: Self = Self::new(15 * 60 * 1000, 5);

    /// Sign-ups: 3 per hour
    pub const AUTH_SIGNUP: Self = Self::new(60 * 60 * 1000, 3);

    /// Administrative writes: 30 per minute
    pub const ADMIN_DATA_MODIFICATION: Self = Self::new(60 * 1000, 30);

    /// Creates a custom profile
    pub const fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    /// Window length as a chrono duration
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.window_ms.min(i64::MAX as u64) as i64)
    }

    /// End of a window opened at `start`, saturating at the latest representable instant
    pub fn window_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_signed(self.window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Oldest window start still counted at `now`, saturating at the earliest instant
    pub fn window_floor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Who is making a request
///
/// Rate windows are keyed by the most specific identifier available: the
/// caller id, then the network address, then [`ANONYMOUS`]. A caller that
/// groups requests its own way sets `key` and the window uses it verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Stable id of an authenticated caller
    pub user_id: Option<String>,
    /// Network-address-like identifier (e.g., client IP)
    pub address: Option<String>,
    /// Full window key replacing `endpoint:identity`
    pub key: Option<String>,
}

impl Identity {
    /// Identity of an authenticated caller
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Identity of an unauthenticated caller seen at `address`
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    /// Identity with no identifying information
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds an identity from whatever the caller could provide
    pub fn from_parts(user_id: Option<String>, address: Option<String>) -> Self {
        Self {
            user_id,
            address,
            key: None,
        }
    }

    /// Uses `key` as the whole window key, e.g. to share one window across
    /// endpoints or to group callers by tenant
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The identifier used in rate window keys
    pub fn resolve(&self) -> &str {
        self.user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.address.as_deref().filter(|addr| !addr.is_empty()))
            .unwrap_or(ANONYMOUS)
    }
}
