//! Proactive refresh policy.

use carebridge_platform_access::Token;
use chrono::{DateTime, Utc};

/// Smallest safety margin applied before expiry, in seconds.
pub const MIN_MARGIN_SECS: u64 = 5;

/// Largest safety margin applied before expiry, in seconds.
pub const MAX_MARGIN_SECS: u64 = 30;

/// Decides whether a token should be refreshed before use.
///
/// The safety margin keeps a request from being sent with a token that
/// expires while the request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    margin_secs: u64,
}

impl RefreshPolicy {
    /// Creates a policy; the margin is clamped to 5..=30 seconds.
    #[must_use]
    pub fn new(margin_secs: u64) -> Self {
        Self {
            margin_secs: margin_secs.clamp(MIN_MARGIN_SECS, MAX_MARGIN_SECS),
        }
    }

    /// Returns the safety margin in seconds.
    #[must_use]
    pub fn margin_secs(&self) -> u64 {
        self.margin_secs
    }

    /// Returns true if `token` has less than `min_validity_secs` (and never
    /// less than the safety margin) of lifetime left at `now`.
    #[must_use]
    pub fn needs_refresh(&self, token: &Token, min_validity_secs: u64, now: DateTime<Utc>) -> bool {
        let threshold = i64::try_from(min_validity_secs.max(self.margin_secs)).unwrap_or(i64::MAX);
        token.remaining_secs(now) < threshold
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(MAX_MARGIN_SECS)
    }
}
