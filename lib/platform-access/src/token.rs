//! Bearer tokens and their expiry.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// An opaque bearer credential with a parsed expiry.
///
/// The secret is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Creates a token that expires at the given instant.
    #[must_use]
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Creates a token issued at `issued_at` and valid for `lifetime_secs`.
    #[must_use]
    pub fn with_lifetime(
        secret: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime_secs: i64,
    ) -> Self {
        Self::new(secret, issued_at + Duration::seconds(lifetime_secs))
    }

    /// Returns the bearer string.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Returns when the token stops being accepted.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whole seconds of lifetime left at `now`; negative once expired.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }

    /// Returns true if the token may still be sent at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.secret)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The credentials issued by one token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Access token attached to API requests.
    pub access: Token,
    /// Refresh token used for silent renewal, when the provider issued one.
    pub refresh_token: Option<String>,
    /// Raw ID token, kept for display claims and end-session hints.
    pub id_token: Option<String>,
}

impl TokenPair {
    /// Creates a pair from an access token and optional refresh token.
    #[must_use]
    pub fn new(access: Token, refresh_token: Option<String>) -> Self {
        Self {
            access,
            refresh_token,
            id_token: None,
        }
    }

    /// Attaches the raw ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: Option<String>) -> Self {
        self.id_token = id_token;
        self
    }

    /// Merges a refresh response into this pair.
    ///
    /// Providers may omit the refresh or ID token on renewal; the previous
    /// values are kept in that case.
    #[must_use]
    pub fn rotated(&self, renewed: TokenPair) -> Self {
        Self {
            access: renewed.access,
            refresh_token: renewed.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: renewed.id_token.or_else(|| self.id_token.clone()),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &self.access)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .finish()
    }
}
