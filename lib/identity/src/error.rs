//! Error types for the identity crate.
//!
//! - `IdentityError`: a call to the identity provider failed
//! - `RefreshError`: a token refresh failed; shared by every caller that
//!   awaited the same refresh, hence `Clone`

use carebridge_platform_access::AuthInitFailure;
use std::fmt;

/// Errors from identity provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Provider configuration is invalid.
    Configuration { reason: String },
    /// The provider could not be reached or did not answer in time.
    Unreachable { reason: String },
    /// The provider refused the grant (expired or revoked token, bad code).
    Rejected { reason: String },
    /// The provider answered with something unusable.
    MalformedResponse { reason: String },
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => {
                write!(f, "identity provider configuration error: {reason}")
            }
            Self::Unreachable { reason } => write!(f, "identity provider unreachable: {reason}"),
            Self::Rejected { reason } => write!(f, "identity provider rejected grant: {reason}"),
            Self::MalformedResponse { reason } => {
                write!(f, "malformed identity provider response: {reason}")
            }
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<IdentityError> for AuthInitFailure {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unreachable { reason } => Self::ProviderUnreachable { reason },
            IdentityError::Rejected { reason } => Self::Rejected { reason },
            IdentityError::Configuration { reason }
            | IdentityError::MalformedResponse { reason } => Self::MalformedResponse { reason },
        }
    }
}

/// Errors from refreshing the access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The refresh token is expired, revoked or missing. Terminal for the
    /// session and never retried.
    RefreshFailure { reason: String },
    /// The exchange did not complete; the session survives.
    Unavailable { reason: String },
}

impl RefreshError {
    /// Returns true if the session cannot continue.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RefreshFailure { .. })
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefreshFailure { reason } => write!(f, "token refresh failed: {reason}"),
            Self::Unavailable { reason } => write!(f, "token refresh unavailable: {reason}"),
        }
    }
}

impl std::error::Error for RefreshError {}

impl From<IdentityError> for RefreshError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected { reason } => Self::RefreshFailure { reason },
            other => Self::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}
