//! Error types for the platform-access crate.
//!
//! - `AuthenticationError`: an identity provider response could not be
//!   turned into a portal identity
//! - `AuthInitFailure`: why session initialization ended in the error state

use std::fmt;

/// Errors from turning identity provider output into a portal identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The token could not be decoded.
    InvalidToken { reason: String },
    /// A claim the portal depends on is absent.
    MissingClaim { claim: String },
    /// None of the user's roles are recognized and no default role is set.
    NoRecognizedRole { subject: String },
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken { reason } => write!(f, "invalid token: {reason}"),
            Self::MissingClaim { claim } => write!(f, "missing required claim: {claim}"),
            Self::NoRecognizedRole { subject } => {
                write!(f, "no recognized portal role for subject: {subject}")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Why the identity check or login callback failed irrecoverably.
///
/// This is the payload of the session error state. It is shown to the user
/// through [`AuthInitFailure::user_message`], never as raw error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthInitFailure {
    /// The identity provider could not be reached.
    ProviderUnreachable { reason: String },
    /// The identity provider answered with something unusable.
    MalformedResponse { reason: String },
    /// The login callback was rejected (bad state, denied code, no role).
    Rejected { reason: String },
    /// The identity check did not finish within the configured timeout.
    TimedOut { after_secs: u64 },
}

impl AuthInitFailure {
    /// Plain-language message suitable for an error panel.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ProviderUnreachable { .. } | Self::TimedOut { .. } => {
                "We could not reach the sign-in service. Please try again in a moment."
            }
            Self::MalformedResponse { .. } => {
                "The sign-in service returned an unexpected response. Please try again or contact support."
            }
            Self::Rejected { .. } => {
                "We could not sign you in with this account. Please contact support if this persists."
            }
        }
    }
}

impl fmt::Display for AuthInitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnreachable { reason } => {
                write!(f, "identity provider unreachable: {reason}")
            }
            Self::MalformedResponse { reason } => {
                write!(f, "malformed identity provider response: {reason}")
            }
            Self::Rejected { reason } => write!(f, "sign-in rejected: {reason}"),
            Self::TimedOut { after_secs } => {
                write!(f, "identity check timed out after {after_secs}s")
            }
        }
    }
}

impl std::error::Error for AuthInitFailure {}

impl From<AuthenticationError> for AuthInitFailure {
    fn from(err: AuthenticationError) -> Self {
        match err {
            AuthenticationError::NoRecognizedRole { .. } => Self::Rejected {
                reason: err.to_string(),
            },
            AuthenticationError::InvalidToken { .. } | AuthenticationError::MissingClaim { .. } => {
                Self::MalformedResponse {
                    reason: err.to_string(),
                }
            }
        }
    }
}
