//! Error types for the API crate.
//!
//! - `TransportError`: the HTTP exchange itself did not complete
//! - `ApiError`: client construction failed

use std::fmt;

/// Errors from sending a request over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within its timeout.
    Timeout,
    /// The backend could not be reached.
    ConnectionFailed { reason: String },
    /// The request could not be built.
    InvalidRequest { reason: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::ConnectionFailed { reason } => write!(f, "connection failed: {reason}"),
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors from setting up the API client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The base URL is not an absolute URL.
    InvalidBaseUrl { url: String, reason: String },
    /// The HTTP client could not be built.
    ClientBuild { reason: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl { url, reason } => {
                write!(f, "invalid API base URL '{url}': {reason}")
            }
            Self::ClientBuild { reason } => write!(f, "failed to build HTTP client: {reason}"),
        }
    }
}

impl std::error::Error for ApiError {}
