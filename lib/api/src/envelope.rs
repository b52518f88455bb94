//! Normalized API results.
//!
//! Every call ends in either an [`ApiResponse`] or an [`ApiFailure`]; callers
//! branch on which one they got rather than on raw status codes. Serialized,
//! the two take the JSON shapes `{data, status, message}` and
//! `{error: {message, status, details}, status}`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::TransportError;

/// Result of an API call.
pub type ApiResult<T> = Result<ApiResponse<T>, ApiFailure>;

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A failed call, normalized to a message and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ApiFailure {
    /// Creates a failure with no details.
    #[must_use]
    pub fn new(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status,
            details: None,
        }
    }

    /// Attaches details.
    #[must_use]
    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns true for a 401.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Normalizes a non-2xx response.
    ///
    /// The message is taken from the body's `message`, `error.message` or
    /// `error` field, falling back to the status reason phrase.
    #[must_use]
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let parsed: Option<JsonValue> = serde_json::from_slice(body).ok();
        let message = parsed
            .as_ref()
            .and_then(message_from_body)
            .unwrap_or_else(|| reason_phrase(status).to_string());

        Self {
            message,
            status,
            details: parsed.filter(|v| !v.is_null()),
        }
    }

    /// Normalizes a failed exchange that produced no response.
    #[must_use]
    pub fn from_transport(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::new("The service took too long to respond.", 504),
            TransportError::ConnectionFailed { .. } => {
                Self::new("The service is currently unreachable.", 503)
            }
            TransportError::InvalidRequest { reason } => Self::new(reason.clone(), 400),
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API call failed with status {}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiFailure {}

/// Serializes a result into the envelope JSON shape.
#[must_use]
pub fn to_envelope<T: Serialize>(result: &ApiResult<T>) -> JsonValue {
    match result {
        Ok(response) => serde_json::to_value(response).unwrap_or(JsonValue::Null),
        Err(failure) => serde_json::json!({
            "error": failure,
            "status": failure.status,
        }),
    }
}

fn message_from_body(body: &JsonValue) -> Option<String> {
    let text = |v: &JsonValue| v.as_str().map(str::to_string);
    body.get("message")
        .and_then(text)
        .or_else(|| body.get("error").and_then(|e| e.get("message")).and_then(text))
        .or_else(|| body.get("error").and_then(text))
        .filter(|m| !m.trim().is_empty())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Authentication required",
        403 => "Access denied",
        404 => "Not found",
        409 => "Conflict",
        422 => "Invalid data",
        429 => "Too many requests",
        500..=599 => "The service encountered an error.",
        _ => "Request failed",
    }
}
