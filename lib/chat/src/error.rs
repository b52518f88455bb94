//! Error types for the chat crate.

use std::fmt;

/// Errors from relaying a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The relay is misconfigured.
    Configuration { reason: String },
    /// The webhook could not be reached or timed out.
    Unavailable { reason: String },
    /// The webhook answered with a non-success status.
    Rejected { status: u16 },
    /// The webhook answer had neither `response` nor `message`.
    MalformedReply { reason: String },
    /// The message was empty.
    EmptyMessage,
}

impl ChatError {
    /// Plain-language text for a `chat:error` event.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "Please type a message first.",
            Self::Configuration { .. } | Self::Unavailable { .. } | Self::Rejected { .. } => {
                "The care assistant is unavailable right now. Please try again shortly."
            }
            Self::MalformedReply { .. } => {
                "The care assistant sent a reply we could not read. Please try again."
            }
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => write!(f, "chat relay configuration error: {reason}"),
            Self::Unavailable { reason } => write!(f, "chat webhook unavailable: {reason}"),
            Self::Rejected { status } => write!(f, "chat webhook returned status {status}"),
            Self::MalformedReply { reason } => write!(f, "malformed chat webhook reply: {reason}"),
            Self::EmptyMessage => write!(f, "empty chat message"),
        }
    }
}

impl std::error::Error for ChatError {}
