//! Chat wire events.

use carebridge_core::ChatSessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub session_id: ChatSessionId,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Creates a message stamped now.
    #[must_use]
    pub fn new(text: impl Into<String>, session_id: ChatSessionId) -> Self {
        Self {
            text: text.into(),
            session_id,
            timestamp: Utc::now(),
        }
    }
}

/// An event on the chat channel, tagged by its `type` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "chat:message", rename_all = "camelCase")]
    Message {
        text: String,
        session_id: ChatSessionId,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "chat:response", rename_all = "camelCase")]
    Response {
        text: String,
        session_id: ChatSessionId,
    },
    #[serde(rename = "chat:typing", rename_all = "camelCase")]
    Typing { is_typing: bool },
    #[serde(rename = "chat:error")]
    Error { message: String },
}

impl From<&ChatMessage> for ChatEvent {
    fn from(message: &ChatMessage) -> Self {
        Self::Message {
            text: message.text.clone(),
            session_id: message.session_id,
            timestamp: message.timestamp,
        }
    }
}
