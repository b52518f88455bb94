//! Turns relay exchanges into chat events.

use carebridge_core::ChatSessionId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::ChatError;
use crate::event::{ChatEvent, ChatMessage};
use crate::relay::ChatRelay;

/// Bridges the portal's chat channel to a [`ChatRelay`].
#[derive(Clone)]
pub struct ChatBridge {
    relay: Arc<dyn ChatRelay>,
}

impl ChatBridge {
    #[must_use]
    pub fn new(relay: Arc<dyn ChatRelay>) -> Self {
        Self { relay }
    }

    /// Relays one message, emitting events to `events` in order.
    ///
    /// The sequence is always `chat:typing` on, then exactly one
    /// `chat:response` or `chat:error`, then `chat:typing` off. Sending stops
    /// quietly if the receiver has gone away.
    pub async fn handle(&self, message: ChatMessage, events: mpsc::Sender<ChatEvent>) {
        if events.send(ChatEvent::Typing { is_typing: true }).await.is_err() {
            return;
        }

        let outcome = if message.text.trim().is_empty() {
            Err(ChatError::EmptyMessage)
        } else {
            self.relay.relay(&message).await
        };

        let event = match outcome {
            Ok(text) => {
                info!(session_id = %message.session_id, "chat reply relayed");
                ChatEvent::Response {
                    text,
                    session_id: message.session_id,
                }
            }
            Err(err) => {
                warn!(session_id = %message.session_id, error = %err, "chat relay failed");
                ChatEvent::Error {
                    message: err.user_message().to_string(),
                }
            }
        };

        if events.send(event).await.is_err() {
            return;
        }
        let _ = events.send(ChatEvent::Typing { is_typing: false }).await;
    }

    /// Relays `text` and collects the resulting events.
    ///
    /// Starts a new conversation when `session_id` is `None`.
    pub async fn converse(&self, text: &str, session_id: Option<ChatSessionId>) -> Vec<ChatEvent> {
        let message = ChatMessage::new(text, session_id.unwrap_or_default());
        let (tx, mut rx) = mpsc::channel(4);
        let bridge = self.clone();
        let task = tokio::spawn(async move { bridge.handle(message, tx).await });

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        if let Err(err) = task.await {
            warn!(error = %err, "chat task did not finish");
        }
        events
    }
}
