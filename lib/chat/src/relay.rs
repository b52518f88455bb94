//! Relays to the chat backend.

use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::ChatError;
use crate::event::ChatMessage;

/// Something that answers chat messages.
#[async_trait]
pub trait ChatRelay: Send + Sync {
    /// Returns the reply text for `message`.
    async fn relay(&self, message: &ChatMessage) -> Result<String, ChatError>;
}

#[derive(Deserialize)]
struct WebhookReply {
    response: Option<String>,
    message: Option<String>,
}

/// Relay posting to a workflow-automation webhook.
///
/// Sends `{message, sessionId, timestamp}` and reads the reply from the
/// `response` field, or `message` if that is absent.
#[derive(Clone)]
pub struct WebhookRelay {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookRelay {
    /// Creates a relay for `url`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, Report<ChatError>> {
        let url = reqwest::Url::parse(url).map_err(|e| ChatError::Configuration {
            reason: format!("invalid webhook URL: {e}"),
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Configuration {
                reason: format!("HTTP client error: {e}"),
            })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ChatRelay for WebhookRelay {
    #[instrument(skip_all, fields(session_id = %message.session_id))]
    async fn relay(&self, message: &ChatMessage) -> Result<String, ChatError> {
        let payload = json!({
            "message": message.text,
            "sessionId": message.session_id,
            "timestamp": message.timestamp,
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChatError::Unavailable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| ChatError::Unavailable {
            reason: e.to_string(),
        })?;
        debug!(bytes = body.len(), "webhook replied");
        parse_reply(&body)
    }
}

fn parse_reply(body: &[u8]) -> Result<String, ChatError> {
    let reply: WebhookReply =
        serde_json::from_slice(body).map_err(|e| ChatError::MalformedReply {
            reason: e.to_string(),
        })?;
    reply
        .response
        .or(reply.message)
        .ok_or_else(|| ChatError::MalformedReply {
            reason: "reply has neither response nor message".to_string(),
        })
}
