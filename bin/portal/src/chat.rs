//! Care assistant chat endpoint.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use carebridge_chat::{ChatError, ChatEvent};
use carebridge_core::ChatSessionId;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::state::AppState;

/// A message posted from the chat panel.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub text: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Relays a message and returns the events of the exchange in order.
pub async fn send_message(
    State(app): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let Some(bridge) = &app.chat else {
        let event = ChatEvent::Error {
            message: ChatError::Configuration {
                reason: "no webhook configured".to_string(),
            }
            .user_message()
            .to_string(),
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "events": [event] })))
            .into_response();
    };

    let session_id = match request.session_id.as_deref().map(str::parse::<ChatSessionId>) {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(e)) => {
            debug!(error = %e, "rejected chat session id");
            let event = ChatEvent::Error {
                message: "This conversation could not be found. Please start a new one."
                    .to_string(),
            };
            return (StatusCode::BAD_REQUEST, Json(json!({ "events": [event] }))).into_response();
        }
    };

    let events = bridge.converse(&request.text, session_id).await;
    Json(json!({ "events": events })).into_response()
}
