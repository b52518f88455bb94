//! Backend proxy for the area pages.
//!
//! `/{area}/api/{*path}` forwards the method, query and JSON body to the
//! backend through the caller's own [`ApiClient`](carebridge_api::ApiClient)
//! and answers with the normalized envelope. Paths that would leave the
//! configured API base are refused by the client before anything is sent.

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path, Query},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use carebridge_api::{ApiFailure, ApiResult, RequestConfig, to_envelope};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::session::ClientSession;

/// Forwards one request to the backend.
pub async fn forward(
    Extension(client): Extension<Arc<ClientSession>>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(failure) => return envelope(&Err(failure)),
    };

    let config = query
        .into_iter()
        .fold(RequestConfig::default(), |config, (k, v)| config.with_query(k, v));

    let result = client
        .api
        .request::<JsonValue>(method, &path, body, &config)
        .await;
    envelope(&result)
}

fn parse_body(body: &[u8]) -> Result<Option<JsonValue>, ApiFailure> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(|e| {
        ApiFailure::new("The request body is not valid JSON.", 400)
            .with_details(JsonValue::String(e.to_string()))
    })
}

fn envelope(result: &ApiResult<JsonValue>) -> Response {
    let status = match result {
        Ok(response) => response.status,
        Err(failure) => failure.status,
    };
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(to_envelope(result))).into_response()
}
