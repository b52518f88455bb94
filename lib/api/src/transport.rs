//! The HTTP transport seam.

use async_trait::async_trait;
use reqwest::Method;
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::{ApiError, TransportError};

/// An outbound request, fully resolved.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<JsonValue>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Returns the value of `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `name`, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
    }
}

/// A response as received.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends requests to the backend.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and returns whatever response came back.
    ///
    /// Non-2xx statuses are responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport.
    ///
    /// # Errors
    ///
    /// Returns `ClientBuild` if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, Report<ApiError>> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::ClientBuild {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_builder() {
        TransportError::InvalidRequest {
            reason: err.to_string(),
        }
    } else {
        TransportError::ConnectionFailed {
            reason: err.to_string(),
        }
    }
}
