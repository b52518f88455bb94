//! Backend REST client.

use carebridge_core::RequestId;
use reqwest::{Method, Url};
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::envelope::{ApiFailure, ApiResponse, ApiResult};
use crate::error::ApiError;
use crate::interceptor::AuthInterceptor;
use crate::transport::{HttpRequest, HttpTransport};

/// Shortest per-request timeout, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 10;

/// Longest per-request timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 30;

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl RequestConfig {
    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a header. `Authorization` is always overwritten by the interceptor.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overrides the client's timeout; clamped to 10..=30 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(clamp_timeout(timeout));
        self
    }
}

/// Clamps `timeout` to the supported bounds.
#[must_use]
pub fn clamp_timeout(timeout: Duration) -> Duration {
    Duration::from_secs(timeout.as_secs().clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS))
}

/// Authenticated client for the backend REST API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    interceptor: Arc<AuthInterceptor>,
    timeout: Duration,
}

impl ApiClient {
    /// Creates a client rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBaseUrl` if `base_url` is not an absolute URL.
    pub fn new(
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        interceptor: AuthInterceptor,
        timeout: Duration,
    ) -> Result<Self, Report<ApiError>> {
        // A trailing slash makes relative joins append instead of replace.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| ApiError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            base_url,
            transport,
            interceptor: Arc::new(interceptor),
            timeout: clamp_timeout(timeout),
        })
    }

    /// Returns a client for the same service that authenticates with
    /// `interceptor`.
    #[must_use]
    pub fn with_interceptor(&self, interceptor: AuthInterceptor) -> Self {
        Self {
            base_url: self.base_url.clone(),
            transport: Arc::clone(&self.transport),
            interceptor: Arc::new(interceptor),
            timeout: self.timeout,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, config: &RequestConfig) -> ApiResult<T> {
        self.request(Method::GET, path, None, config).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<JsonValue>,
        config: &RequestConfig,
    ) -> ApiResult<T> {
        self.request(Method::POST, path, body, config).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<JsonValue>,
        config: &RequestConfig,
    ) -> ApiResult<T> {
        self.request(Method::PUT, path, body, config).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<JsonValue>,
        config: &RequestConfig,
    ) -> ApiResult<T> {
        self.request(Method::PATCH, path, body, config).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, config: &RequestConfig) -> ApiResult<T> {
        self.request(Method::DELETE, path, None, config).await
    }

    /// Sends a request and normalizes the outcome.
    #[instrument(skip(self, body, config), fields(request_id = %RequestId::new()))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        config: &RequestConfig,
    ) -> ApiResult<T> {
        let url = self.resolve(path, &config.query)?;
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers: config.headers.clone(),
            body,
            timeout: config.timeout.unwrap_or(self.timeout),
        };

        let response = match self.interceptor.execute(self.transport.as_ref(), request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "API request failed");
                return Err(ApiFailure::from_transport(&err));
            }
        };
        debug!(status = response.status, "API response");

        if !(200..300).contains(&response.status) {
            return Err(ApiFailure::from_response(response.status, &response.body));
        }

        let raw: JsonValue = if response.body.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&response.body).map_err(|e| {
                ApiFailure::new("The service returned an unreadable response.", 502)
                    .with_details(JsonValue::String(e.to_string()))
            })?
        };
        let message = raw
            .get("message")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        let data = serde_json::from_value(raw).map_err(|e| {
            ApiFailure::new("The service returned an unexpected response.", 502)
                .with_details(JsonValue::String(e.to_string()))
        })?;

        Ok(ApiResponse {
            data,
            status: response.status,
            message,
        })
    }

    /// Resolves `path` under the base URL.
    ///
    /// Absolute URLs and paths that climb out of the base path are refused so
    /// credentials only ever go to the configured service.
    fn resolve(&self, path: &str, query: &[(String, String)]) -> Result<Url, ApiFailure> {
        let relative = path.trim_start_matches(['/', '\\']);
        if relative.contains("://") || Url::parse(relative).is_ok() {
            warn!("refused absolute URL as API path");
            return Err(outside_base());
        }
        let mut url = self
            .base_url
            .join(relative)
            .map_err(|e| ApiFailure::new(format!("invalid API path: {e}"), 400))?;
        if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path()) {
            warn!("refused API path outside the service base");
            return Err(outside_base());
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

fn outside_base() -> ApiFailure {
    ApiFailure::new("API paths must stay within the service.", 400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Backend, FakeIdp, Scripted, authenticated_context};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Profile {
        id: u32,
        name: String,
    }

    fn client(backend: Arc<Backend>) -> ApiClient {
        ApiClient::new(
            "http://api.test/v1/",
            backend,
            AuthInterceptor::static_token("dev"),
            Duration::from_secs(15),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn get_decodes_data() {
        let backend = Arc::new(Backend::new(vec![Scripted::Json(
            200,
            json!({"id": 3, "name": "Ada"}),
        )]));

        let response: ApiResponse<Profile> = client(backend.clone())
            .get("/profile", &RequestConfig::default().with_query("expand", "roles"))
            .await
            .expect("ok");

        assert_eq!(response.data, Profile { id: 3, name: "Ada".to_string() });
        assert_eq!(response.status, 200);
        assert_eq!(backend.urls(), vec!["http://api.test/v1/profile?expand=roles"]);
    }

    #[tokio::test]
    async fn non_success_is_normalized() {
        let backend = Arc::new(Backend::new(vec![Scripted::Json(
            404,
            json!({"message": "Appointment not found"}),
        )]));

        let failure = client(backend)
            .delete::<JsonValue>("appointments/9", &RequestConfig::default())
            .await
            .unwrap_err();

        assert_eq!(failure.status, 404);
        assert_eq!(failure.message, "Appointment not found");
    }

    #[tokio::test]
    async fn post_sends_body_and_reads_message() {
        let backend = Arc::new(Backend::new(vec![Scripted::Json(
            201,
            json!({"id": 12, "message": "Booked"}),
        )]));

        let response: ApiResponse<JsonValue> = client(backend.clone())
            .post(
                "appointments",
                Some(json!({"slot": "2026-10-20T09:00:00Z"})),
                &RequestConfig::default(),
            )
            .await
            .expect("ok");

        assert_eq!(response.status, 201);
        assert_eq!(response.message.as_deref(), Some("Booked"));
        assert_eq!(
            backend.bodies(),
            vec![Some(json!({"slot": "2026-10-20T09:00:00Z"}))]
        );
    }

    #[tokio::test]
    async fn empty_body_is_null_data() {
        let backend = Arc::new(Backend::new(vec![Scripted::Status(204)]));
        let response: ApiResponse<Option<Profile>> = client(backend)
            .put("profile", None, &RequestConfig::default())
            .await
            .expect("ok");
        assert_eq!(response.data, None);
    }

    #[tokio::test]
    async fn unexpected_shape_is_failure_not_panic() {
        let backend = Arc::new(Backend::new(vec![Scripted::Json(200, json!(["not", "a", "profile"]))]));
        let failure = client(backend)
            .patch::<Profile>("profile", Some(json!({})), &RequestConfig::default())
            .await
            .unwrap_err();
        assert_eq!(failure.status, 502);
    }

    #[tokio::test]
    async fn timeout_is_clamped() {
        let backend = Arc::new(Backend::new(vec![Scripted::Status(200), Scripted::Status(200)]));
        let client = client(backend.clone());

        let _: ApiResult<JsonValue> = client.get("a", &RequestConfig::default()).await;
        let _: ApiResult<JsonValue> = client
            .get("b", &RequestConfig::default().with_timeout(Duration::from_secs(120)))
            .await;

        assert_eq!(
            backend.timeouts(),
            vec![Duration::from_secs(15), Duration::from_secs(30)]
        );
    }

    #[tokio::test]
    async fn session_client_surfaces_unauthorized_after_failed_retry() {
        let idp = Arc::new(FakeIdp::issuing(3600));
        let ctx = authenticated_context(idp.clone()).await;
        let backend = Arc::new(Backend::new(vec![
            Scripted::Json(401, json!({"message": "Token expired"})),
            Scripted::Json(401, json!({"message": "Token expired"})),
        ]));
        let client = ApiClient::new(
            "http://api.test",
            backend,
            AuthInterceptor::for_session(ctx),
            Duration::from_secs(10),
        )
        .expect("client");

        let failure = client
            .get::<JsonValue>("profile", &RequestConfig::default())
            .await
            .unwrap_err();
        assert!(failure.is_unauthorized());
        assert_eq!(idp.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn paths_cannot_leave_the_service() {
        let backend = Arc::new(Backend::new(Vec::new()));
        let client = client(backend.clone());

        for path in [
            "https://evil.example/steal",
            "../admin/users",
            "profile/../../../other",
            "%2e%2e/other",
            "javascript:alert(1)",
        ] {
            let failure = client
                .get::<JsonValue>(path, &RequestConfig::default())
                .await
                .unwrap_err();
            assert_eq!(failure.status, 400, "{path}");
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn leading_slashes_stay_under_base() {
        let backend = Arc::new(Backend::new(vec![
            Scripted::Status(204),
            Scripted::Status(204),
            Scripted::Status(204),
        ]));
        let client = client(backend.clone());

        for path in ["appointments/7/notes", "//evil.example/steal", "\\\\evil.example/steal"] {
            let _: ApiResult<JsonValue> = client.get(path, &RequestConfig::default()).await;
        }

        assert_eq!(
            backend.urls(),
            vec![
                "http://api.test/v1/appointments/7/notes",
                "http://api.test/v1/evil.example/steal",
                "http://api.test/v1/evil.example/steal",
            ]
        );
    }

    #[tokio::test]
    async fn derived_client_uses_its_own_credentials() {
        let backend = Arc::new(Backend::new(vec![Scripted::Status(204), Scripted::Status(204)]));
        let anonymous = ApiClient::new(
            "http://api.test/v1",
            backend.clone(),
            AuthInterceptor::anonymous(),
            Duration::from_secs(15),
        )
        .expect("client");
        let signed = anonymous.with_interceptor(AuthInterceptor::static_token("dev"));

        let _: ApiResult<JsonValue> = anonymous.get("a", &RequestConfig::default()).await;
        let _: ApiResult<JsonValue> = signed.get("b", &RequestConfig::default()).await;

        assert_eq!(
            backend.authorizations(),
            vec![None, Some("Bearer dev".to_string())]
        );
        assert_eq!(backend.urls(), vec!["http://api.test/v1/a", "http://api.test/v1/b"]);
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let err = ApiClient::new(
            "api/v1",
            Arc::new(Backend::new(Vec::new())),
            AuthInterceptor::static_token("dev"),
            Duration::from_secs(10),
        )
        .err()
        .expect("invalid");
        assert!(err.to_string().contains("invalid API base URL"));
    }
}
