//! Fakes for driving the router in tests.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use carebridge_api::{
    ApiClient, AuthInterceptor, HttpRequest, HttpResponse, HttpTransport, TransportError,
};
use carebridge_chat::{ChatBridge, ChatError, ChatMessage, ChatRelay};
use carebridge_identity::{IdentityError, IdentityProvider, LoginRequest, RefreshPolicy};
use carebridge_platform_access::{OidcConfig, Token, TokenPair};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::{AUTH_STATE_COOKIE, REFRESH_COOKIE, SESSION_COOKIE};
use crate::session::SessionRegistry;
use crate::state::AppState;

pub(crate) const CSRF_STATE: &str = "csrf-1";

/// Identity provider that signs in the authorization code as the subject.
pub(crate) struct FakeIdp {
    roles: Mutex<Vec<String>>,
    rejecting: AtomicBool,
    issued: AtomicUsize,
}

impl FakeIdp {
    pub(crate) fn with_roles(roles: &[&str]) -> Self {
        Self {
            roles: Mutex::new(roles.iter().map(|r| (*r).to_string()).collect()),
            rejecting: AtomicBool::new(false),
            issued: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    fn issue(&self, subject: &str) -> Result<TokenPair, IdentityError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(IdentityError::Rejected {
                reason: "invalid_grant".to_string(),
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let roles = self.roles.lock().expect("roles lock").clone();
        let payload = serde_json::json!({
            "sub": subject,
            "name": format!("User {subject}"),
            "realm_access": { "roles": roles },
        });
        let id_token = format!(
            "eyJhbGciOiJub25lIn0.{}.sig",
            URL_SAFE_NO_PAD.encode(payload.to_string())
        );
        Ok(TokenPair::new(
            Token::with_lifetime(format!("access-{n}"), Utc::now(), 300),
            Some(format!("refresh-{n}")),
        )
        .with_id_token(Some(id_token)))
    }
}

#[async_trait]
impl IdentityProvider for FakeIdp {
    fn begin_login(&self) -> Result<LoginRequest, IdentityError> {
        Ok(LoginRequest {
            authorization_url: format!("https://id.example.com/auth?state={CSRF_STATE}"),
            csrf_state: CSRF_STATE.to_string(),
            pkce_verifier: "verifier-1".to_string(),
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        _pkce_verifier: &str,
    ) -> Result<TokenPair, IdentityError> {
        self.issue(code)
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, IdentityError> {
        self.issue("restored-user")
    }

    fn end_session_url(&self, id_token_hint: Option<&str>, post_logout_redirect: &str) -> Option<String> {
        id_token_hint?;
        Some(format!(
            "https://id.example.com/logout?post_logout_redirect_uri={post_logout_redirect}"
        ))
    }
}

/// Backend that answers from a script, then with `200 {}`.
#[derive(Default)]
pub(crate) struct FakeBackend {
    script: Mutex<VecDeque<HttpResponse>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl FakeBackend {
    pub(crate) fn respond(&self, status: u16, body: serde_json::Value) {
        self.script
            .lock()
            .expect("script lock")
            .push_back(HttpResponse {
                status,
                body: body.to_string().into_bytes(),
            });
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().expect("seen lock").push(request);
        let scripted = self.script.lock().expect("script lock").pop_front();
        Ok(scripted.unwrap_or(HttpResponse {
            status: 200,
            body: b"{}".to_vec(),
        }))
    }
}

/// Relay that echoes the message back.
pub(crate) struct EchoRelay;

#[async_trait]
impl ChatRelay for EchoRelay {
    async fn relay(&self, message: &ChatMessage) -> Result<String, ChatError> {
        Ok(format!("echo: {}", message.text))
    }
}

pub(crate) struct Harness {
    pub(crate) idp: Arc<FakeIdp>,
    pub(crate) backend: Arc<FakeBackend>,
    pub(crate) app: Arc<AppState>,
    pub(crate) router: Router,
}

impl Harness {
    pub(crate) fn new(roles: &[&str]) -> Self {
        let idp = Arc::new(FakeIdp::with_roles(roles));
        let backend = Arc::new(FakeBackend::default());
        let mapping = OidcConfig::new(
            "https://id.example.com/realms/carebridge".to_string(),
            "portal".to_string(),
            "http://localhost:3000/auth/callback".to_string(),
        )
        .role_mapping();

        let api = ApiClient::new(
            "https://api.example.com/v1",
            Arc::clone(&backend) as Arc<dyn HttpTransport>,
            AuthInterceptor::anonymous(),
            Duration::from_secs(15),
        )
        .expect("api client");
        let sessions = SessionRegistry::new(
            Arc::clone(&idp) as Arc<dyn IdentityProvider>,
            RefreshPolicy::new(30),
            mapping,
            Duration::from_secs(5),
            api,
        );

        let app = Arc::new(AppState {
            sessions,
            chat: Some(ChatBridge::new(Arc::new(EchoRelay))),
            secure_cookies: false,
            public_url: "http://localhost:3000".to_string(),
        });
        let router = crate::app::router(Arc::clone(&app), "assets");

        Self {
            idp,
            backend,
            app,
            router,
        }
    }

    /// Signs in as `subject` through the browser flow.
    pub(crate) async fn sign_in(&self, subject: &str) -> Browser {
        let response = self.get("/auth/login").await;
        let session = set_cookie(&response, SESSION_COOKIE).expect("session cookie");
        let pending = set_cookie(&response, AUTH_STATE_COOKIE).expect("pending login cookie");

        let callback = format!("/auth/callback?code={subject}&state={CSRF_STATE}");
        let response = self.get_with(&callback, &format!("{session}; {pending}")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        Browser {
            session: set_cookie(&response, SESSION_COOKIE).expect("rotated session cookie"),
            refresh: set_cookie(&response, REFRESH_COOKIE).expect("refresh cookie"),
        }
    }

    pub(crate) async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).expect("request"))
            .await
    }

    /// Sends a GET carrying a `Cookie` header.
    pub(crate) async fn get_with(&self, uri: &str, cookies: &str) -> Response<Body> {
        let request = Request::get(uri)
            .header(header::COOKIE, cookies)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    pub(crate) async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible")
    }
}

/// Cookies a signed-in browser holds, as `name=value` pairs.
pub(crate) struct Browser {
    pub(crate) session: String,
    pub(crate) refresh: String,
}

impl Browser {
    pub(crate) fn cookies(&self) -> String {
        format!("{}; {}", self.session, self.refresh)
    }
}

pub(crate) fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Returns `name=value` for the named cookie set by `response`.
pub(crate) fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub(crate) async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub(crate) async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}
