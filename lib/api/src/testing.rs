//! Fakes shared by the crate's tests.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use carebridge_identity::{IdentityError, IdentityProvider, LoginRequest, RefreshPolicy, SessionContext};
use carebridge_platform_access::{RoleMapping, Token, TokenPair};
use chrono::Utc;
use reqwest::Method;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::interceptor::ReauthHandler;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

const ISSUE: u8 = 0;
const REJECT: u8 = 1;
const UNREACHABLE: u8 = 2;

/// Identity provider issuing numbered tokens.
pub(crate) struct FakeIdp {
    lifetime_secs: AtomicI64,
    mode: AtomicU8,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl FakeIdp {
    pub(crate) fn issuing(lifetime_secs: i64) -> Self {
        Self {
            lifetime_secs: AtomicI64::new(lifetime_secs),
            mode: AtomicU8::new(ISSUE),
            issued: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_lifetime(&self, secs: i64) {
        self.lifetime_secs.store(secs, Ordering::SeqCst);
    }

    pub(crate) fn set_rejecting(&self) {
        self.mode.store(REJECT, Ordering::SeqCst);
    }

    pub(crate) fn set_unreachable(&self) {
        self.mode.store(UNREACHABLE, Ordering::SeqCst);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn issue(&self) -> Result<TokenPair, IdentityError> {
        match self.mode.load(Ordering::SeqCst) {
            REJECT => {
                return Err(IdentityError::Rejected {
                    reason: "invalid_grant".to_string(),
                });
            }
            UNREACHABLE => {
                return Err(IdentityError::Unreachable {
                    reason: "connection refused".to_string(),
                });
            }
            _ => {}
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let lifetime = self.lifetime_secs.load(Ordering::SeqCst);
        let claims = serde_json::json!({
            "sub": "pat-1",
            "email": "pat@example.com",
            "realm_access": { "roles": ["patient"] },
        });
        let id_token = format!("h.{}.s", URL_SAFE_NO_PAD.encode(claims.to_string()));
        Ok(TokenPair::new(
            Token::with_lifetime(format!("access-{n}"), Utc::now(), lifetime),
            Some(format!("refresh-{n}")),
        )
        .with_id_token(Some(id_token)))
    }
}

#[async_trait]
impl IdentityProvider for FakeIdp {
    fn begin_login(&self) -> Result<LoginRequest, IdentityError> {
        Ok(LoginRequest {
            authorization_url: "https://id.test/auth".to_string(),
            csrf_state: "state".to_string(),
            pkce_verifier: "verifier".to_string(),
        })
    }

    async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<TokenPair, IdentityError> {
        self.issue()
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, IdentityError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.issue()
    }

    fn end_session_url(&self, _hint: Option<&str>, _redirect: &str) -> Option<String> {
        None
    }
}

/// A signed-in session backed by `idp`.
pub(crate) async fn authenticated_context(idp: Arc<FakeIdp>) -> Arc<SessionContext> {
    let ctx = Arc::new(SessionContext::new(
        idp,
        RefreshPolicy::default(),
        RoleMapping::new(vec!["realm_access.roles".to_string()]),
        Duration::from_secs(5),
    ));
    let state = ctx.complete_login("code", "verifier").await;
    assert!(state.identity().is_some(), "login failed: {state:?}");
    ctx
}

/// A scripted backend answer.
pub(crate) enum Scripted {
    Status(u16),
    Json(u16, JsonValue),
    Fail(TransportError),
}

/// Backend replaying scripted answers and recording what it was sent.
pub(crate) struct Backend {
    script: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl Backend {
    pub(crate) fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<HttpRequest> {
        self.seen.lock().expect("seen lock").clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen().len()
    }

    pub(crate) fn authorizations(&self) -> Vec<Option<String>> {
        self.seen()
            .iter()
            .map(|r| r.header("Authorization").map(str::to_string))
            .collect()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.seen().into_iter().map(|r| r.url).collect()
    }

    pub(crate) fn bodies(&self) -> Vec<Option<JsonValue>> {
        self.seen().into_iter().map(|r| r.body).collect()
    }

    pub(crate) fn timeouts(&self) -> Vec<Duration> {
        self.seen().into_iter().map(|r| r.timeout).collect()
    }
}

#[async_trait]
impl HttpTransport for Backend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().expect("seen lock").push(request);
        let next = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Scripted::Status(500));
        match next {
            Scripted::Status(status) => Ok(HttpResponse {
                status,
                body: Vec::new(),
            }),
            Scripted::Json(status, body) => Ok(HttpResponse {
                status,
                body: body.to_string().into_bytes(),
            }),
            Scripted::Fail(err) => Err(err),
        }
    }
}

#[derive(Default)]
pub(crate) struct ReauthCounter {
    count: AtomicUsize,
}

impl ReauthCounter {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ReauthHandler for ReauthCounter {
    fn reauthenticate(&self, _cause: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A GET for `path` on the test backend.
pub(crate) fn request(path: &str) -> HttpRequest {
    HttpRequest {
        method: Method::GET,
        url: format!("http://api.test{path}"),
        headers: Vec::new(),
        body: None,
        timeout: Duration::from_secs(10),
    }
}
