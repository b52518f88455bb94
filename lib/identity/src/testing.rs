//! Scripted identity provider shared by the crate's tests.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use carebridge_platform_access::{Token, TokenPair};
use chrono::Utc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::IdentityError;
use crate::provider::{IdentityProvider, LoginRequest};

/// How the fake answers refresh and code exchanges.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Issue { lifetime_secs: i64 },
    Reject,
    Unreachable,
}

pub(crate) struct FakeProvider {
    behavior: Mutex<Behavior>,
    delay: Duration,
    roles: Vec<String>,
    refresh_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay: Duration::ZERO,
            roles: vec!["patient".to_string()],
            refresh_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| (*r).to_string()).collect();
        self
    }

    pub(crate) fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().expect("behavior lock") = behavior;
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, subject: &str, n: usize) -> Result<TokenPair, IdentityError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let behavior = self.behavior.lock().expect("behavior lock").clone();
        match behavior {
            Behavior::Issue { lifetime_secs } => Ok(TokenPair::new(
                Token::with_lifetime(format!("access-{n}"), Utc::now(), lifetime_secs),
                Some(format!("refresh-{n}")),
            )
            .with_id_token(Some(id_token(subject, &self.roles)))),
            Behavior::Reject => Err(IdentityError::Rejected {
                reason: "invalid_grant".to_string(),
            }),
            Behavior::Unreachable => Err(IdentityError::Unreachable {
                reason: "connection refused".to_string(),
            }),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn begin_login(&self) -> Result<LoginRequest, IdentityError> {
        Ok(LoginRequest {
            authorization_url: "https://id.example.com/auth?state=s1".to_string(),
            csrf_state: "s1".to_string(),
            pkce_verifier: "v1".to_string(),
        })
    }

    async fn exchange_code(
        &self,
        code: &str,
        _pkce_verifier: &str,
    ) -> Result<TokenPair, IdentityError> {
        let n = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.answer(code, n).await
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, IdentityError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.answer("restored-user", n).await
    }

    fn end_session_url(&self, _id_token_hint: Option<&str>, post_logout_redirect: &str) -> Option<String> {
        Some(format!("https://id.example.com/logout?redirect={post_logout_redirect}"))
    }
}

/// Builds an unsigned ID token for `subject` holding `roles`.
pub(crate) fn id_token(subject: &str, roles: &[String]) -> String {
    let payload = serde_json::json!({
        "sub": subject,
        "name": format!("User {subject}"),
        "realm_access": { "roles": roles },
    });
    format!(
        "eyJhbGciOiJub25lIn0.{}.sig",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

/// A pair whose access token has `lifetime_secs` left.
pub(crate) fn pair_with_lifetime(secret: &str, lifetime_secs: i64) -> TokenPair {
    TokenPair::new(
        Token::with_lifetime(secret, Utc::now(), lifetime_secs),
        Some("r0".to_string()),
    )
}
