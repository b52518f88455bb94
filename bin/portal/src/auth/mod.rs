//! Authentication for the portal host.
//!
//! This module provides:
//! - Login initiation, callback and logout routes
//! - The route-guard middleware protecting the role-gated areas
//!
//! # Cookies
//!
//! All cookies are http-only. `cb_session` names the browser's entry in the
//! [`SessionRegistry`](crate::session::SessionRegistry), `cb_auth_state`
//! holds the pending login during a sign-in, and `cb_refresh` lets the
//! session be restored after a restart or idle expiry.

pub mod middleware;
pub mod routes;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::Duration as TimeDuration;

use crate::session::SessionKey;

pub use middleware::{AreaGuard, require_roles};
pub use routes::{callback, home, login_page, logout, start_login};

/// Browser session cookie name.
pub const SESSION_COOKIE: &str = "cb_session";

/// Pending login state cookie name (CSRF protection during the code flow).
pub const AUTH_STATE_COOKIE: &str = "cb_auth_state";

/// Refresh token cookie name.
pub const REFRESH_COOKIE: &str = "cb_refresh";

/// What the callback needs to finish a login started by this browser.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingLogin {
    pub csrf_state: String,
    pub pkce_verifier: String,
    #[serde(default)]
    pub return_to: Option<String>,
}

impl PendingLogin {
    /// Encodes the state for a cookie value.
    #[must_use]
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(self).unwrap_or_default())
    }

    /// Decodes a cookie value; `None` if it was tampered with or truncated.
    #[must_use]
    pub fn decode(value: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Accepts only same-origin absolute paths as post-login destinations.
#[must_use]
pub fn safe_return_path(raw: Option<&str>) -> Option<String> {
    let path = raw?.trim();
    let local = path.starts_with('/') && !path.starts_with("//") && !path.contains('\\');
    local.then(|| path.to_string())
}

pub(crate) fn pending_login_cookie(pending: &PendingLogin, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_STATE_COOKIE, pending.encode()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(10))
        .build()
}

pub(crate) fn session_cookie(key: &SessionKey, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, key.as_str().to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

pub(crate) fn refresh_cookie(refresh_token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, refresh_token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

pub(crate) fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}

/// Keeps the refresh cookie in step with the token store.
///
/// Adds the cookie when the store holds a refresh token the browser does not
/// have yet, and removes it once the session is gone.
pub(crate) fn sync_refresh_cookie(
    jar: CookieJar,
    refresh_token: Option<String>,
    secure: bool,
) -> CookieJar {
    let current = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());
    match (refresh_token, current) {
        (Some(token), Some(current)) if token == current => jar,
        (Some(token), _) => jar.add(refresh_cookie(token, secure)),
        (None, Some(_)) => jar.add(removal(REFRESH_COOKIE)),
        (None, None) => jar,
    }
}
