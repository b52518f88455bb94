//! Authentication routes for login, callback, and logout.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use carebridge_platform_access::{AuthInitFailure, SessionState};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    AUTH_STATE_COOKIE, PendingLogin, REFRESH_COOKIE, SESSION_COOKIE, pending_login_cookie,
    removal, safe_return_path, session_cookie, sync_refresh_cookie,
};
use crate::pages;
use crate::session::ClientSession;
use crate::state::AppState;

/// Query parameters carrying a post-login destination.
#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    return_to: Option<String>,
}

/// Query parameters for the authorization-code callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// The calling browser's session, resolved from its cookies.
pub(crate) struct Requester {
    pub(crate) client: Option<Arc<ClientSession>>,
    pub(crate) state: SessionState,
    /// Cookies to send back, including any set while resolving.
    pub(crate) jar: CookieJar,
}

/// Finds the caller's session, restoring it from the refresh cookie when the
/// browser is not signed in.
///
/// A browser without a session entry or refresh cookie is `Anonymous`.
pub(crate) async fn resolve(app: &AppState, jar: CookieJar) -> Requester {
    let client = jar
        .get(SESSION_COOKIE)
        .and_then(|c| app.sessions.get(c.value()));
    if let Some(client) = &client {
        let state = client.context.state();
        if matches!(state, SessionState::Authenticated(_) | SessionState::Loading) {
            return Requester {
                client: Some(Arc::clone(client)),
                state,
                jar,
            };
        }
    }

    let refresh_token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    let Some(refresh_token) = refresh_token else {
        let state = client.as_ref().map_or(SessionState::Anonymous, |c| {
            match c.context.state() {
                SessionState::Uninitialized => SessionState::Anonymous,
                state => state,
            }
        });
        return Requester { client, state, jar };
    };

    let (client, jar) = match client {
        Some(client) => (client, jar),
        None => match app.sessions.create() {
            Ok((key, client)) => (client, jar.add(session_cookie(&key, app.secure_cookies))),
            Err(e) => {
                error!(error = %e, "could not create a browser session");
                return Requester {
                    client: None,
                    state: SessionState::Anonymous,
                    jar,
                };
            }
        },
    };

    let state = client.context.initialize(Some(refresh_token)).await;
    let jar = match state {
        // A provider outage keeps the cookie for the next attempt.
        SessionState::Error(_) | SessionState::Loading | SessionState::Uninitialized => jar,
        SessionState::Authenticated(_) | SessionState::Anonymous => {
            let refresh_token = client.context.store().pair().and_then(|p| p.refresh_token);
            sync_refresh_cookie(jar, refresh_token, app.secure_cookies)
        }
    };
    Requester {
        client: Some(client),
        state,
        jar,
    }
}

/// Sends the user to their area, or to the login page.
pub async fn home(State(app): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let requester = resolve(&app, jar).await;
    let response = match requester.state {
        SessionState::Authenticated(identity) => {
            Redirect::to(pages::home_for(identity.roles())).into_response()
        }
        SessionState::Uninitialized | SessionState::Loading => pages::loading(),
        SessionState::Anonymous | SessionState::Error(_) => Redirect::to("/login").into_response(),
    };
    (requester.jar, response).into_response()
}

/// The public login page; shows the sign-in error if the last attempt failed.
pub async fn login_page(
    State(app): State<Arc<AppState>>,
    Query(query): Query<ReturnQuery>,
    jar: CookieJar,
) -> Response {
    let return_to = safe_return_path(query.return_to.as_deref());
    let requester = resolve(&app, jar).await;
    let response = match requester.state {
        SessionState::Authenticated(identity) => {
            let target = return_to.unwrap_or_else(|| pages::home_for(identity.roles()).to_string());
            Redirect::to(&target).into_response()
        }
        SessionState::Error(failure) => pages::sign_in_error(&failure, return_to.as_deref()),
        SessionState::Uninitialized | SessionState::Loading => pages::loading(),
        SessionState::Anonymous => pages::login(return_to.as_deref()),
    };
    (requester.jar, response).into_response()
}

/// Initiates the login flow by redirecting to the identity provider.
pub async fn start_login(
    State(app): State<Arc<AppState>>,
    Query(query): Query<ReturnQuery>,
    jar: CookieJar,
) -> Response {
    let existing = jar
        .get(SESSION_COOKIE)
        .and_then(|c| app.sessions.get(c.value()));
    let (client, jar) = match existing {
        Some(client) => (client, jar),
        None => match app.sessions.create() {
            Ok((key, client)) => (client, jar.add(session_cookie(&key, app.secure_cookies))),
            Err(e) => {
                error!(error = %e, "could not create a browser session");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };

    let login = match client.context.begin_login() {
        Ok(login) => login,
        Err(e) => {
            client.context.fail(e.into());
            return (jar, Redirect::to("/login")).into_response();
        }
    };

    let pending = PendingLogin {
        csrf_state: login.csrf_state,
        pkce_verifier: login.pkce_verifier,
        return_to: safe_return_path(query.return_to.as_deref()),
    };
    let jar = jar.add(pending_login_cookie(&pending, app.secure_cookies));

    (jar, Redirect::to(&login.authorization_url)).into_response()
}

/// Handles the callback after the user authenticates with the identity provider.
pub async fn callback(
    State(app): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Response {
    let pending = jar
        .get(AUTH_STATE_COOKIE)
        .and_then(|c| PendingLogin::decode(c.value()));
    let key = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let jar = jar.add(removal(AUTH_STATE_COOKIE));

    let Some((key, client)) = key.and_then(|k| app.sessions.get(&k).map(|c| (k, c))) else {
        warn!("login callback without a browser session");
        return (jar, Redirect::to("/login")).into_response();
    };

    let rejected = |reason: &str| {
        warn!(%reason, "login callback rejected");
        client.context.fail(AuthInitFailure::Rejected {
            reason: reason.to_string(),
        });
    };

    if let Some(error) = &query.error {
        rejected(&format!("identity provider returned error: {error}"));
        return (jar, Redirect::to("/login")).into_response();
    }
    let Some(pending) = pending else {
        rejected("missing or invalid login state");
        return (jar, Redirect::to("/login")).into_response();
    };
    if query.state.as_deref() != Some(pending.csrf_state.as_str()) {
        rejected("CSRF state mismatch");
        return (jar, Redirect::to("/login")).into_response();
    }
    let Some(code) = query.code.as_deref() else {
        rejected("callback carried no authorization code");
        return (jar, Redirect::to("/login")).into_response();
    };

    let identity = match client.context.complete_login(code, &pending.pkce_verifier).await {
        SessionState::Authenticated(identity) => identity,
        _ => return (jar, Redirect::to("/login")).into_response(),
    };

    // A signed-in session never keeps the key it had before login.
    let jar = match app.sessions.rotate(&key) {
        Ok(Some(fresh)) => jar.add(session_cookie(&fresh, app.secure_cookies)),
        Ok(None) | Err(_) => {
            error!("could not rotate the browser session key");
            client.context.logout();
            app.sessions.remove(&key);
            return (jar.add(removal(SESSION_COOKIE)), Redirect::to("/login")).into_response();
        }
    };

    let refresh_token = client.context.store().pair().and_then(|p| p.refresh_token);
    let jar = sync_refresh_cookie(jar, refresh_token, app.secure_cookies);
    let target = pending
        .return_to
        .unwrap_or_else(|| pages::home_for(identity.roles()).to_string());
    (jar, Redirect::to(&target)).into_response()
}

/// Ends the caller's session and signs out at the identity provider when
/// supported.
pub async fn logout(State(app): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let client = jar
        .get(SESSION_COOKIE)
        .and_then(|c| app.sessions.remove(c.value()));

    let post_logout = format!("{}/login", app.public_url);
    let target = client
        .and_then(|client| {
            let id_token = client.context.logout();
            info!("user signed out");
            id_token.and_then(|hint| client.context.end_session_url(Some(&hint), &post_logout))
        })
        .unwrap_or_else(|| "/login".to_string());

    let jar = jar
        .add(removal(SESSION_COOKIE))
        .add(removal(REFRESH_COOKIE));
    (jar, Redirect::to(&target)).into_response()
}
