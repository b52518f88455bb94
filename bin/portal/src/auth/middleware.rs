//! Route-guard middleware for the role-gated areas.

use axum::{
    Json,
    extract::{OriginalUri, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use carebridge_platform_access::{RouteGuardDecision, RouteRequirement, SessionState, guard};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::routes::resolve;
use super::sync_refresh_cookie;
use crate::pages;
use crate::state::AppState;

/// Guard configuration for one group of routes.
#[derive(Clone)]
pub struct AreaGuard {
    pub app: Arc<AppState>,
    pub requirement: RouteRequirement,
    /// Answer with JSON envelopes instead of redirects and pages.
    pub json: bool,
}

impl AreaGuard {
    #[must_use]
    pub fn pages(app: Arc<AppState>, requirement: RouteRequirement) -> Self {
        Self {
            app,
            requirement,
            json: false,
        }
    }

    #[must_use]
    pub fn api(app: Arc<AppState>, requirement: RouteRequirement) -> Self {
        Self {
            app,
            requirement,
            json: true,
        }
    }
}

/// Lets a request through only if the guard allows it.
///
/// The decision is made on the caller's own session. On success the
/// signed-in [`Identity`](carebridge_platform_access::Identity) and the
/// caller's [`ClientSession`](crate::session::ClientSession) are added to the
/// request extensions.
pub async fn require_roles(
    State(area): State<AreaGuard>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let requester = resolve(&area.app, jar).await;
    let (client, state, jar) = (requester.client, requester.state, requester.jar);
    // Nested routers see a stripped URI; the guard needs the full path.
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map_or_else(|| request.uri().clone(), |original| original.0.clone());
    let requested = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);

    let decision = guard::evaluate(&state, &area.requirement, &requested);
    debug!(path = %requested, state = state.label(), ?decision, "route guard");

    let response = match decision {
        RouteGuardDecision::Allow => {
            let (Some(client), SessionState::Authenticated(identity)) = (client, state) else {
                return (jar, Redirect::to("/login")).into_response();
            };
            request.extensions_mut().insert(identity);
            request.extensions_mut().insert(Arc::clone(&client));
            let response = next.run(request).await;
            // The handler may have refreshed or ended the session.
            let refresh_token = client.context.store().pair().and_then(|p| p.refresh_token);
            let jar = sync_refresh_cookie(jar, refresh_token, area.app.secure_cookies);
            return (jar, response).into_response();
        }
        RouteGuardDecision::RedirectToLogin { return_to } => {
            if area.json {
                denied(StatusCode::UNAUTHORIZED, "Please sign in to continue.")
            } else {
                let target = format!("/login?return_to={}", urlencoding::encode(&return_to));
                Redirect::to(&target).into_response()
            }
        }
        RouteGuardDecision::RedirectToUnauthorized => {
            if area.json {
                denied(StatusCode::FORBIDDEN, "You do not have access to this resource.")
            } else {
                Redirect::to("/unauthorized").into_response()
            }
        }
        RouteGuardDecision::ShowLoading => {
            if area.json {
                let mut response =
                    denied(StatusCode::SERVICE_UNAVAILABLE, "Your sign-in is still being checked.");
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, header::HeaderValue::from_static("1"));
                response
            } else {
                pages::loading()
            }
        }
    };
    (jar, response).into_response()
}

fn denied(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "error": { "message": message, "status": status.as_u16() },
        "status": status.as_u16(),
    });
    (status, Json(body)).into_response()
}
