//! Page rendering.
//!
//! Each page is an askama template; user-supplied values are escaped by the
//! template engine.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use carebridge_platform_access::{AuthInitFailure, Identity, Role, RoleSet};

#[derive(Template)]
#[template(path = "login.html")]
struct LoginPage<'a> {
    login_href: &'a str,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorPage<'a> {
    message: &'a str,
    retry_href: &'a str,
}

#[derive(Template)]
#[template(path = "loading.html")]
struct LoadingPage;

#[derive(Template)]
#[template(path = "unauthorized.html")]
struct UnauthorizedPage<'a> {
    home_href: Option<&'a str>,
    signed_in: bool,
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundPage;

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage<'a> {
    area_title: &'a str,
    display_name: &'a str,
    email: Option<&'a str>,
    roles: String,
    section: Option<&'a str>,
    api_base: &'a str,
    chat_enabled: bool,
}

fn render(template: &impl Template, status: StatusCode) -> Response {
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "page rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Builds the link that starts a login and returns to `return_to`.
#[must_use]
pub fn login_href(return_to: Option<&str>) -> String {
    match return_to {
        Some(path) => format!("/auth/login?return_to={}", urlencoding::encode(path)),
        None => "/auth/login".to_string(),
    }
}

/// Returns the landing page for a role set.
#[must_use]
pub fn home_for(roles: &RoleSet) -> &'static str {
    if roles.contains(&Role::Admin) {
        "/admin"
    } else if roles.contains(&Role::Practitioner) {
        "/doctor"
    } else if roles.contains(&Role::Patient) {
        "/patient"
    } else {
        "/unauthorized"
    }
}

pub fn login(return_to: Option<&str>) -> Response {
    let href = login_href(return_to);
    render(&LoginPage { login_href: &href }, StatusCode::OK)
}

/// The error panel for a failed sign-in, with a retry action.
pub fn sign_in_error(failure: &AuthInitFailure, return_to: Option<&str>) -> Response {
    let href = login_href(return_to);
    render(
        &ErrorPage {
            message: failure.user_message(),
            retry_href: &href,
        },
        StatusCode::OK,
    )
}

pub fn loading() -> Response {
    render(&LoadingPage, StatusCode::OK)
}

pub fn unauthorized(identity: Option<&Identity>) -> Response {
    let home = identity.map_or("/", |i| home_for(i.roles()));
    // A user with no usable role would land back here.
    let home_href = (home != "/unauthorized").then_some(home);
    render(
        &UnauthorizedPage {
            home_href,
            signed_in: identity.is_some(),
        },
        StatusCode::FORBIDDEN,
    )
}

pub fn not_found() -> Response {
    render(&NotFoundPage, StatusCode::NOT_FOUND)
}

/// An area dashboard, optionally focused on one section.
pub fn dashboard(
    area_title: &str,
    api_base: &str,
    identity: &Identity,
    section: Option<&str>,
    chat_enabled: bool,
) -> Response {
    let roles = identity
        .roles()
        .roles()
        .iter()
        .filter(|r| r.is_known())
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    render(
        &DashboardPage {
            area_title,
            display_name: identity.display_name(),
            email: identity.email(),
            roles,
            section,
            api_base,
            chat_enabled,
        },
        StatusCode::OK,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_href_encodes_return_path() {
        assert_eq!(
            login_href(Some("/doctor/schedule?day=mon")),
            "/auth/login?return_to=%2Fdoctor%2Fschedule%3Fday%3Dmon"
        );
        assert_eq!(login_href(None), "/auth/login");
    }

    #[test]
    fn home_prefers_most_privileged_area() {
        assert_eq!(home_for(&RoleSet::from_roles([Role::Patient, Role::Admin])), "/admin");
        assert_eq!(home_for(&RoleSet::from_roles([Role::Practitioner])), "/doctor");
        assert_eq!(home_for(&RoleSet::from_roles([Role::Patient])), "/patient");
        assert_eq!(home_for(&RoleSet::none()), "/unauthorized");
    }

    #[test]
    fn roleless_user_is_offered_sign_out_only() {
        let page = UnauthorizedPage {
            home_href: None,
            signed_in: true,
        }
        .render()
        .expect("render");
        assert!(!page.contains("Go to your dashboard"));
        assert!(page.contains("Sign out"));
        assert!(page.contains("method=\"post\""));
    }

    #[test]
    fn dashboard_escapes_user_values() {
        let identity = Identity::new("u1", RoleSet::from_roles([Role::Patient]))
            .with_display_name(Some("<script>x</script>".to_string()));
        let html = DashboardPage {
            area_title: "Patient",
            display_name: identity.display_name(),
            email: None,
            roles: "patient".to_string(),
            section: None,
            api_base: "/patient/api",
            chat_enabled: false,
        }
        .render()
        .expect("render");
        assert!(!html.contains("<script>x"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
