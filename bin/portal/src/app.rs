//! Router assembly.

use axum::{
    Extension, Router,
    extract::{Path, State},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use axum_extra::extract::CookieJar;
use carebridge_platform_access::{Identity, RouteRequirement};
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::auth::routes::resolve;
use crate::auth::{self, AreaGuard, require_roles};
use crate::state::AppState;
use crate::{chat, pages, proxy};

/// A role-gated area of the portal.
struct Area {
    slug: &'static str,
    title: &'static str,
    roles: &'static [&'static str],
}

const AREAS: [Area; 3] = [
    Area {
        slug: "patient",
        title: "Patient",
        roles: &["patient"],
    },
    Area {
        slug: "doctor",
        title: "Practitioner",
        roles: &["practitioner"],
    },
    Area {
        slug: "admin",
        title: "Administration",
        roles: &["admin"],
    },
];

#[derive(Clone)]
struct AreaPage {
    title: &'static str,
    api_base: String,
    chat_enabled: bool,
}

impl AreaPage {
    fn render(&self, identity: &Identity, section: Option<&str>) -> Response {
        pages::dashboard(
            self.title,
            &self.api_base,
            identity,
            section,
            self.chat_enabled,
        )
    }
}

/// Builds the portal router.
pub fn router(app: Arc<AppState>, assets_dir: impl AsRef<FsPath>) -> Router {
    let mut router = Router::new()
        .route("/", get(auth::home))
        .route("/login", get(auth::login_page))
        .route("/auth/login", get(auth::start_login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", post(auth::logout))
        .route("/unauthorized", get(unauthorized))
        .merge(chat_routes(&app));

    for area in &AREAS {
        router = router.nest(&format!("/{}", area.slug), area_routes(&app, area));
    }

    router
        .nest_service("/assets", ServeDir::new(assets_dir))
        .fallback(not_found)
        .with_state(app)
}

fn area_routes(app: &Arc<AppState>, area: &Area) -> Router<Arc<AppState>> {
    let requirement = RouteRequirement::parse(area.roles.iter().copied());
    let page = AreaPage {
        title: area.title,
        api_base: format!("/{}/api", area.slug),
        chat_enabled: app.chat.is_some(),
    };
    let section_page = page.clone();

    let pages = Router::new()
        .route(
            "/",
            get(move |Extension(identity): Extension<Identity>| async move {
                page.render(&identity, None)
            }),
        )
        .route(
            "/{section}",
            get(
                move |Extension(identity): Extension<Identity>, Path(section): Path<String>| async move {
                    section_page.render(&identity, Some(&section))
                },
            ),
        )
        .route_layer(from_fn_with_state(
            AreaGuard::pages(Arc::clone(app), requirement.clone()),
            require_roles,
        ));

    let api = Router::new()
        .route("/api/{*path}", any(proxy::forward))
        .route_layer(from_fn_with_state(
            AreaGuard::api(Arc::clone(app), requirement),
            require_roles,
        ));

    pages.merge(api)
}

fn chat_routes(app: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat::send_message))
        .route_layer(from_fn_with_state(
            AreaGuard::api(Arc::clone(app), RouteRequirement::authenticated()),
            require_roles,
        ))
}

async fn unauthorized(State(app): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let requester = resolve(&app, jar).await;
    let page = pages::unauthorized(requester.state.identity());
    (requester.jar, page).into_response()
}

async fn not_found() -> Response {
    pages::not_found()
}
