//! Router and session middleware.

pub mod auth;
pub mod drive;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{warn, Level};

use crate::error::ApiError;
use crate::AppState;
use drivegate_common::{AuthError, SESSION_COOKIE};

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/service-account-email", get(auth::service_account_email))
        .route("/folders", get(drive::list_folder).post(drive::create_folder))
        .route("/folders/{id}", patch(drive::rename_folder))
        .route("/files", get(drive::list_files))
        .route("/files/{id}", delete(drive::delete_file))
        .route(
            "/upload",
            post(drive::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/download/{id}", get(drive::download))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/", get(auth::home))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/auth", get(auth::begin_login))
        .route("/oauth2callback", get(auth::finish_login))
        .merge(protected)
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

/// Cookie carrying a new session id.
pub(crate) fn session_cookie(id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Jar that removes the session cookie from the browser.
pub(crate) fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/").build())
}

fn unauthorized() -> Response {
    ApiError(AuthError::Unauthorized.into()).into_response()
}

/// Reject requests without a live session.
///
/// The session user is put into the request extensions. A 401 from the
/// handler means the storage credential was rejected, which also ends the
/// session.
async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let id = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => return unauthorized(),
    };

    let user = match state.sessions.get(&id).await {
        Some(user) => user,
        None => return unauthorized(),
    };
    request.extensions_mut().insert(user);

    let response = next.run(request).await;
    if response.status() == StatusCode::UNAUTHORIZED {
        warn!("Storage credential rejected, ending session");
        state.sessions.remove(&id).await;
        return (clear_session_cookie(jar), response).into_response();
    }

    response
}
