//! Sign-in, sign-out and session inspection.

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::Json;
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{clear_session_cookie, session_cookie};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use drivegate_common::{AuthError, Error, SESSION_COOKIE};

/// Session of the request's cookie, if live.
async fn current_session(state: &AppState, jar: &CookieJar) -> Option<(String, drivegate_common::SessionUser)> {
    let id = jar.get(SESSION_COOKIE)?.value().to_string();
    let user = state.sessions.get(&id).await?;
    Some((id, user))
}

/// Landing page. Shows the session id to hand to the terminal client.
pub async fn home(State(state): State<AppState>, jar: CookieJar) -> String {
    match current_session(&state, &jar).await {
        Some((id, user)) => format!(
            "Signed in as {}.\n\nConnect the terminal client with:\n  drivegate --session {}\n",
            user.display(),
            id
        ),
        None => "drivegate server\n\nNot signed in. GET /auth for the sign-in URL.\n".to_string(),
    }
}

pub async fn me(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Json<Value>> {
    let (_, user) = current_session(&state, &jar)
        .await
        .ok_or(ApiError(AuthError::Unauthorized.into()))?;
    Ok(Json(json!({ "user": user })))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.remove(cookie.value()).await {
            info!("Session ended");
        }
    }

    (clear_session_cookie(jar), Json(json!({ "success": true })))
}

pub async fn begin_login(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (url, csrf) = state.login.authorization_url().map_err(|e| match e {
        Error::Auth(AuthError::NotConfigured) => {
            ApiError::bad_request("OAuth 2.0 is not configured on this server.")
        }
        other => other.into(),
    })?;
    state.sessions.begin_login(csrf).await;

    Ok(Json(json!({
        "authUrl": url,
        "message": "Open this URL in a browser to sign in with Google.",
    })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// OAuth redirect target.
///
/// Persists the interactive credential, so the storage client switches to
/// the signed-in account, then starts a session.
pub async fn finish_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<(CookieJar, Redirect)> {
    if let Some(reason) = query.error {
        return Err(ApiError::bad_request(format!("Sign-in was cancelled: {}", reason)));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing authorization code."))?;

    let csrf = query.state.unwrap_or_default();
    if !state.sessions.finish_login(&csrf).await {
        return Err(ApiError::bad_request("Invalid or expired sign-in state."));
    }

    let credential = state.login.exchange_code(&code).await?;
    let user = state.login.fetch_user(&credential).await?;

    if !state.allowed_users.permits(&user.email) {
        info!("Rejected sign-in from {}", user.email);
        return Err(ApiError(Error::PermissionDenied(format!(
            "{} is not allowed to use this server.",
            user.email
        ))));
    }

    state.credentials.store_interactive(&credential).await?;

    info!("Signed in {}", user.email);
    let id = state.sessions.create(user).await;

    Ok((jar.add(session_cookie(id)), Redirect::to("/?login=success")))
}

pub async fn service_account_email(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let email = state.credentials.service_account_email().await?;
    Ok(Json(json!({
        "serviceAccountEmail": email,
        "message": "Share the folder with this address to give the service account access.",
    })))
}
