//! Session-mode authentication handlers.
//!
//! The session id travels in the `tessera_session` cookie.

use axum::Json;
use axum::extract::State;
use axum_extra::extract::cookie::CookieJar;

use tessera_core::auth::session::LoginRequest as SessionLoginRequest;

use crate::AppState;
use crate::cookies;
use crate::error::AppResult;
use crate::extract::ClientMeta;
use crate::models::{LoginRequest, SessionResponse, SuccessResponse};

/// `POST /auth/session/login`: reuse the caller's session or log in with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    client: ClientMeta,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let current = cookies::session_id(&jar);
    let outcome = state
        .sessions
        .login(&SessionLoginRequest {
            current_session_id: Some(current.as_str()),
            email: &body.email,
            password: &body.password,
            ip: &client.ip,
            user_agent: &client.user_agent,
        })
        .await?;

    let response = SessionResponse::new(outcome.session(), outcome.is_reused());
    let cookie = cookies::session_cookie(
        &outcome.session().id.to_string(),
        state.sessions.lifetime(),
    );
    Ok((jar.add(cookie), Json(response)))
}

/// `POST /auth/session/logout`: end the session named by the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<SuccessResponse>)> {
    state.sessions.logout(&cookies::session_id(&jar)).await?;
    Ok((
        jar.add(cookies::clear_session_cookie()),
        Json(SuccessResponse { success: true }),
    ))
}

/// `GET /auth/session`: describe the session named by the cookie.
pub async fn current_session_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<Json<SessionResponse>> {
    let session = state.sessions.validate(&cookies::session_id(&jar)).await?;
    Ok(Json(SessionResponse::new(&session, true)))
}
