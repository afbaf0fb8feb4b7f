//! Registration and password change handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::cookies;
use crate::error::AppResult;
use crate::models::{AccountResponse, ChangePasswordRequest, RegisterRequest, SuccessResponse};

/// `POST /auth/register`: create a new user account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    let account = state.accounts.register(&body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// `POST /auth/password`: change the password of the session's account.
pub async fn change_password_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<SuccessResponse>> {
    state
        .accounts
        .change_password(
            &cookies::session_id(&jar),
            &body.current_password,
            &body.new_password,
        )
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}
