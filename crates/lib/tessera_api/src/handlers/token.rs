//! JWT-mode authentication handlers.

use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::ClientMeta;
use crate::middleware::auth::AuthenticatedAccount;
use crate::models::{LoginRequest, MeResponse, RefreshRequest, SuccessResponse, TokenResponse};

/// `POST /auth/token/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state
        .tokens
        .login(&body.email, &body.password, &client.ip, &client.user_agent)
        .await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/token/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state.tokens.refresh(&body.refresh_token).await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/token/logout`: revoke a refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<SuccessResponse>> {
    state.tokens.revoke(&body.refresh_token).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// `GET /auth/me`: identity carried by the bearer access token.
pub async fn me_handler(
    Extension(AuthenticatedAccount(claims)): Extension<AuthenticatedAccount>,
) -> Json<MeResponse> {
    Json(claims.into())
}
