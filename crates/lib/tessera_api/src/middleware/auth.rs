//! Authentication middleware: Bearer token extraction and JWT verification.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use tessera_core::models::auth::TokenClaims;

use crate::AppState;
use crate::error::AppError;

/// Claims of the verified access token, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount(pub TokenClaims);

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies it as
/// an access token, and injects `AuthenticatedAccount` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let claims = state.tokens.authenticate(token)?;
    request.extensions_mut().insert(AuthenticatedAccount(claims));

    Ok(next.run(request).await)
}
