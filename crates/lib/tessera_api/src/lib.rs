//! # tessera_api
//!
//! HTTP API library for Tessera.

pub mod cookies;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use tessera_core::auth::accounts::AccountService;
use tessera_core::auth::credentials::CredentialVerifier;
use tessera_core::auth::jwt::JwtIssuer;
use tessera_core::auth::session::SessionCoordinator;
use tessera_core::auth::signer::TokenSigner;
use tessera_core::cache::Cache;
use tessera_core::config::AuthConfig;
use tessera_core::store::{AccountStore, SessionStore};

use crate::handlers::{accounts, health, session, token};

/// Route paths.
pub mod routes {
    pub const GET_HEALTH: &str = "/health";
    pub const POST_AUTH_REGISTER: &str = "/auth/register";
    pub const POST_AUTH_PASSWORD: &str = "/auth/password";
    pub const POST_AUTH_SESSION_LOGIN: &str = "/auth/session/login";
    pub const POST_AUTH_SESSION_LOGOUT: &str = "/auth/session/logout";
    pub const GET_AUTH_SESSION: &str = "/auth/session";
    pub const POST_AUTH_TOKEN_LOGIN: &str = "/auth/token/login";
    pub const POST_AUTH_TOKEN_REFRESH: &str = "/auth/token/refresh";
    pub const POST_AUTH_TOKEN_LOGOUT: &str = "/auth/token/logout";
    pub const GET_AUTH_ME: &str = "/auth/me";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionCoordinator>,
    pub tokens: Arc<JwtIssuer>,
    pub accounts: Arc<AccountService>,
}

/// Collaborators the API is wired from.
pub struct Backends {
    pub accounts: Arc<dyn AccountStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub cache: Arc<dyn Cache>,
    pub signer: Arc<dyn TokenSigner>,
}

impl AppState {
    pub fn new(config: &AuthConfig, backends: Backends) -> Self {
        let verifier = CredentialVerifier::new(backends.accounts.clone());
        let sessions = Arc::new(SessionCoordinator::new(
            backends.sessions,
            backends.cache.clone(),
            verifier.clone(),
            config.session_lifetime,
        ));
        let tokens = Arc::new(JwtIssuer::new(
            backends.signer,
            backends.cache,
            verifier,
            config.access_token_ttl,
            config.refresh_token_ttl,
        ));
        let accounts = Arc::new(AccountService::new(backends.accounts, sessions.clone()));
        Self {
            sessions,
            tokens,
            accounts,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (session routes check their own cookie)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health))
        .route(routes::POST_AUTH_REGISTER, post(accounts::register_handler))
        .route(routes::POST_AUTH_PASSWORD, post(accounts::change_password_handler))
        .route(routes::POST_AUTH_SESSION_LOGIN, post(session::login_handler))
        .route(routes::POST_AUTH_SESSION_LOGOUT, post(session::logout_handler))
        .route(routes::GET_AUTH_SESSION, get(session::current_session_handler))
        .route(routes::POST_AUTH_TOKEN_LOGIN, post(token::login_handler))
        .route(routes::POST_AUTH_TOKEN_REFRESH, post(token::refresh_handler))
        .route(routes::POST_AUTH_TOKEN_LOGOUT, post(token::logout_handler));

    // Bearer-protected routes
    let protected = Router::new()
        .route(routes::GET_AUTH_ME, get(token::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
