//! Authentication: credential verification, sessions and JWT pairs.
//!
//! - [`credentials`] checks email/password against the account store.
//! - [`session`] owns the server-side session protocol (reuse, create, logout).
//! - [`jwt`] owns access/refresh issuance, rotation and revocation.
//! - [`signer`] signs and parses tokens for a configured algorithm.
//! - [`accounts`] registers accounts and changes passwords.

pub mod accounts;
pub mod credentials;
pub mod jwt;
pub mod password;
pub mod session;
pub mod signer;

use thiserror::Error;

use crate::cache::CacheError;
use crate::store::StoreError;
use signer::SignerError;

/// Authentication errors.
///
/// Callers switch on the first six variants. The wrapped transport errors are
/// for logging only and must not be shown to end users.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Invalid session id")]
    InvalidSessionId,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Token error: {0}")]
    Token(#[from] SignerError),

    #[error("Password hash error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}
