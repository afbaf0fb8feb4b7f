//! Email/password verification against the account store.

use std::sync::Arc;

use tracing::debug;

use super::AuthError;
use super::password::verify_password;
use crate::models::auth::Account;
use crate::store::AccountStore;

/// Canonical form used for storing and looking up emails.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Checks credentials without side effects.
///
/// An unknown email and a wrong password both yield
/// [`AuthError::InvalidCredentials`].
#[derive(Clone)]
pub struct CredentialVerifier {
    accounts: Arc<dyn AccountStore>,
}

impl CredentialVerifier {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    pub async fn verify(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let email = normalize_email(email);
        let Some(account) = self.accounts.find_by_email(&email).await? else {
            debug!("login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !account.active {
            debug!(account_id = %account.id, "login for disabled account");
            return Err(AuthError::AccountDisabled);
        }

        if !verify_password(password, &account.password_hash)? {
            debug!(account_id = %account.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(account)
    }
}
