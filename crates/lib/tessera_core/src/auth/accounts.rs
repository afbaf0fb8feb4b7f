//! Account registration and password change.

use std::sync::Arc;

use tracing::info;

use super::AuthError;
use super::credentials::normalize_email;
use super::password::{BCRYPT_COST, check_policy, hash_password, verify_password};
use super::session::SessionCoordinator;
use crate::models::auth::{Account, NewAccount, Role};
use crate::store::{AccountStore, StoreError};

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<SessionCoordinator>,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountStore>, sessions: Arc<SessionCoordinator>) -> Self {
        Self {
            accounts,
            sessions,
            bcrypt_cost: BCRYPT_COST,
        }
    }

    /// Override the bcrypt cost (tests use the minimum).
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Create a `user` account. New accounts are active and unverified.
    pub async fn register(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Validation("A valid email is required".into()));
        }
        check_policy(password)?;

        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let new_account = NewAccount {
            email,
            password_hash: hash_password(password, self.bcrypt_cost)?,
            role: Role::User,
        };
        let account = match self.accounts.create(&new_account).await {
            Ok(account) => account,
            // Lost a race with a concurrent registration.
            Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        };

        info!(account_id = %account.id, "account registered");
        Ok(account)
    }

    /// Change the password of the account owning `session_id`.
    pub async fn change_password(
        &self,
        session_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let session = self.sessions.validate(session_id).await?;
        let Some(account) = self.accounts.find_by_id(session.account_id).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(current_password, &account.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        check_policy(new_password)?;

        let hash = hash_password(new_password, self.bcrypt_cost)?;
        self.accounts.update_password_hash(account.id, &hash).await?;
        info!(account_id = %account.id, "password changed");
        Ok(())
    }
}
