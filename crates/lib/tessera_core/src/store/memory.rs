//! In-process stores for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, SessionStore, StoreError};
use crate::models::auth::{Account, NewAccount, Session};

/// Accounts keyed by id.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account as-is.
    pub async fn insert(&self, account: Account) {
        self.accounts.write().await.insert(account.id, account);
    }

    /// Flip the active flag (the administrative soft-disable).
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.active = active;
        account.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict(format!("account {}", account.email)));
        }
        let now = Utc::now();
        let created = Account {
            id: Uuid::new_v4(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            active: true,
            role: account.role,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.password_hash = password_hash.to_string();
        account.updated_at = Utc::now();
        Ok(())
    }
}

/// Sessions keyed by id.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session as-is.
    pub async fn insert(&self, session: Session) {
        self.sessions.write().await.insert(session.id, session);
    }

    /// Current copy of a session, if present.
    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!("session {}", session.id)));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Session, StoreError> {
        self.get(id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    async fn update_expires_at(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))?;
        session.expires_at = Some(expires_at);
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_sessions_expired(
        &self,
        ids: &[Uuid],
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let mut updated = 0;
        for id in ids {
            if let Some(session) = sessions.get_mut(id) {
                session.expires_at = Some(expires_at);
                session.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at.is_none_or(|at| at >= cutoff));
        Ok((before - sessions.len()) as u64)
    }

    async fn find_all_active(&self) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.expires_at.is_none())
            .cloned()
            .collect())
    }
}
