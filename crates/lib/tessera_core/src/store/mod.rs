//! Durable account and session storage.
//!
//! Two backends implement the same traits: PostgreSQL ([`postgres`]) for
//! deployments and an in-process store ([`memory`]) for development and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{Account, NewAccount, Session};

pub use memory::{MemoryAccountStore, MemorySessionStore};
pub use postgres::{PgAccountStore, PgSessionStore};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Account persistence. Lookups return `Ok(None)` when nothing matches.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str)
    -> Result<(), StoreError>;
}

/// Session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), StoreError>;

    /// Fetch a session; [`StoreError::NotFound`] when no row matches.
    async fn find_by_id(&self, id: Uuid) -> Result<Session, StoreError>;

    async fn update_expires_at(&self, id: Uuid, expires_at: DateTime<Utc>)
    -> Result<(), StoreError>;

    /// Set `expires_at` on every listed session. An empty list is a no-op.
    async fn mark_sessions_expired(
        &self,
        ids: &[Uuid],
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Hard-delete sessions whose `expires_at` is before `cutoff`.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// All sessions with no `expires_at`.
    async fn find_all_active(&self) -> Result<Vec<Session>, StoreError>;
}
