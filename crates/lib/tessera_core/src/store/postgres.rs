//! PostgreSQL-backed stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccountStore, SessionStore, StoreError};
use crate::models::auth::{Account, AccountSnapshot, NewAccount, Role, Session};

/// (id, email, password_hash, active, role, verified, created_at, updated_at)
type AccountRow = (
    Uuid,
    String,
    String,
    bool,
    String,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// (id, account_id, account_email, account_role, account_active, ip, user_agent,
///  created_at, updated_at, expires_at)
type SessionRow = (
    Uuid,
    Uuid,
    String,
    String,
    bool,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const ACCOUNT_COLUMNS: &str =
    "id, email, password_hash, active, role, verified, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, account_id, account_email, account_role, account_active, \
     ip, user_agent, created_at, updated_at, expires_at";

fn parse_role(raw: &str) -> Result<Role, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
    let (id, email, password_hash, active, role, verified, created_at, updated_at) = row;
    Ok(Account {
        id,
        email,
        password_hash,
        active,
        role: parse_role(&role)?,
        verified,
        created_at,
        updated_at,
    })
}

fn session_from_row(row: SessionRow) -> Result<Session, StoreError> {
    let (
        id,
        account_id,
        email,
        role,
        active,
        ip,
        user_agent,
        created_at,
        updated_at,
        expires_at,
    ) = row;
    Ok(Session {
        id,
        account_id,
        account: AccountSnapshot {
            id: account_id,
            email,
            role: parse_role(&role)?,
            active,
        },
        ip,
        user_agent,
        created_at,
        updated_at,
        expires_at,
    })
}

/// Accounts in the `accounts` table.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(account_from_row).transpose()
    }

    async fn create(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "INSERT INTO accounts (email, password_hash, role) VALUES ($1, $2, $3) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("account {}", account.email))
            }
            other => StoreError::Db(other),
        })?;
        account_from_row(row)
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {id}")));
        }
        Ok(())
    }
}

/// Sessions in the `sessions` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO sessions ({SESSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(session.id)
        .bind(session.account_id)
        .bind(&session.account.email)
        .bind(session.account.role.as_str())
        .bind(session.account.active)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Session, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("session {id}")))?;
        session_from_row(row)
    }

    async fn update_expires_at(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE sessions SET expires_at = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(expires_at)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("session {id}")));
        }
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
        let result = sqlx::query(
            "UPDATE sessions SET expires_at = $2, updated_at = now() WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_all_active(&self) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE expires_at IS NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(session_from_row).collect()
    }
}
