//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP request/response
//! shapes in `tessera_api` (which use camelCase field names).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Identity record.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
    pub role: Role,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for account creation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Account fields denormalized onto a session and into token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub active: bool,
}

impl From<&Account> for AccountSnapshot {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            role: account.role,
            active: account.active,
        }
    }
}

/// Server-side authentication record.
///
/// `expires_at = None` means the session is active with no fixed end. A set
/// `expires_at` that is not in the future means the session has ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub account_id: Uuid,
    pub account: AccountSnapshot,
    pub ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Build a fresh, active session for `account`.
    pub fn new(id: Uuid, account: &Account, ip: &str, user_agent: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            account_id: account.id,
            account: AccountSnapshot::from(account),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Refresh-token record kept in the cache. Its presence is what makes the
/// refresh token redeemable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub jti: String,
    pub account_id: Uuid,
    pub user_agent: String,
    pub ip: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: account ID (standard JWT `sub` claim).
    pub sub: Uuid,
    /// Account email.
    pub email: String,
    /// Account role.
    pub role: Role,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// JWT ID, present on refresh tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl TokenClaims {
    /// Claims for `subject` valid from `issued_at` for `lifetime`.
    pub fn new(
        subject: &AccountSnapshot,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
        jti: Option<String>,
    ) -> Self {
        Self {
            sub: subject.id,
            email: subject.email.clone(),
            role: subject.role,
            iat: issued_at.timestamp(),
            exp: expiry(issued_at, lifetime),
            jti,
        }
    }

    /// The same identity, re-issued at `issued_at`.
    pub fn reissue(
        &self,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
        jti: Option<String>,
    ) -> Self {
        Self {
            sub: self.sub,
            email: self.email.clone(),
            role: self.role,
            iat: issued_at.timestamp(),
            exp: expiry(issued_at, lifetime),
            jti,
        }
    }

    /// `exp` as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

fn expiry(issued_at: DateTime<Utc>, lifetime: Duration) -> i64 {
    let secs = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
    issued_at.timestamp().saturating_add(secs)
}

/// Access/refresh token pair returned by JWT login and refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}
