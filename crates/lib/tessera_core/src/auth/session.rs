//! Server-side session protocol.
//!
//! The cache holds a copy of each live session under a sliding TTL; the
//! session table is the record of truth. Reads go cache first and fall back to
//! storage; cache writes are advisory.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use super::credentials::CredentialVerifier;
use crate::cache::{Cache, CacheExt, advisory, keys};
use crate::models::auth::{Account, Session};
use crate::store::{SessionStore, StoreError};
use crate::uuid::{parse_session_id, uuidv7};

/// Session-mode login input.
#[derive(Debug, Clone, Copy)]
pub struct LoginRequest<'a> {
    /// Session the client already holds, if any.
    pub current_session_id: Option<&'a str>,
    pub email: &'a str,
    pub password: &'a str,
    pub ip: &'a str,
    pub user_agent: &'a str,
}

/// Outcome of a session login.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLogin {
    /// The client's existing session is still valid; credentials were not checked.
    Reused(Session),
    /// Credentials were verified and a new session was stored.
    Created(Session),
}

impl SessionLogin {
    pub fn session(&self) -> &Session {
        match self {
            SessionLogin::Reused(s) | SessionLogin::Created(s) => s,
        }
    }

    pub fn into_session(self) -> Session {
        match self {
            SessionLogin::Reused(s) | SessionLogin::Created(s) => s,
        }
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, SessionLogin::Reused(_))
    }
}

/// Owns session reuse, creation, validation and logout.
pub struct SessionCoordinator {
    sessions: Arc<dyn SessionStore>,
    cache: Arc<dyn Cache>,
    verifier: CredentialVerifier,
    lifetime: Duration,
}

impl SessionCoordinator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        cache: Arc<dyn Cache>,
        verifier: CredentialVerifier,
        lifetime: Duration,
    ) -> Self {
        Self {
            sessions,
            cache,
            verifier,
            lifetime,
        }
    }

    /// Cache lifetime of a session entry.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Reuse the caller's session when it is still valid, otherwise verify
    /// credentials and create a new one.
    pub async fn login(&self, request: &LoginRequest<'_>) -> Result<SessionLogin, AuthError> {
        if let Some(id) = request.current_session_id.and_then(parse_session_id)
            && let Some(session) = self.find_reusable(id).await?
        {
            debug!(session_id = %id, "reusing session");
            return Ok(SessionLogin::Reused(session));
        }

        let account = self.verifier.verify(request.email, request.password).await?;
        let session = self
            .create_session(&account, request.ip, request.user_agent)
            .await?;
        Ok(SessionLogin::Created(session))
    }

    /// Resolve a session id for non-login flows.
    pub async fn validate(&self, session_id: &str) -> Result<Session, AuthError> {
        let id = parse_session_id(session_id).ok_or(AuthError::InvalidSessionId)?;
        self.find_reusable(id)
            .await?
            .ok_or(AuthError::SessionNotFound)
    }

    /// End a session. The cache delete is advisory; the storage update is not.
    pub async fn logout(&self, session_id: &str) -> Result<(), AuthError> {
        let id = parse_session_id(session_id).ok_or(AuthError::InvalidSessionId)?;
        let key = keys::session(id);
        advisory("cache.del", &key, self.cache.del(&key).await);

        match self.sessions.update_expires_at(id, Utc::now()).await {
            Ok(()) => {
                info!(session_id = %id, "session logged out");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(AuthError::SessionNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_session(
        &self,
        account: &Account,
        ip: &str,
        user_agent: &str,
    ) -> Result<Session, AuthError> {
        let session = Session::new(uuidv7(), account, ip, user_agent);
        self.sessions.create(&session).await?;

        let key = keys::session(session.id);
        advisory(
            "cache.set",
            &key,
            self.cache.set_json(&key, &session, self.lifetime).await,
        );

        info!(session_id = %session.id, account_id = %account.id, "session created");
        Ok(session)
    }

    /// Cache-then-storage read. `Ok(None)` means the session cannot be used.
    async fn find_reusable(&self, id: Uuid) -> Result<Option<Session>, AuthError> {
        let key = keys::session(id);

        let cached: Option<Option<Session>> =
            advisory("cache.get", &key, self.cache.get_into(&key).await);
        if let Some(Some(session)) = cached {
            self.renew_if_due(&key).await;
            return Ok(Some(session));
        }

        let session = match self.sessions.find_by_id(id).await {
            Ok(session) => session,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if session.is_expired() {
            debug!(session_id = %id, "stored session has expired");
            return Ok(None);
        }

        advisory(
            "cache.set",
            &key,
            self.cache.set_json(&key, &session, self.lifetime).await,
        );
        Ok(Some(session))
    }

    /// Slide the cache TTL back to the full lifetime once less than a third remains.
    async fn renew_if_due(&self, key: &str) {
        let Some(Some(remaining)) = advisory("cache.ttl", key, self.cache.ttl(key).await) else {
            return;
        };
        if remaining < self.lifetime / 3 {
            debug!(key, remaining_secs = remaining.as_secs(), "renewing session TTL");
            advisory(
                "cache.expire",
                key,
                self.cache.expire(key, self.lifetime).await,
            );
        }
    }
}
