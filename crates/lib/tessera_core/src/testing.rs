//! Fixtures and failure-injecting doubles shared by unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::cache::{Cache, CacheError, MemoryCache};
use crate::models::auth::{Account, Role, Session};
use crate::store::{MemorySessionStore, SessionStore, StoreError};

/// Active, verified account whose hash matches `password` (bcrypt cost 4).
pub fn account_with_password(email: &str, password: &str) -> Account {
    let now = Utc::now();
    Account {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: hash_password(password, 4).unwrap(),
        active: true,
        role: Role::User,
        verified: true,
        created_at: now,
        updated_at: now,
    }
}

fn is_set(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

fn backend_down() -> CacheError {
    CacheError::Backend("connection refused".into())
}

/// [`MemoryCache`] wrapper that counts calls and fails selected operations.
#[derive(Default)]
pub struct FlakyCache {
    pub inner: MemoryCache,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_expire: AtomicBool,
    pub fail_ttl: AtomicBool,
    pub fail_del: AtomicBool,
    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
    pub expire_calls: AtomicUsize,
    pub del_calls: AtomicUsize,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Cache for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        bump(&self.get_calls);
        if is_set(&self.fail_get) {
            return Err(backend_down());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        bump(&self.set_calls);
        if is_set(&self.fail_set) {
            return Err(backend_down());
        }
        self.inner.set(key, value, ttl).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        bump(&self.expire_calls);
        if is_set(&self.fail_expire) {
            return Err(backend_down());
        }
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        if is_set(&self.fail_ttl) {
            return Err(backend_down());
        }
        self.inner.ttl(key).await
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.has(key).await
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        bump(&self.del_calls);
        if is_set(&self.fail_del) {
            return Err(backend_down());
        }
        self.inner.del(key).await
    }

    async fn missing_keys(&self, keys: &[String]) -> Result<Vec<String>, CacheError> {
        self.inner.missing_keys(keys).await
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.inner.close().await
    }
}

/// [`MemorySessionStore`] wrapper that records calls and can fail reads/writes.
///
/// `find_all_active` can be held until `release_scan` is notified, or made to
/// panic.
#[derive(Default)]
pub struct CountingSessionStore {
    pub inner: MemorySessionStore,
    pub fail_find: AtomicBool,
    pub fail_update: AtomicBool,
    pub hold_scan: AtomicBool,
    pub panic_scan: AtomicBool,
    pub release_scan: Notify,
    pub find_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub scan_calls: AtomicUsize,
    pub marked: Mutex<Vec<Uuid>>,
}

impl CountingSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for CountingSessionStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.create(session).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Session, StoreError> {
        bump(&self.find_calls);
        if is_set(&self.fail_find) {
            return Err(StoreError::Db(sqlx::Error::PoolTimedOut));
        }
        self.inner.find_by_id(id).await
    }

    async fn update_expires_at(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        bump(&self.update_calls);
        if is_set(&self.fail_update) {
            return Err(StoreError::Db(sqlx::Error::PoolTimedOut));
        }
        self.inner.update_expires_at(id, expires_at).await
    }

    async fn mark_sessions_expired(
        &self,
        ids: &[Uuid],
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.marked.lock().unwrap().extend_from_slice(ids);
        self.inner.mark_sessions_expired(ids, expires_at).await
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_expired_before(cutoff).await
    }

    async fn find_all_active(&self) -> Result<Vec<Session>, StoreError> {
        bump(&self.scan_calls);
        if is_set(&self.panic_scan) {
            panic!("session scan blew up");
        }
        if is_set(&self.hold_scan) {
            self.release_scan.notified().await;
        }
        self.inner.find_all_active().await
    }
}
