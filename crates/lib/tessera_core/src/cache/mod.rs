//! Ephemeral key-value cache with per-key expiration.
//!
//! The cache is an accelerator in front of durable storage. Call sites where a
//! cache failure must not change the outcome route the result through
//! [`advisory`]; every other call site propagates with `?`.

pub mod keys;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

pub use memory::MemoryCache;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache is closed")]
    Closed,

    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Raw string operations every cache backend provides.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch the raw value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Reset the expiry of an existing key. Returns `false` when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Remaining lifetime of `key`; `None` when the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn has(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove `key`. Returns `false` when there was no live entry to remove.
    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    /// The subset of `keys` not present in the cache, in input order.
    async fn missing_keys(&self, keys: &[String]) -> Result<Vec<String>, CacheError>;

    async fn close(&self) -> Result<(), CacheError>;
}

/// Typed JSON helpers layered over [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Fetch and deserialize the value stored under `key`.
    async fn get_into<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` and store it under `key` for `ttl`.
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw, ttl).await
    }
}

#[async_trait]
impl<C: Cache + ?Sized> CacheExt for C {}

/// Log and discard a failed best-effort cache operation.
///
/// Returns the value on success so callers can still branch on it.
pub fn advisory<T>(operation: &'static str, key: &str, result: Result<T, CacheError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation, key, error = %e, "advisory cache operation failed");
            None
        }
    }
}
