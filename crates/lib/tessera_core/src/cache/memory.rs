//! In-process TTL cache backed by `DashMap`.
//!
//! Expired entries are evicted lazily on access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Cache, CacheError};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-memory [`Cache`] implementation.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    closed: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value that never expires.
    pub fn set_persistent(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.ensure_open()?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    /// Live entry for `key`, evicting it if it has expired.
    fn live_entry(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?.clone();
        if entry.is_live(now) {
            Some(entry)
        } else {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
            None
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.ensure_open()?;
        Ok(self.live_entry(key).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_open()?;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self
            .live_entry(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;
        Ok(self.live_entry(key).is_some())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn missing_keys(&self, keys: &[String]) -> Result<Vec<String>, CacheError> {
        self.ensure_open()?;
        Ok(keys
            .iter()
            .filter(|k| self.live_entry(k).is_none())
            .cloned()
            .collect())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.closed.store(true, Ordering::Release);
        self.entries.clear();
        Ok(())
    }
}
