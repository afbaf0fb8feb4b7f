//! Background session maintenance.
//!
//! Two timers drive one loop:
//! - **expire untracked**: active sessions whose cache entry is gone are given
//!   `expires_at = now` in storage.
//! - **purge**: sessions that expired longer ago than the retention window are
//!   deleted.
//!
//! Each task kind runs at most once at a time. A tick that arrives while the
//! previous run of the same kind is still going is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{Cache, CacheError, keys};
use crate::config::{MAX_DURATION, MaintenanceConfig};
use crate::store::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("Session maintenance cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    ExpireUntracked,
    Purge,
}

impl Task {
    fn name(self) -> &'static str {
        match self {
            Task::ExpireUntracked => "expire_untracked",
            Task::Purge => "purge",
        }
    }
}

/// Clears the running flag when a task ends, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct SessionMaintenance {
    sessions: Arc<dyn SessionStore>,
    cache: Arc<dyn Cache>,
    config: MaintenanceConfig,
    expiring: Arc<AtomicBool>,
    purging: Arc<AtomicBool>,
}

impl SessionMaintenance {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        cache: Arc<dyn Cache>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            sessions,
            cache,
            config,
            expiring: Arc::new(AtomicBool::new(false)),
            purging: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tick until `cancel` fires, then wait for in-flight tasks.
    ///
    /// Always ends with [`MaintenanceError::Cancelled`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), MaintenanceError> {
        let start = Instant::now();
        let expire_every = self.config.expire_interval.min(MAX_DURATION);
        let purge_every = self.config.purge_interval.min(MAX_DURATION);
        let mut expire_tick = interval_at(start + expire_every, expire_every);
        let mut purge_tick = interval_at(start + purge_every, purge_every);
        expire_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        purge_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut tasks = JoinSet::new();
        info!(
            expire_interval_secs = self.config.expire_interval.as_secs(),
            purge_interval_secs = self.config.purge_interval.as_secs(),
            "session maintenance started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = expire_tick.tick() => {
                    self.dispatch(&mut tasks, Task::ExpireUntracked);
                }
                _ = purge_tick.tick() => {
                    self.dispatch(&mut tasks, Task::Purge);
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined),
            }
        }

        info!(in_flight = tasks.len(), "session maintenance stopping");
        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
        Err(MaintenanceError::Cancelled)
    }

    /// Spawn `task` unless a run of the same kind is in progress.
    ///
    /// Returns whether a run was started.
    pub fn dispatch(&self, tasks: &mut JoinSet<()>, task: Task) -> bool {
        let flag = match task {
            Task::ExpireUntracked => Arc::clone(&self.expiring),
            Task::Purge => Arc::clone(&self.purging),
        };
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(task = task.name(), "previous run still in progress, tick dropped");
            return false;
        }

        let this = self.clone();
        tasks.spawn(async move {
            let _running = RunningGuard(flag);
            let result = match task {
                Task::ExpireUntracked => this.expire_untracked().await,
                Task::Purge => this.purge().await,
            };
            match result {
                Ok(rows) => debug!(task = task.name(), rows, "maintenance run finished"),
                Err(e) => error!(task = task.name(), error = %e, "maintenance run failed"),
            }
        });
        true
    }

    /// Expire active sessions that have no cache entry. Returns rows updated.
    pub async fn expire_untracked(&self) -> Result<u64, MaintenanceError> {
        let active = self.sessions.find_all_active().await?;
        if active.is_empty() {
            return Ok(0);
        }

        let session_keys: Vec<String> = active.iter().map(|s| keys::session(s.id)).collect();
        let missing = self.cache.missing_keys(&session_keys).await?;
        let ids: Vec<Uuid> = missing
            .iter()
            .filter_map(|key| keys::session_id_from_key(key))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let updated = self.sessions.mark_sessions_expired(&ids, Utc::now()).await?;
        info!(
            active = active.len(),
            untracked = ids.len(),
            updated,
            "expired untracked sessions"
        );
        Ok(updated)
    }

    /// Delete sessions expired before the retention cutoff. Returns rows deleted.
    pub async fn purge(&self) -> Result<u64, MaintenanceError> {
        let cutoff = self.purge_cutoff(Utc::now());
        let deleted = self.sessions.delete_expired_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "purged expired sessions");
        }
        Ok(deleted)
    }

    fn purge_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "maintenance task panicked");
        } else {
            warn!(error = %e, "maintenance task aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheExt, MemoryCache};
    use crate::models::auth::{Account, Session};
    use crate::testing::{CountingSessionStore, account_with_password};
    use crate::uuid::uuidv7;

    struct Fixture {
        account: Account,
        sessions: Arc<CountingSessionStore>,
        cache: Arc<MemoryCache>,
        worker: SessionMaintenance,
    }

    fn fixture(config: MaintenanceConfig) -> Fixture {
        let sessions = Arc::new(CountingSessionStore::new());
        let cache = Arc::new(MemoryCache::new());
        let worker = SessionMaintenance::new(sessions.clone(), cache.clone(), config);
        Fixture {
            account: account_with_password("daniel@example.com", "Abc1234!"),
            sessions,
            cache,
            worker,
        }
    }

    async fn add_session(f: &Fixture, cached: bool, expires_at: Option<DateTime<Utc>>) -> Uuid {
        let mut session = Session::new(uuidv7(), &f.account, "", "");
        session.expires_at = expires_at;
        f.sessions.inner.insert(session.clone()).await;
        if cached {
            f.cache
                .set_json(&keys::session(session.id), &session, Duration::from_secs(60))
                .await
                .unwrap();
        }
        session.id
    }

    fn marked(f: &Fixture) -> Vec<Uuid> {
        let mut ids = f.sessions.marked.lock().unwrap().clone();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn expires_exactly_the_uncached_sessions() {
        let f = fixture(MaintenanceConfig::default());
        let mut untracked = Vec::new();
        let mut tracked = Vec::new();
        for i in 0..7 {
            if i % 3 == 0 {
                untracked.push(add_session(&f, false, None).await);
            } else {
                tracked.push(add_session(&f, true, None).await);
            }
        }
        untracked.sort();

        let updated = f.worker.expire_untracked().await.unwrap();

        assert_eq!(updated, untracked.len() as u64);
        assert_eq!(marked(&f), untracked);
        for id in &untracked {
            assert!(f.sessions.inner.get(*id).await.unwrap().expires_at.is_some());
        }
        for id in &tracked {
            assert!(f.sessions.inner.get(*id).await.unwrap().expires_at.is_none());
        }
    }

    #[tokio::test]
    async fn nothing_to_expire_when_all_sessions_are_cached() {
        let f = fixture(MaintenanceConfig::default());
        add_session(&f, true, None).await;
        assert_eq!(f.worker.expire_untracked().await.unwrap(), 0);
        assert!(marked(&f).is_empty());
    }

    #[tokio::test]
    async fn cache_failure_aborts_the_run() {
        let f = fixture(MaintenanceConfig::default());
        add_session(&f, false, None).await;
        f.cache.close().await.unwrap();
        let result = f.worker.expire_untracked().await;
        assert!(matches!(result, Err(MaintenanceError::Cache(CacheError::Closed))));
        assert!(marked(&f).is_empty());
    }

    #[tokio::test]
    async fn purge_respects_retention_cutoff() {
        let f = fixture(MaintenanceConfig::default());
        let now = Utc::now();
        let old = add_session(&f, false, Some(now - chrono::Duration::days(31))).await;
        let recent = add_session(&f, false, Some(now - chrono::Duration::days(29))).await;
        let active = add_session(&f, false, None).await;

        assert_eq!(f.worker.purge().await.unwrap(), 1);
        assert!(f.sessions.inner.get(old).await.is_none());
        assert!(f.sessions.inner.get(recent).await.is_some());
        assert!(f.sessions.inner.get(active).await.is_some());
    }

    #[test]
    fn oversized_retention_clamps_cutoff() {
        let f = fixture(MaintenanceConfig {
            retention: Duration::MAX,
            ..MaintenanceConfig::default()
        });
        assert_eq!(f.worker.purge_cutoff(Utc::now()), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn oversized_intervals_are_clamped() {
        let f = fixture(MaintenanceConfig {
            expire_interval: Duration::MAX,
            purge_interval: Duration::MAX,
            ..MaintenanceConfig::default()
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = f.worker.run(cancel).await;
        assert!(matches!(result, Err(MaintenanceError::Cancelled)));
    }

    #[tokio::test]
    async fn overlapping_ticks_are_dropped() {
        let f = fixture(MaintenanceConfig::default());
        f.sessions.hold_scan.store(true, Ordering::SeqCst);
        let mut tasks = JoinSet::new();

        assert!(f.worker.dispatch(&mut tasks, Task::ExpireUntracked));
        assert!(!f.worker.dispatch(&mut tasks, Task::ExpireUntracked));
        assert!(f.worker.dispatch(&mut tasks, Task::Purge));

        f.sessions.release_scan.notify_one();
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }
        assert_eq!(f.sessions.scan_calls.load(Ordering::SeqCst), 1);

        f.sessions.hold_scan.store(false, Ordering::SeqCst);
        assert!(f.worker.dispatch(&mut tasks, Task::ExpireUntracked));
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }
    }

    #[tokio::test]
    async fn panicking_run_releases_its_flag() {
        let f = fixture(MaintenanceConfig::default());
        f.sessions.panic_scan.store(true, Ordering::SeqCst);
        let mut tasks = JoinSet::new();

        assert!(f.worker.dispatch(&mut tasks, Task::ExpireUntracked));
        let joined = tasks.join_next().await.unwrap();
        assert!(joined.unwrap_err().is_panic());

        f.sessions.panic_scan.store(false, Ordering::SeqCst);
        assert!(f.worker.dispatch(&mut tasks, Task::ExpireUntracked));
        tasks.join_next().await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_ticks_until_cancelled() {
        let f = fixture(MaintenanceConfig {
            expire_interval: Duration::from_millis(10),
            purge_interval: Duration::from_secs(3600),
            ..MaintenanceConfig::default()
        });
        let id = add_session(&f, false, None).await;

        let cancel = CancellationToken::new();
        let worker = f.worker.clone();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while f.sessions.inner.get(id).await.unwrap().expires_at.is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(MaintenanceError::Cancelled)));
    }

    #[tokio::test]
    async fn run_waits_for_in_flight_tasks_on_cancel() {
        let f = fixture(MaintenanceConfig {
            expire_interval: Duration::from_millis(10),
            purge_interval: Duration::from_secs(3600),
            ..MaintenanceConfig::default()
        });
        f.sessions.hold_scan.store(true, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let worker = f.worker.clone();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { worker.run(cancel).await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while f.sessions.scan_calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());

        f.sessions.release_scan.notify_one();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(MaintenanceError::Cancelled)));
    }
}
