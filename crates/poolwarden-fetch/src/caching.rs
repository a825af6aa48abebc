//! Background-refreshed pool cache
//!
//! Converts a flaky provider API into slightly stale data, bounded by an
//! explicit reachability timeout.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use poolwarden_api::events::TOPIC_POOL_FETCH;
use poolwarden_api::{AlertSeverity, MachinePool, PoolEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::error::FetchError;
use crate::storage::{POOL_SNAPSHOT_FILE, StateStore};
use crate::traits::{FetchOptions, PoolFetcher};

/// Refresh schedule and staleness budget of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Period of background refreshes
    pub refresh_interval: Duration,
    /// Maximum age of a snapshot that may still be served
    pub reachability_timeout: Duration,
}

/// Snapshot document as persisted, tagged with the pool it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSnapshot {
    pool_name: String,
    pool: MachinePool,
}

/// Last good snapshot and most recent failure
#[derive(Debug, Default)]
struct CacheState {
    pool: Option<MachinePool>,
    last_error: Option<String>,
}

/// State shared with the refresh task
struct CacheInner {
    pool_name: String,
    delegate: Arc<dyn PoolFetcher>,
    settings: CacheSettings,
    state: RwLock<CacheState>,
    /// Serializes background and forced refreshes
    refresh_lock: tokio::sync::Mutex<()>,
    store: Option<StateStore>,
    event_tx: Option<broadcast::Sender<PoolEvent>>,
    first_fetch_tx: watch::Sender<bool>,
}

impl CacheInner {
    /// Fetch through the delegate and update the cache
    ///
    /// Failures leave the previous snapshot in place.
    async fn refresh(&self) -> Result<MachinePool, FetchError> {
        let _guard = self.refresh_lock.lock().await;
        let result = self.delegate.get(FetchOptions::default()).await;

        match &result {
            Ok(pool) => {
                {
                    let mut state = self.state.write().await;
                    state.pool = Some(pool.clone());
                    state.last_error = None;
                }
                debug!(
                    machines = pool.machines().len(),
                    effective = pool.effective_count(),
                    "pool cache refreshed"
                );
                self.persist(pool).await;
            }
            Err(e) => {
                self.state.write().await.last_error = Some(e.to_string());
                warn!(error = %e, "pool refresh failed, keeping previous snapshot");
                if let Some(tx) = &self.event_tx {
                    let _ = tx.send(PoolEvent::alert(
                        TOPIC_POOL_FETCH,
                        AlertSeverity::Warning,
                        format!("failed to refresh machine pool: {e}"),
                    ));
                }
            }
        }

        self.first_fetch_tx.send_if_modified(|done| {
            let first = !*done;
            *done = true;
            first
        });

        result
    }

    async fn persist(&self, pool: &MachinePool) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = PersistedSnapshot {
            pool_name: self.pool_name.clone(),
            pool: pool.clone(),
        };
        if let Err(e) = store.save(POOL_SNAPSHOT_FILE, &snapshot).await {
            warn!(error = %e, "failed to persist pool snapshot");
        }
    }
}

/// Pool fetcher serving a periodically refreshed snapshot
///
/// The refresh task starts on construction and runs until `close` (or drop).
pub struct CachingPoolFetcher {
    inner: Arc<CacheInner>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CachingPoolFetcher {
    /// Restore the persisted snapshot of `pool_name` and start the refresh schedule
    ///
    /// A persisted snapshot of any other pool is ignored. The first refresh
    /// runs immediately.
    pub async fn spawn(
        pool_name: impl Into<String>,
        delegate: Arc<dyn PoolFetcher>,
        settings: CacheSettings,
        store: Option<StateStore>,
        event_tx: Option<broadcast::Sender<PoolEvent>>,
    ) -> Self {
        let pool_name = pool_name.into();
        let restored = match &store {
            Some(store) => restore_snapshot(store, &pool_name).await,
            None => None,
        };
        if let Some(pool) = &restored {
            info!(
                taken_at = %pool.timestamp(),
                machines = pool.machines().len(),
                "restored persisted pool snapshot"
            );
        }

        let (first_fetch_tx, _) = watch::channel(false);
        let inner = Arc::new(CacheInner {
            pool_name,
            delegate,
            settings,
            state: RwLock::new(CacheState {
                pool: restored,
                last_error: None,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
            store,
            event_tx,
            first_fetch_tx,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_refresh_loop(inner.clone(), shutdown_rx));

        info!(
            refresh_interval = ?settings.refresh_interval,
            reachability_timeout = ?settings.reachability_timeout,
            "pool cache started"
        );

        Self {
            inner,
            shutdown_tx,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Wait until the first refresh attempt has completed, successfully or not
    pub async fn await_first_fetch(&self) {
        let mut rx = self.inner.first_fetch_tx.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// The cached snapshot regardless of its age
    pub async fn cached_pool(&self) -> Option<MachinePool> {
        self.inner.state.read().await.pool.clone()
    }

    /// The error of the most recent failed refresh, cleared on success
    pub async fn last_error(&self) -> Option<String> {
        self.inner.state.read().await.last_error.clone()
    }

    #[must_use]
    pub fn settings(&self) -> CacheSettings {
        self.inner.settings
    }
}

#[async_trait]
impl PoolFetcher for CachingPoolFetcher {
    #[instrument(skip(self))]
    async fn get(&self, options: FetchOptions) -> Result<MachinePool, FetchError> {
        if options.force_refresh {
            return self.inner.refresh().await;
        }

        let state = self.inner.state.read().await;
        let Some(pool) = &state.pool else {
            return Err(FetchError::Unreachable {
                last_error: state.last_error.clone(),
            });
        };

        let age = pool.age(Utc::now()).to_std().unwrap_or_default();
        let timeout = self.inner.settings.reachability_timeout;
        if age > timeout {
            return Err(FetchError::ReachabilityTimeout {
                age,
                timeout,
                last_error: state.last_error.clone(),
            });
        }

        Ok(pool.clone())
    }

    fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut task) = self.task.lock()
            && let Some(handle) = task.take()
        {
            handle.abort();
            info!("pool cache stopped");
        }
    }
}

impl Drop for CachingPoolFetcher {
    fn drop(&mut self) {
        self.close();
    }
}

async fn restore_snapshot(store: &StateStore, pool_name: &str) -> Option<MachinePool> {
    match store.load::<PersistedSnapshot>(POOL_SNAPSHOT_FILE).await {
        Ok(Some(snapshot)) if snapshot.pool_name == pool_name => Some(snapshot.pool),
        Ok(Some(snapshot)) => {
            info!(
                pool = %pool_name,
                persisted_pool = %snapshot.pool_name,
                "ignoring persisted snapshot of another pool"
            );
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable persisted pool snapshot");
            None
        }
    }
}

async fn run_refresh_loop(inner: Arc<CacheInner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.settings.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    // Errors are recorded and alerted inside `refresh`
                    _ = inner.refresh() => {}
                    _ = shutdown.changed() => break,
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("pool refresh loop exited");
}
