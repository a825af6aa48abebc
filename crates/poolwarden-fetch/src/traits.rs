//! Pool fetcher trait

use async_trait::async_trait;
use poolwarden_api::MachinePool;

use crate::error::FetchError;

/// Options for a single `get` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bypass any cache and wait for a live fetch
    pub force_refresh: bool,
}

impl FetchOptions {
    #[must_use]
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// Source of machine pool snapshots
#[async_trait]
pub trait PoolFetcher: Send + Sync {
    /// Return a pool snapshot
    async fn get(&self, options: FetchOptions) -> Result<MachinePool, FetchError>;

    /// Stop any background work; safe to call more than once
    fn close(&self) {}
}
