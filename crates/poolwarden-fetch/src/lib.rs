//! poolwarden-fetch: Pool inventory retrieval
//!
//! Lists machines through a provider driver with bounded retries, and keeps
//! a background-refreshed cache so that provider outages degrade freshness
//! instead of halting reconciliation.
//!
//! ```text
//! CachingPoolFetcher ── refresh every `refresh_interval` ──> RetryingPoolFetcher ──> Driver
//!        │
//!        └─ get(): cached snapshot, unless none yet (Unreachable)
//!                  or older than `reachability_timeout` (ReachabilityTimeout)
//! ```

pub mod caching;
pub mod error;
pub mod retrying;
pub mod storage;
pub mod traits;

pub use caching::{CacheSettings, CachingPoolFetcher};
pub use error::{FetchError, StorageError};
pub use retrying::{RetryPolicy, RetryingPoolFetcher};
pub use storage::StateStore;
pub use traits::{FetchOptions, PoolFetcher};
