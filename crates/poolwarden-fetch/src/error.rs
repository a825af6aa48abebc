//! Error types for poolwarden-fetch

use std::time::Duration;

use poolwarden_driver::DriverError;
use thiserror::Error;

/// Errors returned when a pool snapshot cannot be provided
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// No fetch has ever succeeded
    #[error("pool unreachable: no fetch has ever succeeded{}", describe_last_error(.last_error))]
    Unreachable {
        /// Most recent fetch failure, if any attempt was made
        last_error: Option<String>,
    },

    /// The cached snapshot is too old to be served
    #[error(
        "reachability timeout exceeded: last successful fetch {}s ago (timeout {}s){}",
        .age.as_secs(),
        .timeout.as_secs(),
        describe_last_error(.last_error)
    )]
    ReachabilityTimeout {
        /// Age of the cached snapshot
        age: Duration,
        /// Configured reachability timeout
        timeout: Duration,
        /// Most recent fetch failure
        last_error: Option<String>,
    },

    /// Transient failures persisted through every retry
    #[error("pool fetch failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Total attempts made, including the first
        attempts: u32,
        /// Error of the final attempt
        source: DriverError,
    },

    /// Non-retryable driver failure
    #[error("pool fetch failed: {0}")]
    Driver(#[from] DriverError),
}

impl FetchError {
    /// Whether the fetcher is masking (or failed to mask) a provider outage
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            FetchError::Unreachable { .. } | FetchError::ReachabilityTimeout { .. }
        )
    }
}

fn describe_last_error(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!("; last error: {e}"))
        .unwrap_or_default()
}

/// Errors reading or writing persisted state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("storage I/O error on {path}: {message}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        message: String,
    },

    #[error("failed to (de)serialize {path}: {message}")]
    Serialization {
        /// File involved
        path: String,
        /// Underlying error
        message: String,
    },
}
