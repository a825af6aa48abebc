//! JSON state persistence
//!
//! Documents are written to a temporary file and renamed into place, so a
//! crash mid-write never leaves a truncated document behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StorageError;

/// File name of the persisted pool snapshot
pub const POOL_SNAPSHOT_FILE: &str = "pool.json";

/// Directory-backed store of named JSON documents
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store rooted at `dir` (created lazily on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Load a document, returning `None` if it was never saved
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StorageError> {
        let path = self.path(name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, &e)),
        };

        let value = serde_json::from_str(&content).map_err(|e| StorageError::Serialization {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), "loaded persisted state");
        Ok(Some(value))
    }

    /// Save a document, replacing any previous version
    ///
    /// # Errors
    /// Returns an error if serialization or any filesystem operation fails.
    pub async fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        let path = self.path(name);
        let content =
            serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serialization {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, &e))?;

        let tmp = self.path(&format!("{name}.tmp"));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_error(&tmp, &e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, &e))?;

        debug!(path = %path.display(), "persisted state");
        Ok(())
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
