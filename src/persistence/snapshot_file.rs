// Copyright 2025 Cowboy AI, LLC.

//! Whole-document JSON snapshots of a [`MemoryStore`]
//!
//! The file holds one JSON array of `[key, document]` pairs in the store's
//! insertion order:
//!
//! ```json
//! [
//!   ["schema:Order", { "title": "Order" }]
//! ]
//! ```

use super::{MemoryStore, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// A snapshot file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Snapshot stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild a store from the snapshot, or `None` if the file does not exist
    pub async fn load<T>(&self) -> StorageResult<Option<MemoryStore<T>>>
    where
        T: DeserializeOwned,
    {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No metadata snapshot");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<(String, T)> = serde_json::from_slice(&content)?;
        Ok(Some(MemoryStore::from_entries(entries)))
    }

    /// Replace the snapshot with the current contents of `store`
    ///
    /// The document is written to a uniquely named sibling and renamed over
    /// the target, so readers see either the old snapshot or a complete new
    /// one, even while other saves to the same path are in flight.
    pub async fn save<T>(&self, store: &MemoryStore<T>) -> StorageResult<()>
    where
        T: Serialize + Clone,
    {
        let entries = store.entries().await;
        let content = serde_json::to_vec_pretty(&entries)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging = self.staging_path();
        if let Err(e) = write_then_rename(&staging, &self.path, &content).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        info!(
            path = %self.path.display(),
            entries = entries.len(),
            "Wrote metadata snapshot"
        );
        Ok(())
    }

    /// Unique sibling of the snapshot, one per save
    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path
            .with_file_name(format!(".{name}-{}.tmp", Uuid::new_v4()))
    }
}

async fn write_then_rename(staging: &Path, target: &Path, content: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(staging, content).await?;
    tokio::fs::rename(staging, target).await
}
