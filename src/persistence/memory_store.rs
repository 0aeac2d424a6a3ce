// Copyright 2025 Cowboy AI, LLC.

//! Transient in-process metadata store

use super::{matches_prefix, EntryStream, MetadataStore, StorageResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory store keyed by exact identity match
///
/// Entries keep their insertion order, which is the order a
/// [`SnapshotFile`](super::SnapshotFile) writes them in. Cloning the store
/// shares the underlying map.
#[derive(Debug)]
pub struct MemoryStore<T> {
    entries: Arc<RwLock<IndexMap<String, T>>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> MemoryStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Create a store pre-populated with `entries`, in order
    pub fn from_entries(entries: impl IntoIterator<Item = (String, T)>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries.into_iter().collect())),
        }
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T: Clone> MemoryStore<T> {
    /// Copy of every `(key, document)` pair in insertion order
    pub async fn entries(&self) -> Vec<(String, T)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[async_trait]
impl<T> MetadataStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<T>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: T) -> StorageResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        debug!(key, "Stored document in memory");
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<EntryStream<T>> {
        let matching: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(key, _)| matches_prefix(key, prefix))
            .map(|(key, value)| Ok((key.clone(), value.clone())))
            .collect();
        Ok(stream::iter(matching).boxed())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        // shift_remove keeps the remaining entries in insertion order
        if self.entries.write().await.shift_remove(key).is_some() {
            debug!(key, "Deleted document from memory");
        }
        Ok(())
    }
}
