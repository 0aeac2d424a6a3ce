// Copyright 2025 Cowboy AI, LLC.

//! # Persistence Layer
//!
//! Pluggable storage for metadata documents, keyed by identity. Every backend
//! implements [`MetadataStore`]; they differ in durability and consistency.
//!
//! ## Components
//!
//! - **Memory Store**: transient, process-local, insertion-ordered map
//! - **Attached Store**: one slot per type, keys are ignored
//! - **NATS KV Store**: durable JetStream KV with acknowledged writes
//! - **Snapshot File**: whole-document JSON snapshot of a memory store

pub mod attached_store;
pub mod memory_store;
pub mod nats_kv_store;
pub mod snapshot_file;

pub use attached_store::{AttachedSlots, AttachedStore};
pub use memory_store::MemoryStore;
pub use nats_kv_store::{
    CommitResult, InMemoryBucket, JetStreamBucket, KvBucket, NatsKvConfig, NatsKvStore,
    NatsKvStoreBuilder,
};
pub use snapshot_file::SnapshotFile;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend did not acknowledge a write
    #[error("Write to {key} was not acknowledged: {detail}")]
    WriteFailure {
        /// Key that was being written
        key: String,
        /// Backend-native failure detail
        detail: String,
    },

    /// Error from the underlying storage system
    #[error("Backend error: {0}")]
    Backend(String),

    /// Error serializing or deserializing a document
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stream of `(key, document)` entries returned by [`MetadataStore::list`]
pub type EntryStream<T> = BoxStream<'static, StorageResult<(String, T)>>;

/// Key/value contract every metadata backend implements
///
/// `set` only returns once the backend has accepted the write. `get` never
/// writes; defaults for absent keys come from [`MetadataStoreExt::get_or_else`].
#[async_trait]
pub trait MetadataStore<T>: Send + Sync {
    /// Load the document stored under `key`
    async fn get(&self, key: &str) -> StorageResult<Option<T>>;

    /// Persist `value` under `key`, replacing any previous document
    async fn set(&self, key: &str, value: T) -> StorageResult<()>;

    /// Stream stored entries whose keys start with `prefix`
    ///
    /// Ordering is backend-defined.
    async fn list(&self, prefix: Option<&str>) -> StorageResult<EntryStream<T>>;

    /// Remove the document under `key`; absent keys are ignored
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Convenience operations available on every [`MetadataStore`]
#[async_trait]
pub trait MetadataStoreExt<T: Send + 'static>: MetadataStore<T> {
    /// Load `key`, or produce a default without persisting it
    async fn get_or_else<F>(&self, key: &str, default: F) -> StorageResult<T>
    where
        F: FnOnce() -> T + Send,
    {
        Ok(match self.get(key).await? {
            Some(value) => value,
            None => default(),
        })
    }

    /// Whether a document is stored under `key`
    async fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

impl<T: Send + 'static, S> MetadataStoreExt<T> for S where S: MetadataStore<T> + ?Sized {}

/// Whether `key` falls under an optional prefix filter
pub(crate) fn matches_prefix(key: &str, prefix: Option<&str>) -> bool {
    prefix.map_or(true, |prefix| key.starts_with(prefix))
}
