// Copyright 2025 Cowboy AI, LLC.

//! Durable metadata store backed by NATS JetStream KV
//!
//! Documents are JSON encoded and written through the [`KvBucket`] seam. A
//! write only succeeds when the bucket acknowledges the commit; anything else
//! surfaces as [`StorageError::WriteFailure`] carrying the bucket's detail.

use super::{matches_prefix, EntryStream, MetadataStore, StorageError, StorageResult};
use async_nats::jetstream::{self, kv};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Configuration for the NATS KV metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsKvConfig {
    /// KV bucket name
    pub bucket_name: String,
    /// Bucket description shown by NATS tooling
    pub description: String,
    /// History depth for KV entries
    pub history: i64,
    /// TTL for entries (0 = no expiry)
    pub ttl_seconds: u64,
    /// Largest accepted document in bytes (-1 = server default)
    pub max_value_size: i32,
}

impl Default for NatsKvConfig {
    fn default() -> Self {
        Self {
            bucket_name: "metadata".to_string(),
            description: "Type metadata documents".to_string(),
            history: 5,
            ttl_seconds: 0,
            max_value_size: 1024 * 1024,
        }
    }
}

impl NatsKvConfig {
    fn to_kv_config(&self) -> kv::Config {
        kv::Config {
            bucket: self.bucket_name.clone(),
            description: self.description.clone(),
            history: self.history,
            max_age: if self.ttl_seconds > 0 {
                Duration::from_secs(self.ttl_seconds)
            } else {
                Duration::ZERO
            },
            max_value_size: self.max_value_size,
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        }
    }
}

/// Outcome of a bucket write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Whether the bucket acknowledged the write
    pub ok: bool,
    /// Revision assigned to the write, when acknowledged
    pub revision: Option<u64>,
    /// Backend-native detail for a rejected write
    pub detail: Option<String>,
}

impl CommitResult {
    /// An acknowledged write at `revision`
    pub fn acknowledged(revision: u64) -> Self {
        Self {
            ok: true,
            revision: Some(revision),
            detail: None,
        }
    }

    /// A write the bucket refused
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            revision: None,
            detail: Some(detail.into()),
        }
    }
}

/// Raw key/value bucket the durable store talks to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvBucket: Send + Sync {
    /// Write `value` under `key` and report whether it was acknowledged
    async fn commit(&self, key: &str, value: Bytes) -> StorageResult<CommitResult>;

    /// Read the current value under `key`
    async fn entry(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Remove `key`
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Every live key in the bucket
    async fn keys(&self) -> StorageResult<Vec<String>>;
}

/// [`KvBucket`] backed by a JetStream key/value store
pub struct JetStreamBucket {
    store: kv::Store,
}

impl JetStreamBucket {
    /// Create (or bind to) the bucket described by `config`
    pub async fn create(
        context: &jetstream::Context,
        config: &NatsKvConfig,
    ) -> StorageResult<Self> {
        let store = context
            .create_key_value(config.to_kv_config())
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to create KV bucket: {e}")))?;

        info!(bucket = %config.bucket_name, "Metadata KV bucket ready");
        Ok(Self { store })
    }

    /// Bind to an existing bucket
    pub async fn open(context: &jetstream::Context, bucket_name: &str) -> StorageResult<Self> {
        let store = context
            .get_key_value(bucket_name)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to get KV store: {e}")))?;
        Ok(Self { store })
    }
}

#[async_trait]
impl KvBucket for JetStreamBucket {
    async fn commit(&self, key: &str, value: Bytes) -> StorageResult<CommitResult> {
        match self.store.put(key, value).await {
            Ok(revision) => Ok(CommitResult::acknowledged(revision)),
            Err(e) => Ok(CommitResult::rejected(e.to_string())),
        }
    }

    async fn entry(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.store
            .get(key)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to load {key}: {e}")))
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.store
            .delete(key)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to delete {key}: {e}")))
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let keys = self
            .store
            .keys()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to list keys: {e}")))?;
        keys.map_err(|e| StorageError::Backend(format!("Failed to list keys: {e}")))
            .try_collect()
            .await
    }
}

/// Process-local [`KvBucket`] with a switch to refuse writes
///
/// Useful for tests and demos that need the durable store's semantics
/// without a NATS server.
#[derive(Default)]
pub struct InMemoryBucket {
    entries: RwLock<IndexMap<String, Bytes>>,
    revision: AtomicU64,
    reject_writes: AtomicBool,
}

impl InMemoryBucket {
    /// Create an empty bucket that acknowledges every write
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or accept again) subsequent writes
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvBucket for InMemoryBucket {
    async fn commit(&self, key: &str, value: Bytes) -> StorageResult<CommitResult> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Ok(CommitResult::rejected("write rejected by bucket"));
        }
        self.entries.write().await.insert(key.to_string(), value);
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CommitResult::acknowledged(revision))
    }

    async fn entry(&self, key: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().await.shift_remove(key);
        Ok(())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// Durable metadata store over a [`KvBucket`]
pub struct NatsKvStore<T> {
    bucket: Arc<dyn KvBucket>,
    bucket_name: String,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for NatsKvStore<T> {
    fn clone(&self) -> Self {
        Self {
            bucket: Arc::clone(&self.bucket),
            bucket_name: self.bucket_name.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T> NatsKvStore<T> {
    /// Create a store over an already-bound bucket
    pub fn new(bucket: Arc<dyn KvBucket>, bucket_name: impl Into<String>) -> Self {
        Self {
            bucket,
            bucket_name: bucket_name.into(),
            _phantom: PhantomData,
        }
    }

    /// Create the JetStream bucket described by `config` and bind to it
    pub async fn connect(client: Client, config: NatsKvConfig) -> StorageResult<Self> {
        let context = jetstream::new(client);
        let bucket = JetStreamBucket::create(&context, &config).await?;
        Ok(Self::new(Arc::new(bucket), config.bucket_name))
    }

    /// Name of the bucket documents are written to
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }
}

/// Escape characters JetStream does not accept in keys
///
/// Alphanumerics, `-`, `/` and `_` pass through; every other byte becomes
/// `=XX`. The mapping preserves prefixes, so prefix scans can compare
/// encoded keys.
pub(crate) fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'/' | b'_') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("={byte:02X}"));
        }
    }
    encoded
}

/// Reverse of [`encode_key`]; `None` for keys this store did not write
///
/// Only canonical encodings decode, so every listed key can be fetched
/// again through [`encode_key`].
pub(crate) fn decode_key(encoded: &str) -> Option<String> {
    let raw = encoded.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut index = 0;
    while index < raw.len() {
        if raw[index] == b'=' {
            let hex = encoded.get(index + 1..index + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            index += 3;
        } else {
            bytes.push(raw[index]);
            index += 1;
        }
    }
    String::from_utf8(bytes)
        .ok()
        .filter(|key| encode_key(key) == encoded)
}

#[async_trait]
impl<T> MetadataStore<T> for NatsKvStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<T>> {
        match self.bucket.entry(&encode_key(key)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: T) -> StorageResult<()> {
        let data = serde_json::to_vec(&value)?;

        let result = self
            .bucket
            .commit(&encode_key(key), Bytes::from(data))
            .await
            .map_err(|e| StorageError::WriteFailure {
                key: key.to_string(),
                detail: e.to_string(),
            })?;

        if !result.ok {
            let detail = result
                .detail
                .unwrap_or_else(|| "commit not acknowledged".to_string());
            warn!(bucket = %self.bucket_name, key, %detail, "Write not acknowledged");
            return Err(StorageError::WriteFailure {
                key: key.to_string(),
                detail,
            });
        }

        debug!(bucket = %self.bucket_name, key, revision = ?result.revision, "Stored document");
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<EntryStream<T>> {
        let keys: Vec<(String, String)> = self
            .bucket
            .keys()
            .await?
            .into_iter()
            .filter_map(|raw| decode_key(&raw).map(|key| (raw, key)))
            .filter(|(_, key)| matches_prefix(key, prefix))
            .collect();

        let bucket = Arc::clone(&self.bucket);
        let entries = stream::iter(keys)
            .then(move |(raw, key)| {
                let bucket = Arc::clone(&bucket);
                async move { bucket.entry(&raw).await.map(|entry| entry.map(|bytes| (key, bytes))) }
            })
            .filter_map(|fetched| async move {
                match fetched {
                    // deleted between the key scan and the fetch
                    Ok(None) => None,
                    Ok(Some((key, bytes))) => Some(
                        serde_json::from_slice::<T>(&bytes)
                            .map(|value| (key, value))
                            .map_err(StorageError::from),
                    ),
                    Err(e) => Some(Err(e)),
                }
            });
        Ok(entries.boxed())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.bucket.remove(&encode_key(key)).await?;
        debug!(bucket = %self.bucket_name, key, "Deleted document");
        Ok(())
    }
}

/// Builder for [`NatsKvStore`]
pub struct NatsKvStoreBuilder<T> {
    client: Option<Client>,
    config: NatsKvConfig,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> NatsKvStoreBuilder<T> {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            client: None,
            config: NatsKvConfig::default(),
            _phantom: PhantomData,
        }
    }

    /// Set the NATS client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: NatsKvConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bucket name
    pub fn bucket_name(mut self, name: impl Into<String>) -> Self {
        self.config.bucket_name = name.into();
        self
    }

    /// Set the bucket description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = description.into();
        self
    }

    /// Set the history depth
    pub fn history(mut self, history: i64) -> Self {
        self.config.history = history;
        self
    }

    /// Set the TTL in seconds
    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.config.ttl_seconds = ttl;
        self
    }

    /// Build the store, creating the bucket if needed
    pub async fn build(self) -> StorageResult<NatsKvStore<T>> {
        let client = self
            .client
            .ok_or_else(|| StorageError::Backend("NATS client not provided".to_string()))?;

        NatsKvStore::connect(client, self.config).await
    }
}

impl<T> Default for NatsKvStoreBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
