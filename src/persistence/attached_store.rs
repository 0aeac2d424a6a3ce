// Copyright 2025 Cowboy AI, LLC.

//! Single-slot storage attached to a type
//!
//! [`AttachedSlots`] is an explicit side table holding at most one document
//! per type. [`AttachedSlots::attach`] hands out an [`AttachedStore`] bound to
//! one type; that store ignores the key argument entirely.

use super::{EntryStream, MetadataStore, StorageResult};
use crate::identity::TypeTarget;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Side table of per-type documents
pub struct AttachedSlots<T> {
    slots: Arc<RwLock<HashMap<TypeId, T>>>,
}

impl<T> Default for AttachedSlots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for AttachedSlots<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> AttachedSlots<T> {
    /// Create an empty side table
    pub fn new() -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Storage bound to the slot of `target`
    pub fn attach(&self, target: &TypeTarget) -> AttachedStore<T> {
        AttachedStore {
            slots: Arc::clone(&self.slots),
            type_id: target.type_id(),
            label: target.display_name().to_string(),
        }
    }

    /// Number of occupied slots
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Check if every slot is empty
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Drop every slot
    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }
}

/// Store holding exactly one document for one type
pub struct AttachedStore<T> {
    slots: Arc<RwLock<HashMap<TypeId, T>>>,
    type_id: TypeId,
    label: String,
}

impl<T> Clone for AttachedStore<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            type_id: self.type_id,
            label: self.label.clone(),
        }
    }
}

impl<T> AttachedStore<T> {
    /// Name of the type this store is attached to
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl<T> MetadataStore<T> for AttachedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, _key: &str) -> StorageResult<Option<T>> {
        Ok(self.slots.read().await.get(&self.type_id).cloned())
    }

    async fn set(&self, _key: &str, value: T) -> StorageResult<()> {
        self.slots.write().await.insert(self.type_id, value);
        debug!(type_name = %self.label, "Stored attached document");
        Ok(())
    }

    async fn list(&self, _prefix: Option<&str>) -> StorageResult<EntryStream<T>> {
        let slot = self
            .slots
            .read()
            .await
            .get(&self.type_id)
            .cloned()
            .map(|value| Ok((self.label.clone(), value)));
        Ok(stream::iter(slot).boxed())
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        self.slots.write().await.remove(&self.type_id);
        Ok(())
    }
}
