// Copyright 2025 Cowboy AI, LLC.

//! # CIM Metadata
//!
//! Identity-keyed metadata for types, built up by ordered pipelines of stages
//! and kept behind a pluggable storage backend.
//!
//! Plugins (schema derivation, OpenAPI paths, linked-data typing, routing
//! tables) contribute stages and read the accumulated documents back:
//!
//! - **Identity**: `prefix + type name`, recorded once per type in an
//!   [`IdentityRegistry`]
//! - **Pipeline**: stages folded left to right over a copy of the stored
//!   document, each awaited before the next
//! - **Declaration**: load, transform, persist, record; the document is only
//!   written once every stage has succeeded
//! - **Persistence**: in-memory, per-type attached, NATS JetStream KV, and
//!   JSON snapshot files
//! - **Merge**: deep merge for composing nested documents
//!
//! ## Design Principles
//!
//! 1. **Explicit state**: registries and stores are constructed and injected,
//!    never global
//! 2. **Deterministic order**: stages never run concurrently
//! 3. **No partial writes**: failures leave the stored document untouched
//! 4. **Stable identity**: re-declaring a type targets the same slot

#![warn(missing_docs)]

mod declaration;
mod errors;
mod identity;
mod merge;
mod pipeline;
pub mod infrastructure;
pub mod persistence;

pub use declaration::{
    initializer, initializer_async, value_of, AsyncInitializer, Declaration,
    DeclarationBuilder, InitFuture, Initializer, MetadataRegistry, SyncInitializer,
};
pub use errors::{MetadataError, MetadataResult};
pub use identity::{CollisionPolicy, Identity, IdentityRegistry, TypeTarget};
pub use merge::{merge_into, merge_stage, merge_value};
pub use persistence::{
    AttachedSlots, AttachedStore, MemoryStore, MetadataStore, MetadataStoreExt, NatsKvStore,
    SnapshotFile, StorageError, StorageResult,
};
pub use pipeline::{
    declarative_sequence, stage, stage_async, AsyncStage, Pipeline, Stage, StageFuture,
    SyncStage,
};
