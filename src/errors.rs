// Copyright 2025 Cowboy AI, LLC.

//! Error types for metadata declaration and lookup

use crate::identity::Identity;
use crate::persistence::StorageError;
use thiserror::Error;

/// Errors that can occur while declaring metadata on a type
///
/// None of these are retried by the engine. A failed declaration leaves the
/// previously stored document untouched because persistence only happens
/// after the whole pipeline has resolved.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The target type has no resolvable name
    #[error("Cannot declare metadata on a type without a name: {type_path}")]
    MissingName {
        /// Full path reported by the compiler for the target type
        type_path: String,
    },

    /// The storage backend failed to load or persist the document
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The initializer failed to produce a base document
    #[error("Initializer failed for {identity}: {source}")]
    InitializerFailure {
        /// Identity being declared
        identity: Identity,
        /// Error raised by the initializer
        #[source]
        source: anyhow::Error,
    },

    /// A pipeline stage failed
    #[error("Stage {index} failed for {identity}: {source}")]
    StageFailure {
        /// Zero-based position of the failing stage
        index: usize,
        /// Identity the pipeline was running for
        identity: Identity,
        /// Error raised by the stage
        #[source]
        source: anyhow::Error,
    },

    /// A type already carries a different identity
    #[error("Type {type_name} already has identity {existing}, refusing to assign {requested}")]
    IdentityConflict {
        /// Name of the type
        type_name: String,
        /// Identity recorded first
        existing: Identity,
        /// Identity that was requested afterwards
        requested: Identity,
    },

    /// Two distinct types computed the same identity under a rejecting policy
    #[error("Identity {identity} is already owned by another type (requested by {type_name})")]
    IdentityCollision {
        /// Identity both types resolve to
        identity: Identity,
        /// Name of the type that lost
        type_name: String,
    },
}

/// Result type for metadata operations
pub type MetadataResult<T> = Result<T, MetadataError>;

impl MetadataError {
    /// Check if the failure came from the storage layer
    pub fn is_storage_error(&self) -> bool {
        matches!(self, MetadataError::Storage(_))
    }

    /// Check if a storage backend refused to acknowledge a write
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            MetadataError::Storage(StorageError::WriteFailure { .. })
        )
    }

    /// Check if plugin code (initializer or stage) failed
    pub fn is_plugin_failure(&self) -> bool {
        matches!(
            self,
            MetadataError::InitializerFailure { .. } | MetadataError::StageFailure { .. }
        )
    }
}
