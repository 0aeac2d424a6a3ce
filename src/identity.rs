// Copyright 2025 Cowboy AI, LLC.

//! Type identities and the side table that records them
//!
//! A type is addressed by a [`TypeTarget`]: its `TypeId` plus the human name
//! used to build its [`Identity`]. The [`IdentityRegistry`] remembers which
//! identity each type was declared under, so collaborators can later resolve
//! "what identity does this type have" without touching the type itself.

use crate::errors::{MetadataError, MetadataResult};
use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Stable string key computed as `prefix + type name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Compute the identity for a name under a prefix
    pub fn compose(prefix: &str, name: &str) -> Self {
        Self(format!("{prefix}{name}"))
    }

    /// Borrow the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identity, returning the underlying string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A type that metadata can be declared on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTarget {
    type_id: TypeId,
    type_path: &'static str,
    name: Option<String>,
}

impl TypeTarget {
    /// Target `T`, named by the last segment of its path
    ///
    /// `my_app::model::Order<u32>` is named `Order`. Closures and other
    /// anonymous types have no resolvable name.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let type_path = type_name::<T>();
        Self {
            type_id: TypeId::of::<T>(),
            type_path,
            name: short_type_name(type_path).map(str::to_string),
        }
    }

    /// Target `T` with no name at all
    pub fn unnamed<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_path: type_name::<T>(),
            name: None,
        }
    }

    /// Override the name used to build identities
    ///
    /// An empty name leaves the target unnamed.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.is_empty() { None } else { Some(name) };
        self
    }

    /// The `TypeId` used as the side-table key
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Full compiler path of the type
    pub fn type_path(&self) -> &'static str {
        self.type_path
    }

    /// Resolvable human name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The name, or `MissingName` when the type has none
    pub fn require_name(&self) -> MetadataResult<&str> {
        self.name().ok_or_else(|| MetadataError::MissingName {
            type_path: self.type_path.to_string(),
        })
    }

    /// Name used in diagnostics, falling back to the full path
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(self.type_path)
    }
}

/// Last path segment of a compiler type name, without generic arguments
///
/// References, pointers, arrays, tuples, trait objects and function types
/// are not named paths and resolve to `None`, as does any segment that is
/// not a plain identifier.
fn short_type_name(type_path: &str) -> Option<&str> {
    const UNNAMED: [&str; 7] = ["[", "(", "&", "*", "dyn ", "fn(", "impl "];
    if UNNAMED.iter().any(|prefix| type_path.starts_with(prefix)) {
        return None;
    }
    let base = type_path.split('<').next().unwrap_or(type_path);
    let name = base.rsplit("::").next().unwrap_or(base);
    let is_identifier = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_identifier.then_some(name)
}

/// What to do when two different types compute the same identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Both types share one storage slot, later writes win
    #[default]
    Shared,
    /// The second type fails with `IdentityCollision`
    Reject,
}

#[derive(Debug, Default)]
struct RegistryTables {
    by_type: HashMap<TypeId, (Identity, String)>,
    owners: HashMap<Identity, TypeId>,
}

impl RegistryTables {
    fn check(
        &self,
        target: &TypeTarget,
        identity: &Identity,
        policy: CollisionPolicy,
    ) -> MetadataResult<()> {
        if let Some((existing, _)) = self.by_type.get(&target.type_id()) {
            if existing != identity {
                return Err(MetadataError::IdentityConflict {
                    type_name: target.display_name().to_string(),
                    existing: existing.clone(),
                    requested: identity.clone(),
                });
            }
        }
        if policy == CollisionPolicy::Reject {
            match self.owners.get(identity) {
                Some(owner) if *owner != target.type_id() => {
                    return Err(MetadataError::IdentityCollision {
                        identity: identity.clone(),
                        type_name: target.display_name().to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Side table mapping types to the identity they were declared under
///
/// Constructed explicitly and shared (usually behind an `Arc`) by every
/// declaration that should see the same associations.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    tables: RwLock<RegistryTables>,
}

impl IdentityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryTables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryTables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check that `target` may be assigned `identity`
    ///
    /// Fails with `IdentityConflict` when the type already carries another
    /// identity, and with `IdentityCollision` when a different type owns
    /// `identity` and `policy` rejects sharing.
    pub fn check_assignment(
        &self,
        target: &TypeTarget,
        identity: &Identity,
        policy: CollisionPolicy,
    ) -> MetadataResult<()> {
        self.read().check(target, identity, policy)
    }

    /// Record `target -> identity`
    ///
    /// Recording the same identity again is a no-op. The assignment is
    /// re-checked under the write lock, so a declaration that raced past
    /// [`check_assignment`](Self::check_assignment) still fails here.
    pub fn record(
        &self,
        target: &TypeTarget,
        identity: &Identity,
        policy: CollisionPolicy,
    ) -> MetadataResult<()> {
        let mut tables = self.write();
        tables.check(target, identity, policy)?;
        if tables.by_type.contains_key(&target.type_id()) {
            return Ok(());
        }

        tables.by_type.insert(
            target.type_id(),
            (identity.clone(), target.display_name().to_string()),
        );
        tables
            .owners
            .entry(identity.clone())
            .or_insert(target.type_id());

        debug!(identity = %identity, type_name = target.display_name(), "Recorded identity");
        Ok(())
    }

    /// Identity previously recorded for `target`
    pub fn identity_of(&self, target: &TypeTarget) -> Option<Identity> {
        self.read()
            .by_type
            .get(&target.type_id())
            .map(|(identity, _)| identity.clone())
    }

    /// Identity previously recorded for `T`
    pub fn identity_of_type<T: ?Sized + 'static>(&self) -> Option<Identity> {
        self.identity_of(&TypeTarget::of::<T>())
    }

    /// Whether `target` has been declared
    pub fn contains(&self, target: &TypeTarget) -> bool {
        self.read().by_type.contains_key(&target.type_id())
    }

    /// All recorded `(type name, identity)` pairs, sorted by identity
    pub fn types(&self) -> Vec<(String, Identity)> {
        let mut types: Vec<_> = self
            .read()
            .by_type
            .values()
            .map(|(identity, name)| (name.clone(), identity.clone()))
            .collect();
        types.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        types
    }

    /// Number of declared types
    pub fn len(&self) -> usize {
        self.read().by_type.len()
    }

    /// Check if no type has been declared
    pub fn is_empty(&self) -> bool {
        self.read().by_type.is_empty()
    }

    /// Forget every association
    pub fn clear(&self) {
        let mut tables = self.write();
        tables.by_type.clear();
        tables.owners.clear();
    }
}
