// Copyright 2025 Cowboy AI, LLC.

//! Declaring metadata on types
//!
//! A [`Declaration`] binds a storage backend, an identity prefix, an
//! initializer and a pipeline of stages. Applying it to a type:
//!
//! 1. resolves the type's name (`MissingName` if it has none)
//! 2. computes `identity = prefix + name`
//! 3. loads the stored document, or asks the initializer for a base one
//! 4. runs the pipeline over a copy of that document
//! 5. persists the result
//! 6. records `type -> identity` in the [`IdentityRegistry`]
//!
//! and hands the target back, so several declarations can be applied to one
//! type and accumulate into a single document.
//!
//! # Example
//!
//! ```no_run
//! use cim_metadata::{initializer, merge_stage, Declaration, IdentityRegistry, MemoryStore, TypeTarget};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Order;
//!
//! # async fn run() -> cim_metadata::MetadataResult<()> {
//! let store = Arc::new(MemoryStore::<serde_json::Value>::new());
//! let registry = Arc::new(IdentityRegistry::new());
//!
//! let schema = Declaration::builder(store.clone(), registry.clone(), initializer(|()| Ok(json!({}))))
//!     .prefix("schema:")
//!     .stage(merge_stage(json!({"type": "object"})))
//!     .build();
//!
//! schema.apply(TypeTarget::of::<Order>(), ()).await?;
//! assert_eq!(schema.value_of(&TypeTarget::of::<Order>()).await?, Some(json!({"type": "object"})));
//! # Ok(())
//! # }
//! ```

use crate::errors::{MetadataError, MetadataResult};
use crate::identity::{CollisionPolicy, Identity, IdentityRegistry, TypeTarget};
use crate::persistence::{MetadataStore, StorageResult};
use crate::pipeline::{Pipeline, Stage};
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Future returned by an initializer
pub type InitFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

/// Produces the base document for a type that has nothing stored yet
pub trait Initializer<T, A>: Send + Sync {
    /// Build the base document from call-time arguments
    fn initialize(&self, args: A) -> InitFuture<T>;
}

/// Initializer backed by a synchronous closure
#[derive(Clone)]
pub struct SyncInitializer<F>(F);

/// Initializer backed by a closure returning a future
#[derive(Clone)]
pub struct AsyncInitializer<F>(F);

/// Wrap a synchronous closure as an initializer
pub fn initializer<T, A, F>(f: F) -> SyncInitializer<F>
where
    F: Fn(A) -> anyhow::Result<T> + Send + Sync,
{
    SyncInitializer(f)
}

/// Wrap an asynchronous closure as an initializer
pub fn initializer_async<T, A, F, Fut>(f: F) -> AsyncInitializer<F>
where
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    AsyncInitializer(f)
}

impl<T, A, F> Initializer<T, A> for SyncInitializer<F>
where
    T: Send + 'static,
    F: Fn(A) -> anyhow::Result<T> + Send + Sync,
{
    fn initialize(&self, args: A) -> InitFuture<T> {
        future::ready((self.0)(args)).boxed()
    }
}

impl<T, A, F, Fut> Initializer<T, A> for AsyncInitializer<F>
where
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    fn initialize(&self, args: A) -> InitFuture<T> {
        (self.0)(args).boxed()
    }
}

/// A reusable decoration operation
pub struct Declaration<T, A = ()> {
    store: Arc<dyn MetadataStore<T>>,
    registry: Arc<IdentityRegistry>,
    prefix: String,
    policy: CollisionPolicy,
    initializer: Arc<dyn Initializer<T, A>>,
    pipeline: Pipeline<T>,
}

impl<T, A> Clone for Declaration<T, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            prefix: self.prefix.clone(),
            policy: self.policy,
            initializer: Arc::clone(&self.initializer),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<T, A> fmt::Debug for Declaration<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("prefix", &self.prefix)
            .field("policy", &self.policy)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl<T, A> Declaration<T, A>
where
    T: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Start building a declaration over `store` and `registry`
    pub fn builder(
        store: Arc<dyn MetadataStore<T>>,
        registry: Arc<IdentityRegistry>,
        initializer: impl Initializer<T, A> + 'static,
    ) -> DeclarationBuilder<T, A> {
        DeclarationBuilder {
            store,
            registry,
            prefix: String::new(),
            policy: CollisionPolicy::default(),
            initializer: Arc::new(initializer),
            pipeline: Pipeline::new(),
        }
    }

    /// Identity prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Backend documents are stored in
    pub fn store(&self) -> &Arc<dyn MetadataStore<T>> {
        &self.store
    }

    /// Registry identities are recorded in
    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Identity `target` would be declared under, without side effects
    pub fn identity_for(&self, target: &TypeTarget) -> MetadataResult<Identity> {
        Ok(Identity::compose(&self.prefix, target.require_name()?))
    }

    /// Declare metadata on `target`
    ///
    /// Returns the target unchanged so declarations can be chained. On any
    /// failure the stored document is left as it was.
    pub async fn apply(&self, target: TypeTarget, args: A) -> MetadataResult<TypeTarget> {
        let name = target.require_name()?.to_string();
        let identity = Identity::compose(&self.prefix, &name);
        self.registry
            .check_assignment(&target, &identity, self.policy)?;

        let current = match self.store.get(identity.as_str()).await? {
            Some(document) => document,
            None => {
                debug!(identity = %identity, "Initializing document");
                self.initializer.initialize(args).await.map_err(|source| {
                    MetadataError::InitializerFailure {
                        identity: identity.clone(),
                        source,
                    }
                })?
            }
        };

        let document = self.pipeline.run(&current, &identity, &name).await?;
        self.store.set(identity.as_str(), document).await?;
        self.registry.record(&target, &identity, self.policy)?;

        info!(identity = %identity, stages = self.pipeline.len(), "Declared metadata");
        Ok(target)
    }

    /// Declare metadata on `U`
    pub async fn declare<U: ?Sized + 'static>(&self, args: A) -> MetadataResult<TypeTarget> {
        self.apply(TypeTarget::of::<U>(), args).await
    }

    /// Stored document for `target`, if it was declared
    pub async fn value_of(&self, target: &TypeTarget) -> StorageResult<Option<T>> {
        value_of(&self.registry, target, self.store.as_ref()).await
    }
}

/// Look up the document stored for `target`
///
/// `None` when the type was never declared in `registry` or nothing is
/// stored under its identity.
pub async fn value_of<T>(
    registry: &IdentityRegistry,
    target: &TypeTarget,
    store: &dyn MetadataStore<T>,
) -> StorageResult<Option<T>> {
    match registry.identity_of(target) {
        Some(identity) => store.get(identity.as_str()).await,
        None => Ok(None),
    }
}

/// Builder for [`Declaration`]
pub struct DeclarationBuilder<T, A = ()> {
    store: Arc<dyn MetadataStore<T>>,
    registry: Arc<IdentityRegistry>,
    prefix: String,
    policy: CollisionPolicy,
    initializer: Arc<dyn Initializer<T, A>>,
    pipeline: Pipeline<T>,
}

impl<T, A> DeclarationBuilder<T, A> {
    /// Set the identity prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set what happens when two types compute the same identity
    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append a stage
    pub fn stage(mut self, stage: impl Stage<T> + 'static) -> Self {
        self.pipeline.push(stage);
        self
    }

    /// Append a shared stage
    pub fn shared_stage(mut self, stage: Arc<dyn Stage<T>>) -> Self {
        self.pipeline.push_shared(stage);
        self
    }

    /// Replace the pipeline
    pub fn pipeline(mut self, pipeline: Pipeline<T>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Build the declaration
    pub fn build(self) -> Declaration<T, A> {
        Declaration {
            store: self.store,
            registry: self.registry,
            prefix: self.prefix,
            policy: self.policy,
            initializer: self.initializer,
            pipeline: self.pipeline,
        }
    }
}

/// A storage backend, identity registry and prefix used together
///
/// Plugins construct one of these at startup instead of relying on global
/// defaults, then declare types through it and read their documents back.
pub struct MetadataRegistry<T> {
    store: Arc<dyn MetadataStore<T>>,
    identities: Arc<IdentityRegistry>,
    prefix: String,
    policy: CollisionPolicy,
}

impl<T> Clone for MetadataRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            identities: Arc::clone(&self.identities),
            prefix: self.prefix.clone(),
            policy: self.policy,
        }
    }
}

impl<T> MetadataRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a registry with its own identity table
    pub fn new(store: Arc<dyn MetadataStore<T>>, prefix: impl Into<String>) -> Self {
        Self::with_identities(store, Arc::new(IdentityRegistry::new()), prefix)
    }

    /// Create a registry over an existing identity table
    pub fn with_identities(
        store: Arc<dyn MetadataStore<T>>,
        identities: Arc<IdentityRegistry>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            identities,
            prefix: prefix.into(),
            policy: CollisionPolicy::default(),
        }
    }

    /// Set the collision policy used by declarations built from here
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start a declaration bound to this registry's store, identities and prefix
    pub fn declaration<A>(
        &self,
        initializer: impl Initializer<T, A> + 'static,
    ) -> DeclarationBuilder<T, A>
    where
        A: Send + 'static,
    {
        Declaration::builder(Arc::clone(&self.store), Arc::clone(&self.identities), initializer)
            .prefix(self.prefix.clone())
            .collision_policy(self.policy)
    }

    /// Declare `target` with a one-off initializer and stages
    pub async fn declare<I>(
        &self,
        target: TypeTarget,
        initializer: impl Initializer<T, ()> + 'static,
        stages: I,
    ) -> MetadataResult<TypeTarget>
    where
        I: IntoIterator<Item = Arc<dyn Stage<T>>>,
    {
        stages
            .into_iter()
            .fold(self.declaration(initializer), DeclarationBuilder::shared_stage)
            .build()
            .apply(target, ())
            .await
    }

    /// Identity recorded for `U`
    pub fn identity_of<U: ?Sized + 'static>(&self) -> Option<Identity> {
        self.identities.identity_of_type::<U>()
    }

    /// Stored document for `U`
    pub async fn value_of<U: ?Sized + 'static>(&self) -> StorageResult<Option<T>> {
        value_of(&self.identities, &TypeTarget::of::<U>(), self.store.as_ref()).await
    }

    /// Identity table shared by this registry
    pub fn identities(&self) -> &Arc<IdentityRegistry> {
        &self.identities
    }

    /// Backend documents are stored in
    pub fn store(&self) -> &Arc<dyn MetadataStore<T>> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::pipeline::stage;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Order;

    fn empty() -> SyncInitializer<impl Fn(()) -> anyhow::Result<Value> + Send + Sync> {
        initializer(|()| Ok(json!({})))
    }

    #[tokio::test]
    async fn test_initializer_only_runs_when_absent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let store = Arc::new(MemoryStore::<Value>::new());
        let declaration = Declaration::builder(
            store.clone(),
            Arc::new(IdentityRegistry::new()),
            initializer(move |()| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"seeded": true}))
            }),
        )
        .build();

        declaration.declare::<Order>(()).await.unwrap();
        declaration.declare::<Order>(()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("Order").await.unwrap(), Some(json!({"seeded": true})));
    }

    #[tokio::test]
    async fn test_call_time_arguments_reach_initializer() {
        let store = Arc::new(MemoryStore::<Value>::new());
        let declaration: Declaration<Value, &'static str> = Declaration::builder(
            store.clone(),
            Arc::new(IdentityRegistry::new()),
            initializer(|path: &'static str| Ok(json!({"path": path}))),
        )
        .prefix("route:")
        .build();

        declaration.declare::<Order>("/orders").await.unwrap();
        assert_eq!(
            store.get("route:Order").await.unwrap(),
            Some(json!({"path": "/orders"}))
        );
    }

    #[tokio::test]
    async fn test_async_initializer() {
        let store = Arc::new(MemoryStore::<Value>::new());
        let declaration = Declaration::builder(
            store.clone(),
            Arc::new(IdentityRegistry::new()),
            initializer_async(|()| async {
                tokio::task::yield_now().await;
                Ok(json!({"loaded": "from-disk"}))
            }),
        )
        .build();

        declaration.declare::<Order>(()).await.unwrap();
        assert_eq!(
            store.get("Order").await.unwrap(),
            Some(json!({"loaded": "from-disk"}))
        );
    }

    #[tokio::test]
    async fn test_initializer_failure_persists_nothing() {
        let store = Arc::new(MemoryStore::<Value>::new());
        let registry = Arc::new(IdentityRegistry::new());
        let declaration = Declaration::builder(
            store.clone(),
            registry.clone(),
            initializer(|()| Err(anyhow::anyhow!("config file missing"))),
        )
        .build();

        let err = declaration.declare::<Order>(()).await.unwrap_err();

        assert!(matches!(err, MetadataError::InitializerFailure { .. }));
        assert!(store.is_empty().await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_target_fails() {
        let store = Arc::new(MemoryStore::<Value>::new());
        let declaration =
            Declaration::builder(store.clone(), Arc::new(IdentityRegistry::new()), empty()).build();

        let err = declaration
            .apply(TypeTarget::unnamed::<Order>(), ())
            .await
            .unwrap_err();

        assert!(matches!(err, MetadataError::MissingName { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_identity_for_has_no_side_effects() {
        let registry = Arc::new(IdentityRegistry::new());
        let declaration = Declaration::builder(Arc::new(MemoryStore::<Value>::new()), registry.clone(), empty())
            .prefix("schema:")
            .build();

        assert_eq!(
            declaration.identity_for(&TypeTarget::of::<Order>()).unwrap(),
            Identity::from("schema:Order")
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_registry_declare() {
        let registry = MetadataRegistry::new(Arc::new(MemoryStore::<Value>::new()), "jsonld:");
        let stages: Vec<Arc<dyn Stage<Value>>> = vec![Arc::new(stage(
            |mut doc: Value, _: &Identity, name: &str| {
                doc["@type"] = json!(name);
                Ok(doc)
            },
        ))];

        registry
            .declare(TypeTarget::of::<Order>(), empty(), stages)
            .await
            .unwrap();

        assert_eq!(registry.identity_of::<Order>(), Some(Identity::from("jsonld:Order")));
        assert_eq!(
            registry.value_of::<Order>().await.unwrap(),
            Some(json!({"@type": "Order"}))
        );
    }
}
