// Copyright 2025 Cowboy AI, LLC.

//! Declarative stage pipelines
//!
//! A [`Pipeline`] folds a document through its stages strictly left to right.
//! Each stage is awaited before the next one starts, since later stages read
//! fields written by earlier ones. The caller's document is cloned before the
//! first stage runs, so no stage can reach back into stored state.

use crate::errors::{MetadataError, MetadataResult};
use crate::identity::Identity;
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Future returned by a stage
pub type StageFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

/// One transformation step: `(document, identity, name) -> document`
pub trait Stage<T>: Send + Sync {
    /// Transform `document` for the type declared as `identity` / `name`
    fn apply(&self, document: T, identity: &Identity, name: &str) -> StageFuture<T>;
}

/// Stage backed by a synchronous closure
#[derive(Clone)]
pub struct SyncStage<F>(F);

/// Stage backed by a closure returning a future
#[derive(Clone)]
pub struct AsyncStage<F>(F);

/// Wrap a synchronous closure as a stage
pub fn stage<T, F>(f: F) -> SyncStage<F>
where
    F: Fn(T, &Identity, &str) -> anyhow::Result<T> + Send + Sync,
{
    SyncStage(f)
}

/// Wrap an asynchronous closure as a stage
///
/// The closure receives owned copies of the identity and name so the returned
/// future can outlive the call.
pub fn stage_async<T, F, Fut>(f: F) -> AsyncStage<F>
where
    F: Fn(T, Identity, String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    AsyncStage(f)
}

impl<T, F> Stage<T> for SyncStage<F>
where
    T: Send + 'static,
    F: Fn(T, &Identity, &str) -> anyhow::Result<T> + Send + Sync,
{
    fn apply(&self, document: T, identity: &Identity, name: &str) -> StageFuture<T> {
        future::ready((self.0)(document, identity, name)).boxed()
    }
}

impl<T, F, Fut> Stage<T> for AsyncStage<F>
where
    T: Send + 'static,
    F: Fn(T, Identity, String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    fn apply(&self, document: T, identity: &Identity, name: &str) -> StageFuture<T> {
        (self.0)(document, identity.clone(), name.to_string()).boxed()
    }
}

/// Ordered list of stages applied as one transformation
pub struct Pipeline<T> {
    stages: Vec<Arc<dyn Stage<T>>>,
}

/// Compose `stages` into a single pipeline, preserving their order
pub fn declarative_sequence<T, I>(stages: I) -> Pipeline<T>
where
    I: IntoIterator<Item = Arc<dyn Stage<T>>>,
{
    Pipeline {
        stages: stages.into_iter().collect(),
    }
}

impl<T> Pipeline<T> {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage, builder style
    pub fn with_stage(mut self, stage: impl Stage<T> + 'static) -> Self {
        self.push(stage);
        self
    }

    /// Append a stage
    pub fn push(&mut self, stage: impl Stage<T> + 'static) {
        self.stages.push(Arc::new(stage));
    }

    /// Append a stage that is shared with other pipelines
    pub fn push_shared(&mut self, stage: Arc<dyn Stage<T>>) {
        self.stages.push(stage);
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the pipeline has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<T> Pipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Run every stage over a clone of `initial`
    ///
    /// The first failing stage aborts the run with `StageFailure`; no later
    /// stage is invoked and no partial document is returned.
    pub async fn run(&self, initial: &T, identity: &Identity, name: &str) -> MetadataResult<T> {
        let mut document = initial.clone();
        for (index, stage) in self.stages.iter().enumerate() {
            document = stage
                .apply(document, identity, name)
                .await
                .map_err(|source| MetadataError::StageFailure {
                    index,
                    identity: identity.clone(),
                    source,
                })?;
            debug!(identity = %identity, stage = index, "Applied stage");
        }
        Ok(document)
    }
}

impl<T> Stage<T> for Pipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn apply(&self, document: T, identity: &Identity, name: &str) -> StageFuture<T> {
        let pipeline = self.clone();
        let identity = identity.clone();
        let name = name.to_string();
        async move {
            pipeline
                .run(&document, &identity, &name)
                .await
                .map_err(anyhow::Error::from)
        }
        .boxed()
    }
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}
