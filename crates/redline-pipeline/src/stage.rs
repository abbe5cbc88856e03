//! Stages and stage lists
//!
//! A stage is an opaque transformation `(context, config) -> payload`. The
//! orchestrator treats every stage alike; what a stage computes is its own
//! business.

use crate::context::AnalysisContext;
use crate::error::{PipelineError, StageFailure};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// One pipeline step
///
/// `run` must not block the executor: the stage timeout can only fire at an
/// await point. Wrap blocking work in [`FnStage`] or `spawn_blocking`.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    /// Unique name, also part of the cache key
    fn name(&self) -> &str;

    /// Produce this stage's payload
    ///
    /// Earlier outputs are available through [`AnalysisContext::output`].
    async fn run(&self, ctx: &AnalysisContext, config: &Value) -> Result<Value, StageFailure>;
}

/// Stage built from a synchronous closure
///
/// The closure runs on tokio's blocking pool against a snapshot of the
/// context, so a closure that blocks still honors the stage timeout. A
/// timed-out closure keeps its blocking thread until it returns.
pub struct FnStage<F> {
    name: String,
    f: Arc<F>,
}

impl<F> FnStage<F>
where
    F: Fn(&AnalysisContext, &Value) -> Result<Value, StageFailure> + Send + Sync + 'static,
{
    /// Wrap `f` as stage `name`
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }
}

impl<F> fmt::Debug for FnStage<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait::async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&AnalysisContext, &Value) -> Result<Value, StageFailure> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &AnalysisContext, config: &Value) -> Result<Value, StageFailure> {
        let f = Arc::clone(&self.f);
        let ctx = ctx.clone();
        let config = config.clone();

        match tokio::task::spawn_blocking(move || f(&ctx, &config)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(StageFailure::failed(format!("stage task did not finish: {e}"))),
        }
    }
}

/// Stages available by name
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: IndexMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage, returning any stage it replaced
    pub fn register(&mut self, stage: impl Stage + 'static) -> Option<Arc<dyn Stage>> {
        self.register_arc(Arc::new(stage))
    }

    /// Register a shared stage
    pub fn register_arc(&mut self, stage: Arc<dyn Stage>) -> Option<Arc<dyn Stage>> {
        let name = stage.name().to_string();
        tracing::debug!(stage = %name, "Registered stage");
        self.stages.insert(name, stage)
    }

    /// Look up by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Stage>> {
        self.stages.get(name)
    }

    /// Check if a stage is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    /// Number of stages
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if no stage is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Ordered, duplicate-free stages for one run
#[derive(Clone, Default)]
pub struct StageList {
    stages: Vec<Arc<dyn Stage>>,
}

impl StageList {
    /// Build from stages in run order
    ///
    /// # Errors
    /// `PipelineError::DuplicateStage` if two stages share a name
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name()) {
                return Err(PipelineError::DuplicateStage(stage.name().to_string()));
            }
        }
        Ok(Self { stages })
    }

    /// Resolve configured names against a registry
    ///
    /// # Errors
    /// - `PipelineError::UnknownStage` for a name not in `registry`
    /// - `PipelineError::DuplicateStage` for a repeated name
    pub fn from_names<S: AsRef<str>>(
        registry: &StageRegistry,
        names: &[S],
    ) -> Result<Self, PipelineError> {
        let stages = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PipelineError::UnknownStage(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(stages)
    }

    /// Stage names in run order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name())
    }

    /// Stages in run order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.stages.iter()
    }

    /// Number of stages
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the list is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Debug for StageList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
