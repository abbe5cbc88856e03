//! Pipeline orchestrator
//!
//! Runs an ordered stage list over one version:
//! 1. Build the context from the version text and fingerprint
//! 2. Per stage: serve from cache, or run it under a timeout with panics
//!    caught; record the output or the error and continue. Once a stage
//!    has failed, later stages bypass the cache, since their output may
//!    depend on the missing one and the key does not capture that.
//! 3. Mark the run complete
//! 4. Attach the summarized result to the version
//!
//! Nothing a stage does can abort the run, and persistence problems are
//! reported on the context instead of being returned.

use crate::context::{AnalysisContext, PersistenceStatus};
use crate::error::PipelineError;
use crate::stage::{Stage, StageList};
use futures::FutureExt;
use redline_cache::{NullCache, TransformationCache};
use redline_store::{
    NegotiationId, StageErrorKind, StageStatus, StoreError, Version, VersionId, VersionStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

/// Default per-stage time budget
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default lifetime of cached stage outputs
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Orchestrator tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Upper bound on one stage attempt
    pub stage_timeout: Duration,
    /// Time-to-live of cached outputs
    pub cache_ttl: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl PipelineSettings {
    /// Set stage timeout
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Set cache TTL
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// Progress notification sent after each stage attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Version under analysis
    pub version_id: VersionId,
    /// 0-based stage position
    pub index: usize,
    /// Number of stages in the run
    pub total: usize,
    /// Stage name
    pub stage: String,
    /// How the attempt ended
    pub status: StageStatus,
    /// Attempt duration
    pub duration_ms: u64,
    /// Error message for failed attempts
    pub error: Option<String>,
}

/// One unit of batch work
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Version to analyze
    pub version: Version,
    /// Stages to run
    pub stages: StageList,
    /// Stage configuration
    pub config: Value,
}

/// Drives stage lists over versions
#[derive(Debug, Clone)]
pub struct Orchestrator {
    store: Arc<VersionStore>,
    cache: Arc<dyn TransformationCache>,
    settings: PipelineSettings,
}

impl Orchestrator {
    /// Create orchestrator
    #[must_use]
    pub fn new(
        store: Arc<VersionStore>,
        cache: Arc<dyn TransformationCache>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            cache,
            settings,
        }
    }

    /// Orchestrator with caching disabled
    #[must_use]
    pub fn uncached(store: Arc<VersionStore>, settings: PipelineSettings) -> Self {
        Self::new(store, Arc::new(NullCache::new()), settings)
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Cache in use
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn TransformationCache> {
        &self.cache
    }

    /// Store results are attached to
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    /// Run `stages` over `version`
    ///
    /// Always returns a completed context. Stage failures are recorded in
    /// [`AnalysisContext::errors`]; the persistence outcome is in
    /// [`AnalysisContext::persistence`].
    pub async fn run(&self, version: &Version, stages: &StageList, config: &Value) -> AnalysisContext {
        self.execute(version, stages, config, None).await
    }

    /// Like [`run`](Self::run), sending a [`StageEvent`] after every stage
    ///
    /// A closed receiver does not affect the run.
    pub async fn run_with_progress(
        &self,
        version: &Version,
        stages: &StageList,
        config: &Value,
        progress: mpsc::Sender<StageEvent>,
    ) -> AnalysisContext {
        self.execute(version, stages, config, Some(&progress)).await
    }

    /// Load version `number` of a negotiation and run `stages` over it
    ///
    /// # Errors
    /// `PipelineError::Store` if the version cannot be loaded
    pub async fn analyze(
        &self,
        negotiation_id: &NegotiationId,
        number: u32,
        stages: &StageList,
        config: &Value,
    ) -> Result<AnalysisContext, PipelineError> {
        let version = self.store.version_by_number(negotiation_id, number).await?;
        Ok(self.run(&version, stages, config).await)
    }

    /// Run independent jobs with at most `max_concurrent` in flight
    ///
    /// Contexts are returned in job order.
    pub async fn run_batch(&self, jobs: &[BatchJob], max_concurrent: usize) -> Vec<AnalysisContext> {
        let permits = Semaphore::new(max_concurrent.max(1));
        tracing::info!(jobs = jobs.len(), max_concurrent, "Starting batch analysis");

        let runs = jobs.iter().map(|job| {
            let permits = &permits;
            async move {
                let _permit = permits.acquire().await.ok();
                self.run(&job.version, &job.stages, &job.config).await
            }
        });
        futures::future::join_all(runs).await
    }

    async fn execute(
        &self,
        version: &Version,
        stages: &StageList,
        config: &Value,
        progress: Option<&mpsc::Sender<StageEvent>>,
    ) -> AnalysisContext {
        let mut ctx = AnalysisContext::new(version);
        let total = stages.len();
        tracing::debug!(version = %ctx.version_id(), stages = total, "Pipeline initialized");

        for (index, stage) in stages.iter().enumerate() {
            let name = stage.name().to_string();
            ctx.enter_stage(index, &name);
            tracing::debug!(version = %ctx.version_id(), stage = %name, index, "Entering stage");

            let cacheable = !ctx.has_errors();
            let started = Instant::now();
            let (status, error) = self
                .attempt(&mut ctx, stage.as_ref(), &name, config, cacheable)
                .await;

            if let Some(progress) = progress {
                let event = StageEvent {
                    version_id: ctx.version_id().clone(),
                    index,
                    total,
                    stage: name,
                    status,
                    duration_ms: elapsed_ms(started),
                    error,
                };
                if progress.send(event).await.is_err() {
                    tracing::debug!("Progress receiver dropped");
                }
            }
        }

        ctx.complete();
        let summary = ctx.summary();
        tracing::info!(
            version = %ctx.version_id(),
            succeeded = summary.stages_succeeded,
            failed = summary.stages_failed,
            "Pipeline complete"
        );

        let status = self.persist(&ctx).await;
        ctx.set_persistence(status);
        ctx
    }

    /// Serve one stage from cache or run it, recording the outcome
    ///
    /// With `cacheable` unset the cache is neither read nor written.
    async fn attempt(
        &self,
        ctx: &mut AnalysisContext,
        stage: &dyn Stage,
        name: &str,
        config: &Value,
        cacheable: bool,
    ) -> (StageStatus, Option<String>) {
        if !cacheable {
            tracing::debug!(
                version = %ctx.version_id(),
                stage = %name,
                "Earlier stage failed; bypassing cache"
            );
        } else if let Some(cached) = self.cache.lookup(ctx.fingerprint(), name, config).await {
            tracing::debug!(version = %ctx.version_id(), stage = %name, "Stage served from cache");
            ctx.record_output(name, cached, StageStatus::Cached, 0);
            return (StageStatus::Cached, None);
        }

        let started = Instant::now();
        let result = self.invoke(ctx, stage, config).await;
        let duration_ms = elapsed_ms(started);

        match result {
            Ok(output) => {
                if cacheable {
                    self.cache
                        .store(
                            ctx.fingerprint(),
                            name,
                            config,
                            output.clone(),
                            self.settings.cache_ttl,
                        )
                        .await;
                }
                ctx.record_output(name, output, StageStatus::Succeeded, duration_ms);
                (StageStatus::Succeeded, None)
            }
            Err((kind, message)) => {
                tracing::warn!(
                    version = %ctx.version_id(),
                    stage = %name,
                    kind = %kind,
                    error = %message,
                    "Stage failed"
                );
                ctx.record_failure(name, kind, message.clone(), duration_ms);
                (StageStatus::Failed, Some(message))
            }
        }
    }

    async fn invoke(
        &self,
        ctx: &AnalysisContext,
        stage: &dyn Stage,
        config: &Value,
    ) -> Result<Value, (StageErrorKind, String)> {
        let guarded = AssertUnwindSafe(stage.run(ctx, config)).catch_unwind();

        match tokio::time::timeout(self.settings.stage_timeout, guarded).await {
            Err(_) => Err((
                StageErrorKind::Timeout,
                format!(
                    "stage exceeded its {}ms time budget",
                    self.settings.stage_timeout.as_millis()
                ),
            )),
            Ok(Err(panic)) => Err((StageErrorKind::Panicked, panic_message(panic.as_ref()))),
            Ok(Ok(Err(failure))) => Err((failure.kind(), failure.to_string())),
            Ok(Ok(Ok(output))) => Ok(output),
        }
    }

    async fn persist(&self, ctx: &AnalysisContext) -> PersistenceStatus {
        match self
            .store
            .attach_analysis(ctx.version_id(), ctx.to_result())
            .await
        {
            Ok(()) => PersistenceStatus::Attached,
            Err(StoreError::AlreadyAnalyzed(_)) => {
                tracing::warn!(version = %ctx.version_id(), "Version already analyzed; result not stored");
                PersistenceStatus::AlreadyAnalyzed
            }
            Err(e) => {
                tracing::error!(version = %ctx.version_id(), error = %e, "Failed to attach analysis");
                PersistenceStatus::Failed(e.to_string())
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("stage panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("stage panicked: {message}")
    } else {
        "stage panicked".to_string()
    }
}
