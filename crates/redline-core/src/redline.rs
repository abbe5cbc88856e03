//! Redline facade
//!
//! Wires a configured backend, store, cache, and orchestrator together and
//! exposes the operations the command-line interface needs.

use crate::config::{BackendKind, RedlineConfig};
use crate::error::RedlineResult;
use crate::stages::builtin_registry;
use redline_cache::{MokaTransformationCache, NullCache, TransformationCache};
use redline_pipeline::{AnalysisContext, BatchJob, Orchestrator, Stage, StageList, StageRegistry};
use redline_store::{
    FileBackend, MemoryBackend, Negotiation, NegotiationId, Provenance, StorageBackend, Version,
    VersionStore,
};
use std::sync::Arc;

/// Configured Redline instance
#[derive(Debug)]
pub struct Redline {
    config: RedlineConfig,
    store: Arc<VersionStore>,
    registry: StageRegistry,
    orchestrator: Orchestrator,
}

impl Redline {
    /// Build every component from `config`
    ///
    /// # Errors
    /// - `RedlineError::Config` if the configuration is invalid
    /// - `RedlineError::Backend` if the storage root cannot be prepared
    pub async fn from_config(config: RedlineConfig) -> RedlineResult<Self> {
        config.validate()?;

        let backend: Arc<dyn StorageBackend> = match config.storage.backend {
            BackendKind::File => Arc::new(FileBackend::open(&config.storage.root).await?),
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        let store = Arc::new(VersionStore::new(backend));

        let cache: Arc<dyn TransformationCache> = if config.cache.enabled {
            Arc::new(MokaTransformationCache::new(config.cache.max_capacity))
        } else {
            Arc::new(NullCache::new())
        };

        let orchestrator = Orchestrator::new(Arc::clone(&store), cache, config.pipeline_settings());

        tracing::info!(
            backend = ?config.storage.backend,
            root = %config.storage.root.display(),
            cache = config.cache.enabled,
            "Redline initialized"
        );

        Ok(Self {
            config,
            store,
            registry: builtin_registry(),
            orchestrator,
        })
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RedlineConfig {
        &self.config
    }

    /// Version store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    /// Registered stages
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Pipeline orchestrator
    #[inline]
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Add (or replace) a stage that configuration can name
    pub fn register_stage(&mut self, stage: impl Stage + 'static) {
        self.registry.register(stage);
    }

    /// Resolve the configured stage names
    ///
    /// # Errors
    /// `RedlineError::Pipeline` for unknown or repeated names
    pub fn stage_list(&self) -> RedlineResult<StageList> {
        Ok(StageList::from_names(
            &self.registry,
            &self.config.pipeline.stages,
        )?)
    }

    /// Create a negotiation
    ///
    /// # Errors
    /// Store errors, see [`VersionStore::create_negotiation`]
    pub async fn create_negotiation(&self, id: &str, title: &str) -> RedlineResult<Negotiation> {
        Ok(self.store.create_negotiation(id, title).await?)
    }

    /// Store a version
    ///
    /// # Errors
    /// Store errors, see [`VersionStore::add_version`]
    pub async fn add_version(
        &self,
        negotiation_id: &NegotiationId,
        text: String,
        provenance: Provenance,
        note: Option<String>,
    ) -> RedlineResult<Version> {
        Ok(self
            .store
            .add_version(negotiation_id, text, provenance, note)
            .await?)
    }

    /// Run the configured stages over version `number`
    ///
    /// # Errors
    /// - `RedlineError::Pipeline` if the stage list is invalid or the version
    ///   cannot be loaded
    pub async fn analyze(
        &self,
        negotiation_id: &NegotiationId,
        number: u32,
    ) -> RedlineResult<AnalysisContext> {
        let stages = self.stage_list()?;
        Ok(self
            .orchestrator
            .analyze(negotiation_id, number, &stages, &self.config.pipeline.params)
            .await?)
    }

    /// Analyze every version of a negotiation that has no analysis yet
    ///
    /// Runs at most `pipeline.max_concurrent` versions at once; contexts are
    /// returned in version order.
    ///
    /// # Errors
    /// Store errors while loading versions, or an invalid stage list
    pub async fn analyze_pending(
        &self,
        negotiation_id: &NegotiationId,
    ) -> RedlineResult<Vec<AnalysisContext>> {
        let stages = self.stage_list()?;
        let negotiation = self.store.get_negotiation(negotiation_id).await?;

        let mut jobs = Vec::new();
        for descriptor in negotiation.versions() {
            let version = self
                .store
                .get_version(negotiation_id, &descriptor.version_id)
                .await?;
            if version.analysis().is_none() {
                jobs.push(BatchJob {
                    version,
                    stages: stages.clone(),
                    config: self.config.pipeline.params.clone(),
                });
            }
        }

        Ok(self
            .orchestrator
            .run_batch(&jobs, self.config.pipeline.max_concurrent)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_pipeline::PersistenceStatus;
    use serde_json::json;

    async fn memory() -> Redline {
        Redline::from_config(
            RedlineConfig::new()
                .with_memory_storage()
                .with_params(json!({"keywords": {"unlimited liability": "critical"}})),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn analyze_runs_builtin_stages() {
        let redline = memory().await;
        let deal = redline.create_negotiation("acme", "Acme").await.unwrap();
        redline
            .add_version(
                deal.id(),
                "1. Term\nOne year.\n\n2. Liability\nUnlimited liability applies.\n".into(),
                Provenance::Counterparty,
                None,
            )
            .await
            .unwrap();

        let ctx = redline.analyze(deal.id(), 1).await.unwrap();

        assert_eq!(ctx.persistence(), &PersistenceStatus::Attached);
        assert_eq!(
            ctx.output("keyword-flags"),
            Some(&json!([{"clause": 2, "phrase": "unlimited liability", "severity": "critical"}]))
        );
        assert_eq!(ctx.summary().critical, 1);
    }

    #[tokio::test]
    async fn unknown_configured_stage_fails_analysis() {
        let redline = Redline::from_config(
            RedlineConfig::new()
                .with_memory_storage()
                .with_stages(["clauses", "translate"]),
        )
        .await
        .unwrap();
        let deal = redline.create_negotiation("acme", "Acme").await.unwrap();
        redline
            .add_version(deal.id(), "text".into(), Provenance::Internal, None)
            .await
            .unwrap();

        let err = redline.analyze(deal.id(), 1).await.unwrap_err();
        assert!(matches!(
            err,
            crate::RedlineError::Pipeline(redline_pipeline::PipelineError::UnknownStage(_))
        ));
    }

    #[tokio::test]
    async fn analyze_pending_skips_analyzed_versions() {
        let redline = memory().await;
        let deal = redline.create_negotiation("acme", "Acme").await.unwrap();
        for text in ["a", "b", "c"] {
            redline
                .add_version(deal.id(), text.into(), Provenance::Internal, None)
                .await
                .unwrap();
        }
        redline.analyze(deal.id(), 2).await.unwrap();

        let contexts = redline.analyze_pending(deal.id()).await.unwrap();
        let numbers: Vec<u32> = contexts.iter().map(|c| c.version_id().number()).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert!(redline.analyze_pending(deal.id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let err = Redline::from_config(RedlineConfig::new().with_stage_timeout_secs(0))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::RedlineError::Config(_)));
    }
}
