//! Version store
//!
//! Owns negotiation and version records. All writes go through this type:
//! - `add_version` rejects content already present in the negotiation
//! - version numbers are assigned under a per-negotiation lock
//! - analysis results attach exactly once

use crate::analysis::AnalysisResult;
use crate::backend::{MemoryBackend, RecordKey, RecordKind, StorageBackend};
use crate::error::{BackendError, StoreError, StoreResult};
use crate::timeline::Timeline;
use crate::types::{
    Negotiation, NegotiationId, NegotiationStatus, NegotiationSummary, Provenance, Version,
    VersionComparison, VersionId,
};
use dashmap::DashMap;
use redline_content::{DiffEngine, Fingerprint};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Deduplicated, append-only version store
#[derive(Debug)]
pub struct VersionStore {
    backend: Arc<dyn StorageBackend>,
    /// Serializes writes per negotiation
    locks: DashMap<NegotiationId, Arc<Mutex<()>>>,
    diff: DiffEngine,
}

impl VersionStore {
    /// Create store over a backend
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            locks: DashMap::new(),
            diff: DiffEngine::new(),
        }
    }

    /// Store backed by a fresh [`MemoryBackend`]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// With a custom diff engine for `compare`
    #[must_use]
    pub fn with_diff_engine(mut self, diff: DiffEngine) -> Self {
        self.diff = diff;
        self
    }

    /// Underlying backend
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    fn lock_for(&self, id: &NegotiationId) -> Arc<Mutex<()>> {
        Arc::clone(&self.locks.entry(id.clone()).or_default())
    }

    /// Create a new negotiation
    ///
    /// # Errors
    /// - `StoreError::InvalidId` if `id` is not a slug
    /// - `StoreError::AlreadyExists` if `id` is in use
    pub async fn create_negotiation(
        &self,
        id: &str,
        title: impl Into<String>,
    ) -> StoreResult<Negotiation> {
        let id = NegotiationId::parse(id)?;
        let negotiation = Negotiation::new(id.clone(), title);
        let key = RecordKey::Negotiation(id.clone());

        match self.backend.create(&key, encode(&key, &negotiation)?).await {
            Ok(()) => {}
            Err(BackendError::AlreadyExists(_)) => return Err(StoreError::AlreadyExists(id)),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(negotiation = %id, title = negotiation.title(), "Created negotiation");
        Ok(negotiation)
    }

    /// Load a negotiation record
    ///
    /// # Errors
    /// `StoreError::NotFound` for an unknown id
    pub async fn get_negotiation(&self, id: &NegotiationId) -> StoreResult<Negotiation> {
        read_record(self.backend.as_ref(), &RecordKey::Negotiation(id.clone())).await
    }

    /// Store a new version unless its content is already present
    ///
    /// # Errors
    /// - `StoreError::DuplicateVersion` naming the version that already holds
    ///   this text; nothing is written
    /// - `StoreError::NotFound` for an unknown negotiation
    pub async fn add_version(
        &self,
        negotiation_id: &NegotiationId,
        text: impl Into<String>,
        provenance: Provenance,
        note: Option<String>,
    ) -> StoreResult<Version> {
        let text = text.into();
        let fingerprint = Fingerprint::of_text(&text);

        let lock = self.lock_for(negotiation_id);
        let _guard = lock.lock().await;

        let mut negotiation = self.get_negotiation(negotiation_id).await?;

        if let Some(existing) = negotiation.find_by_fingerprint(&fingerprint) {
            tracing::warn!(
                negotiation = %negotiation_id,
                existing_version = existing.number,
                fingerprint = %fingerprint.short(),
                "Rejected duplicate version"
            );
            return Err(StoreError::DuplicateVersion {
                negotiation: negotiation_id.clone(),
                existing_version: existing.number,
                fingerprint,
            });
        }

        let number = negotiation.next_version_number();
        let version = Version::new(
            negotiation_id.clone(),
            number,
            text,
            fingerprint,
            provenance,
            note,
        );

        // Numbers absent from the negotiation record are unclaimed; a file
        // left by an add whose negotiation write failed is overwritten.
        let version_key = RecordKey::Version(version.id().clone());
        self.backend
            .put(&version_key, encode(&version_key, &version)?)
            .await?;

        negotiation.push_version(version.descriptor());
        self.write_negotiation(&negotiation).await?;

        tracing::info!(
            version = %version.id(),
            provenance = %provenance,
            fingerprint = %fingerprint.short(),
            "Added version"
        );
        Ok(version)
    }

    /// Load a version of a negotiation
    ///
    /// # Errors
    /// `StoreError::NotFound` if the version does not exist or belongs to a
    /// different negotiation
    pub async fn get_version(
        &self,
        negotiation_id: &NegotiationId,
        version_id: &VersionId,
    ) -> StoreResult<Version> {
        if version_id.negotiation() != negotiation_id {
            return Err(StoreError::NotFound(RecordKey::Version(version_id.clone())));
        }
        read_record(self.backend.as_ref(), &RecordKey::Version(version_id.clone())).await
    }

    /// Load a version by its number
    ///
    /// # Errors
    /// `StoreError::NotFound` for unknown negotiation or number
    pub async fn version_by_number(
        &self,
        negotiation_id: &NegotiationId,
        number: u32,
    ) -> StoreResult<Version> {
        let id = VersionId::new(negotiation_id.clone(), number);
        self.get_version(negotiation_id, &id).await
    }

    /// Ordered timeline of a negotiation's versions
    ///
    /// # Errors
    /// `StoreError::NotFound` for an unknown negotiation
    pub async fn timeline(&self, negotiation_id: &NegotiationId) -> StoreResult<Timeline> {
        let negotiation = self.get_negotiation(negotiation_id).await?;
        Ok(Timeline::new(
            negotiation_id.clone(),
            negotiation.versions().to_vec(),
            Arc::clone(&self.backend),
        ))
    }

    /// Attach the analysis of a version
    ///
    /// # Errors
    /// - `StoreError::AlreadyAnalyzed` if a result is already attached
    /// - `StoreError::NotFound` for an unknown version
    pub async fn attach_analysis(
        &self,
        version_id: &VersionId,
        result: AnalysisResult,
    ) -> StoreResult<()> {
        let lock = self.lock_for(version_id.negotiation());
        let _guard = lock.lock().await;

        let key = RecordKey::Version(version_id.clone());
        let mut version: Version = read_record(self.backend.as_ref(), &key).await?;
        version.attach_analysis(result)?;
        self.backend.put(&key, encode(&key, &version)?).await?;

        tracing::info!(version = %version_id, "Attached analysis");
        Ok(())
    }

    /// Summaries of every negotiation, newest first
    ///
    /// Corrupt negotiation records are logged and skipped so one bad file
    /// does not hide the rest.
    ///
    /// # Errors
    /// Returns backend errors from listing
    pub async fn list_negotiations(&self) -> StoreResult<Vec<NegotiationSummary>> {
        let keys = self.backend.list(RecordKind::Negotiation).await?;
        let mut summaries = Vec::with_capacity(keys.len());

        for key in keys {
            match read_record::<Negotiation>(self.backend.as_ref(), &key).await {
                Ok(negotiation) => summaries.push(negotiation.summary()),
                Err(e @ StoreError::CorruptStorage { .. }) => {
                    tracing::error!(error = %e, "Skipping corrupt negotiation record");
                }
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }

    /// Update a negotiation's status
    ///
    /// # Errors
    /// `StoreError::NotFound` for an unknown negotiation
    pub async fn set_status(
        &self,
        negotiation_id: &NegotiationId,
        status: NegotiationStatus,
    ) -> StoreResult<Negotiation> {
        let lock = self.lock_for(negotiation_id);
        let _guard = lock.lock().await;

        let mut negotiation = self.get_negotiation(negotiation_id).await?;
        negotiation.set_status(status);
        self.write_negotiation(&negotiation).await?;

        tracing::info!(negotiation = %negotiation_id, ?status, "Updated negotiation status");
        Ok(negotiation)
    }

    /// Diff two versions of one negotiation
    ///
    /// # Errors
    /// `StoreError::NotFound` if either version is missing
    pub async fn compare(
        &self,
        negotiation_id: &NegotiationId,
        old: u32,
        new: u32,
    ) -> StoreResult<VersionComparison> {
        let old = self.version_by_number(negotiation_id, old).await?;
        let new = self.version_by_number(negotiation_id, new).await?;

        let diff = self.diff.compare_labeled(
            &format!("Version {}", old.number()),
            old.text(),
            &format!("Version {}", new.number()),
            new.text(),
        );
        tracing::debug!(
            old = %old.id(),
            new = %new.id(),
            additions = diff.additions,
            deletions = diff.deletions,
            "Compared versions"
        );

        Ok(VersionComparison {
            old: old.descriptor(),
            new: new.descriptor(),
            unified: diff.to_unified(),
            summary: diff.summary(),
            diff,
        })
    }

    async fn write_negotiation(&self, negotiation: &Negotiation) -> StoreResult<()> {
        let key = RecordKey::Negotiation(negotiation.id().clone());
        self.backend.put(&key, encode(&key, negotiation)?).await?;
        Ok(())
    }
}

fn encode<T: Serialize>(key: &RecordKey, record: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec_pretty(record).map_err(|source| StoreError::Encode {
        key: key.clone(),
        source,
    })
}

/// Load and decode one record
pub(crate) async fn read_record<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &RecordKey,
) -> StoreResult<T> {
    let bytes = backend
        .get(key)
        .await?
        .ok_or_else(|| StoreError::NotFound(key.clone()))?;

    serde_json::from_slice(&bytes).map_err(|source| {
        tracing::error!(record = %key, error = %source, "Corrupt record");
        StoreError::CorruptStorage {
            key: key.clone(),
            source,
        }
    })
}
