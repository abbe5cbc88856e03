//! Negotiation timelines
//!
//! A [`Timeline`] is a snapshot of a negotiation's version list. Entries are
//! loaded lazily, one version record per item, every time the timeline is
//! streamed, so the sequence can be restarted without going back to the
//! store.

use crate::backend::{RecordKey, StorageBackend};
use crate::error::StoreError;
use crate::store::read_record;
use crate::types::{NegotiationId, TimelineEntry, Version, VersionDescriptor};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Restartable, ordered view of a negotiation's versions
#[derive(Debug, Clone)]
pub struct Timeline {
    negotiation: NegotiationId,
    descriptors: Arc<[VersionDescriptor]>,
    backend: Arc<dyn StorageBackend>,
}

impl Timeline {
    pub(crate) fn new(
        negotiation: NegotiationId,
        mut descriptors: Vec<VersionDescriptor>,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        descriptors.sort_by_key(|d| d.number);
        Self {
            negotiation,
            descriptors: descriptors.into(),
            backend,
        }
    }

    /// Negotiation this timeline belongs to
    #[inline]
    #[must_use]
    pub fn negotiation(&self) -> &NegotiationId {
        &self.negotiation
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if the negotiation has no versions
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Stream entries in ascending version order
    ///
    /// Each call starts a fresh pass over the same versions.
    #[must_use]
    pub fn stream(&self) -> BoxStream<'static, Result<TimelineEntry, StoreError>> {
        let backend = Arc::clone(&self.backend);
        let descriptors = Arc::clone(&self.descriptors);

        stream::iter(0..descriptors.len())
            .then(move |i| {
                let backend = Arc::clone(&backend);
                let key = RecordKey::Version(descriptors[i].version_id.clone());
                async move {
                    let version: Version = read_record(backend.as_ref(), &key).await?;
                    Ok(TimelineEntry::from(&version))
                }
            })
            .boxed()
    }

    /// Load every entry
    ///
    /// # Errors
    /// Returns the first error hit while loading a version record
    pub async fn collect(&self) -> Result<Vec<TimelineEntry>, StoreError> {
        self.stream().try_collect().await
    }
}
