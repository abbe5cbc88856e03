//! In-memory backend

use super::{RecordKey, RecordKind, StorageBackend};
use crate::error::BackendError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Concurrent map of record bytes
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: DashMap<RecordKey, Vec<u8>>,
}

impl MemoryBackend {
    /// Create empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no records are stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn create(&self, key: &RecordKey, bytes: Vec<u8>) -> Result<(), BackendError> {
        match self.records.entry(key.clone()) {
            Entry::Occupied(_) => Err(BackendError::AlreadyExists(key.clone())),
            Entry::Vacant(slot) => {
                slot.insert(bytes);
                Ok(())
            }
        }
    }

    async fn put(&self, key: &RecordKey, bytes: Vec<u8>) -> Result<(), BackendError> {
        self.records.insert(key.clone(), bytes);
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<RecordKey>, BackendError> {
        let mut keys: Vec<RecordKey> = self
            .records
            .iter()
            .map(|r| r.key().clone())
            .filter(|k| k.kind() == kind)
            .collect();
        keys.sort();
        Ok(keys)
    }
}
