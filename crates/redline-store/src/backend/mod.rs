//! Persistence backends
//!
//! The store reaches durable state only through [`StorageBackend`], so the
//! same store logic runs against a directory of JSON files or an in-memory
//! map. Backends move opaque bytes; encoding is the store's concern.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::error::BackendError;
use crate::types::{NegotiationId, VersionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// One record per negotiation
    Negotiation,
    /// One record per version
    Version,
}

/// Address of a persisted record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKey {
    /// Negotiation record
    Negotiation(NegotiationId),
    /// Version record
    Version(VersionId),
}

impl RecordKey {
    /// Family of this record
    #[inline]
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Negotiation(_) => RecordKind::Negotiation,
            Self::Version(_) => RecordKind::Version,
        }
    }

    /// Name unique within the record family
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Negotiation(id) => id.to_string(),
            Self::Version(id) => id.to_string(),
        }
    }

    /// Rebuild a key from its family and name
    #[must_use]
    pub fn from_name(kind: RecordKind, name: &str) -> Option<Self> {
        match kind {
            RecordKind::Negotiation => NegotiationId::parse(name).ok().map(Self::Negotiation),
            RecordKind::Version => name.parse().ok().map(Self::Version),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negotiation(id) => write!(f, "negotiation '{id}'"),
            Self::Version(id) => write!(f, "version '{id}'"),
        }
    }
}

/// Durable, queryable-by-key record storage
///
/// Implementations must be safe for concurrent callers. The store
/// serializes writes per negotiation, so backends only need per-call
/// atomicity.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Atomically create a record
    ///
    /// # Errors
    /// `BackendError::AlreadyExists` if the key is taken
    async fn create(&self, key: &RecordKey, bytes: Vec<u8>) -> Result<(), BackendError>;

    /// Atomically replace (or create) a record
    async fn put(&self, key: &RecordKey, bytes: Vec<u8>) -> Result<(), BackendError>;

    /// Read a record, `None` if absent
    async fn get(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, BackendError>;

    /// All keys of one family, sorted
    async fn list(&self, kind: RecordKind) -> Result<Vec<RecordKey>, BackendError>;
}
