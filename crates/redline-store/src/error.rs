//! Error types for the version store
//!
//! Identity- and storage-level failures are returned to the direct caller.
//! Duplicate uploads are an error variant so callers can always tell a
//! rejected re-submission apart from a created version.

use crate::backend::RecordKey;
use crate::types::{NegotiationId, VersionId};
use redline_content::Fingerprint;
use std::path::PathBuf;

/// Main store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Submitted text matches an existing version of the negotiation
    #[error("duplicate version: content is identical to version {existing_version} of '{negotiation}'")]
    DuplicateVersion {
        negotiation: NegotiationId,
        existing_version: u32,
        fingerprint: Fingerprint,
    },

    /// Unknown negotiation or version
    #[error("not found: {0}")]
    NotFound(RecordKey),

    /// Negotiation id already in use
    #[error("negotiation already exists: '{0}'")]
    AlreadyExists(NegotiationId),

    /// Analysis was already attached to this version
    #[error("version already analyzed: '{0}'")]
    AlreadyAnalyzed(VersionId),

    /// Persisted record failed to deserialize
    #[error("corrupt record {key}: {source}")]
    CorruptStorage {
        key: RecordKey,
        #[source]
        source: serde_json::Error,
    },

    /// Record could not be encoded
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: RecordKey,
        #[source]
        source: serde_json::Error,
    },

    /// Malformed identifier
    #[error("invalid identifier '{value}': {reason}")]
    InvalidId { value: String, reason: &'static str },

    /// Unrecognized provenance tag
    #[error("invalid provenance '{0}': expected 'internal' or 'counterparty'")]
    InvalidProvenance(String),

    /// Persistence backend failure
    #[error("storage backend error: {0}")]
    Backend(#[from] BackendError),
}

impl StoreError {
    /// Create invalid id error
    pub(crate) fn invalid_id(value: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidId {
            value: value.into(),
            reason,
        }
    }

    /// Check if error is a duplicate rejection
    #[inline]
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateVersion { .. })
    }

    /// Version number already holding the submitted content
    #[inline]
    #[must_use]
    pub fn duplicate_of(&self) -> Option<u32> {
        match self {
            Self::DuplicateVersion {
                existing_version, ..
            } => Some(*existing_version),
            _ => None,
        }
    }

    /// Check if error is a missing record
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if error is a corrupt record
    #[inline]
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptStorage { .. })
    }
}

/// Errors raised by storage backends
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Atomic create hit an existing record
    #[error("record already exists: {0}")]
    AlreadyExists(RecordKey),

    /// IO error on a record path
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackendError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
