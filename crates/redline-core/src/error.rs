//! Error types for the Redline facade

use crate::config::ConfigError;
use redline_pipeline::PipelineError;
use redline_store::{BackendError, StoreError};

/// Facade error type
#[derive(Debug, thiserror::Error)]
pub enum RedlineError {
    /// Configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage backend could not be opened
    #[error("failed to open storage: {0}")]
    Backend(#[from] BackendError),

    /// Store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Pipeline setup failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl RedlineError {
    /// Check if error is a rejected duplicate upload
    #[inline]
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_duplicate())
    }

    /// Check if error is a missing record
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store(e) | Self::Pipeline(PipelineError::Store(e)) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Result type alias for facade operations
pub type RedlineResult<T> = Result<T, RedlineError>;
