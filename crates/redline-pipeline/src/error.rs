//! Error types for the analysis pipeline
//!
//! Two levels:
//! - [`StageFailure`] is what a stage returns; the orchestrator records it
//!   on the context and moves on
//! - [`PipelineError`] covers setup problems that prevent a run

use redline_store::{StageErrorKind, StoreError};

/// Failure reported by a stage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageFailure {
    /// Stage could not produce output
    #[error("{0}")]
    Failed(String),

    /// Stage produced output that does not have the expected shape
    #[error("malformed output: {0}")]
    MalformedOutput(String),
}

impl StageFailure {
    /// Create failed error
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Create malformed output error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput(message.into())
    }

    /// Kind recorded on the context
    #[inline]
    #[must_use]
    pub fn kind(&self) -> StageErrorKind {
        match self {
            Self::Failed(_) => StageErrorKind::Failed,
            Self::MalformedOutput(_) => StageErrorKind::MalformedOutput,
        }
    }
}

/// Pipeline setup error
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Stage name not present in the registry
    #[error("unknown stage: '{0}'")]
    UnknownStage(String),

    /// Stage listed more than once
    #[error("stage listed twice: '{0}'")]
    DuplicateStage(String),

    /// Version could not be loaded
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
