//! Redline Analysis Pipeline
//!
//! Runs an ordered list of opaque stages over a stored version, memoizing
//! stage outputs in a [`TransformationCache`](redline_cache::TransformationCache)
//! and attaching the summarized result to the version.
//!
//! # Core Concepts
//!
//! - [`Stage`]: async `(context, config) -> payload` transformation
//! - [`StageRegistry`] / [`StageList`]: stages by name, and the ordered
//!   selection for one run
//! - [`AnalysisContext`]: outputs, errors and state of one run
//! - [`Orchestrator`]: cache lookup, timeout, panic isolation, persistence
//!
//! A failing stage never stops the run: its error is recorded inline and
//! the next stage proceeds.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod context;
mod error;
mod orchestrator;
mod stage;

pub use context::{AnalysisContext, PersistenceStatus, PipelineState};
pub use error::{PipelineError, StageFailure};
pub use orchestrator::{
    BatchJob, Orchestrator, PipelineSettings, StageEvent, DEFAULT_CACHE_TTL, DEFAULT_STAGE_TIMEOUT,
};
pub use stage::{FnStage, Stage, StageList, StageRegistry};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
