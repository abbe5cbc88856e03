//! Redline Version Store
//!
//! Append-only, deduplicated history of negotiated documents.
//!
//! # Core Concepts
//!
//! - [`VersionStore`]: creates negotiations, assigns version numbers,
//!   rejects duplicate content, attaches analyses
//! - [`StorageBackend`]: durable record storage ([`FileBackend`],
//!   [`MemoryBackend`])
//! - [`Timeline`]: restartable, ordered stream of a negotiation's versions
//! - [`AnalysisResult`]: summarized pipeline run stored on a version
//!
//! # Example
//!
//! ```rust
//! use redline_store::{Provenance, VersionStore};
//!
//! # tokio_test_block(async {
//! let store = VersionStore::in_memory();
//! let deal = store.create_negotiation("acme", "Acme MSA").await?;
//!
//! let v1 = store
//!     .add_version(deal.id(), "Liability: 1x fees\n", Provenance::Internal, None)
//!     .await?;
//! assert_eq!(v1.number(), 1);
//!
//! let again = store
//!     .add_version(deal.id(), "Liability: 1x fees\n", Provenance::Counterparty, None)
//!     .await;
//! assert_eq!(again.unwrap_err().duplicate_of(), Some(1));
//! # Ok::<(), redline_store::StoreError>(())
//! # }).unwrap();
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod analysis;
pub mod backend;
mod error;
mod store;
mod timeline;
mod types;

pub use analysis::{
    AnalysisResult, AnalysisSummary, StageErrorKind, StageErrorRecord, StageOutcome, StageStatus,
};
pub use backend::{FileBackend, MemoryBackend, RecordKey, RecordKind, StorageBackend};
pub use error::{BackendError, StoreError, StoreResult};
pub use store::VersionStore;
pub use timeline::Timeline;
pub use types::{
    Negotiation, NegotiationId, NegotiationStatus, NegotiationSummary, Provenance, TimelineEntry,
    Version, VersionComparison, VersionDescriptor, VersionId, MAX_ID_LEN,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
