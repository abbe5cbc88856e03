//! Redline Content Primitives
//!
//! Leaf utilities shared by every other Redline crate.
//!
//! # Core Concepts
//!
//! - [`Fingerprint`]: 32-byte BLAKE3 digest of document text, used for
//!   version deduplication and cache keys
//! - [`DiffEngine`]: Myers line diff rendered as unified-diff hunks
//! - [`DiffResult`]: hunks plus `{additions, deletions}` counts
//!
//! # Example
//!
//! ```rust
//! use redline_content::{DiffEngine, Fingerprint};
//!
//! let v1 = "Liability: 1x fees\n";
//! let v2 = "Liability: 1.5x fees\n";
//! assert_ne!(Fingerprint::of_text(v1), Fingerprint::of_text(v2));
//!
//! let diff = DiffEngine::new().compare(v1, v2);
//! assert_eq!((diff.additions, diff.deletions), (1, 1));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod diff;
mod fingerprint;

pub use diff::{
    ChangeBlock, DiffConfig, DiffEngine, DiffHunk, DiffLine, DiffResult, DiffSummary, LineChange,
};
pub use fingerprint::{Fingerprint, HashError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
