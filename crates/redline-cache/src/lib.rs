//! Redline Transformation Cache
//!
//! Memoizes pipeline stage outputs so re-analyzing unchanged text with an
//! unchanged configuration skips the stage entirely.
//!
//! # Core Concepts
//!
//! - [`CacheKey`]: BLAKE3 of fingerprint, stage name and canonical config
//! - [`TransformationCache`]: async get/put with per-entry time-to-live
//! - [`MokaTransformationCache`]: bounded in-process cache
//! - [`NullCache`]: always misses, used when caching is disabled
//!
//! # Example
//!
//! ```rust
//! use redline_cache::CacheKey;
//! use redline_content::Fingerprint;
//! use serde_json::json;
//!
//! let fp = Fingerprint::of_text("Liability: 1x fees\n");
//! let a = CacheKey::derive(&fp, "review", &json!({"model": "m", "depth": 2}));
//! let b = CacheKey::derive(&fp, "review", &json!({"depth": 2, "model": "m"}));
//! assert_eq!(a, b);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod cache;
mod key;
mod moka_cache;

pub use cache::{CacheStats, NullCache, TransformationCache};
pub use key::CacheKey;
pub use moka_cache::{MokaTransformationCache, DEFAULT_MAX_CAPACITY, MAX_TTL};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
