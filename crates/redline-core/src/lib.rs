//! Redline
//!
//! Version tracking and staged analysis for negotiated documents.
//!
//! # Core Concepts
//!
//! - [`RedlineConfig`]: TOML configuration with defaults for every field
//! - [`Redline`]: store, cache and orchestrator wired from configuration
//! - [`stages`]: built-in `clauses` and `keyword-flags` stages
//! - [`init_tracing`]: `tracing-subscriber` setup honoring `RUST_LOG`
//!
//! # Example
//!
//! ```rust
//! use redline_core::{Redline, RedlineConfig};
//! use redline_store::Provenance;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let redline = Redline::from_config(RedlineConfig::new().with_memory_storage()).await?;
//! let deal = redline.create_negotiation("acme", "Acme MSA").await?;
//! redline
//!     .add_version(deal.id(), "1. Term\nOne year.\n".into(), Provenance::Internal, None)
//!     .await?;
//!
//! let ctx = redline.analyze(deal.id(), 1).await?;
//! assert!(ctx.is_complete());
//! # Ok::<(), redline_core::RedlineError>(())
//! # }).unwrap();
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
mod error;
mod redline;
pub mod stages;
mod telemetry;

pub use config::{
    BackendKind, CacheConfig, ConfigError, LogFormat, LoggingConfig, PipelineConfig, RedlineConfig,
    StorageConfig,
};
pub use error::{RedlineError, RedlineResult};
pub use redline::Redline;
pub use telemetry::init_tracing;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
