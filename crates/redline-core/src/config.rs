//! Configuration
//!
//! Loaded from TOML; every field has a default so an empty file (or no
//! file) is a working configuration.
//!
//! ```toml
//! [storage]
//! backend = "file"
//! root = "./negotiations"
//!
//! [cache]
//! enabled = true
//! ttl_secs = 3600
//!
//! [pipeline]
//! stage_timeout_secs = 60
//! stages = ["clauses", "keyword-flags"]
//!
//! [pipeline.params.keywords]
//! "unlimited liability" = "critical"
//! ```

use redline_pipeline::PipelineSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but are unusable
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create invalid config error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedlineConfig {
    /// Where records live
    pub storage: StorageConfig,
    /// Transformation cache
    pub cache: CacheConfig,
    /// Stage selection and limits
    pub pipeline: PipelineConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON files under `root`
    #[default]
    File,
    /// Process memory, lost on exit
    Memory,
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Root directory of the file backend
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            root: PathBuf::from("./negotiations"),
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry bound
    pub max_capacity: u64,
    /// Lifetime of cached stage outputs
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: redline_cache::DEFAULT_MAX_CAPACITY,
            ttl_secs: 3600,
        }
    }
}

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-stage time budget
    pub stage_timeout_secs: u64,
    /// Batch concurrency bound
    pub max_concurrent: usize,
    /// Stage names in run order
    pub stages: Vec<String>,
    /// Configuration object passed to every stage
    pub params: Value,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 60,
            max_concurrent: 5,
            stages: vec!["clauses".to_string(), "keyword-flags".to_string()],
            params: Value::Object(Map::new()),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl RedlineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is unreadable, malformed, or invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` or `ConfigError::Invalid`
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(ConfigError::invalid("pipeline.stage_timeout_secs must be positive"));
        }
        if self.pipeline.max_concurrent == 0 {
            return Err(ConfigError::invalid("pipeline.max_concurrent must be positive"));
        }
        if !self.pipeline.params.is_object() {
            return Err(ConfigError::invalid("pipeline.params must be a table"));
        }
        if self.cache.enabled && self.cache.max_capacity == 0 {
            return Err(ConfigError::invalid("cache.max_capacity must be positive"));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::invalid("cache.ttl_secs must be positive"));
        }
        if self.cache.enabled && self.cache.ttl_secs > redline_cache::MAX_TTL.as_secs() {
            return Err(ConfigError::invalid(format!(
                "cache.ttl_secs must be at most {}",
                redline_cache::MAX_TTL.as_secs()
            )));
        }
        if self.storage.backend == BackendKind::File && self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::invalid("storage.root must not be empty"));
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(ConfigError::invalid(format!(
                "logging.level is not a valid filter: '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// With file storage under `root`
    #[must_use]
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage.backend = BackendKind::File;
        self.storage.root = root.into();
        self
    }

    /// With in-memory storage
    #[must_use]
    pub fn with_memory_storage(mut self) -> Self {
        self.storage.backend = BackendKind::Memory;
        self
    }

    /// Enable or disable the cache
    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }

    /// With stage timeout
    #[must_use]
    pub fn with_stage_timeout_secs(mut self, secs: u64) -> Self {
        self.pipeline.stage_timeout_secs = secs;
        self
    }

    /// With stage names in run order
    #[must_use]
    pub fn with_stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline.stages = stages.into_iter().map(Into::into).collect();
        self
    }

    /// With stage configuration object
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.pipeline.params = params;
        self
    }

    /// With log filter
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Per-stage time budget
    #[inline]
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.stage_timeout_secs)
    }

    /// Cached output lifetime
    #[inline]
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Orchestrator settings
    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings::default()
            .with_stage_timeout(self.stage_timeout())
            .with_cache_ttl(self.cache_ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn empty_toml_is_default() {
        let config = RedlineConfig::from_toml_str("").unwrap();
        assert_eq!(config, RedlineConfig::default());
        assert_eq!(config.stage_timeout(), Duration::from_secs(60));
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.pipeline.stages, vec!["clauses", "keyword-flags"]);
    }

    #[test]
    fn parses_full_file() {
        let config = RedlineConfig::from_toml_str(
            r#"
            [storage]
            backend = "memory"

            [cache]
            enabled = false

            [pipeline]
            stage_timeout_secs = 5
            stages = ["clauses"]

            [pipeline.params.keywords]
            "unlimited liability" = "critical"

            [logging]
            level = "redline=debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert!(!config.cache.enabled);
        assert_eq!(config.pipeline.stage_timeout_secs, 5);
        assert_eq!(
            config.pipeline.params,
            json!({"keywords": {"unlimited liability": "critical"}})
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.pipeline_settings().stage_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = RedlineConfig::from_toml_str("[storage]\nbackend = \"s3\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = RedlineConfig::from_toml_str("[pipeline]\nstage_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("stage_timeout_secs")));
    }

    #[test]
    fn rejects_unbounded_cache_ttl() {
        let err = RedlineConfig::from_toml_str("[cache]\nttl_secs = 9223372036854775807")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("cache.ttl_secs")));

        let limit = format!("[cache]\nttl_secs = {}", redline_cache::MAX_TTL.as_secs());
        assert!(RedlineConfig::from_toml_str(&limit).is_ok());
    }

    #[test]
    fn disabled_cache_skips_cache_checks() {
        let config = RedlineConfig::from_toml_str("[cache]\nenabled = false\nttl_secs = 0");
        assert!(config.is_ok());
    }

    #[test]
    fn builders_compose() {
        let config = RedlineConfig::new()
            .with_memory_storage()
            .with_cache_enabled(false)
            .with_stages(["keyword-flags"])
            .with_params(json!({"keywords": {"indemnify": "high"}}))
            .with_log_level("warn");

        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.pipeline.stages, vec!["keyword-flags"]);
    }

    #[test]
    fn params_must_be_a_table() {
        let config = RedlineConfig::new().with_params(json!([1, 2]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = RedlineConfig::load("/nonexistent/redline.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
