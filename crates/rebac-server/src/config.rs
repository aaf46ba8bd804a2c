//! Configuration management for the rebac service.
//!
//! Configuration is layered from three sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use rebac_server::config::RebacConfig;
//!
//! // Load from file with env overrides
//! let config = RebacConfig::load("config.yaml")?;
//!
//! // Or load from environment only
//! let config = RebacConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use rebac_domain::ResolverConfig;
use rebac_storage::DeleteMode;

const ENV_PREFIX: &str = "REBAC";

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RebacConfig {
    /// Query engine limits
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Tuple store settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Query engine limits.
///
/// Overridable with `REBAC_RESOLVER__<FIELD>`, e.g.
/// `REBAC_RESOLVER__MAX_DEPTH=30`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResolverSettings {
    /// Maximum nested relation evaluations per query.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Timeout in milliseconds for queries without a caller deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Default cap on ListObjects results.
    #[serde(default = "default_max_results")]
    pub list_objects_max_results: usize,

    /// Default cap on ListUsers results.
    #[serde(default = "default_max_results")]
    pub list_users_max_results: usize,

    /// Checks evaluated concurrently by one BatchCheck.
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            timeout_ms: default_timeout_ms(),
            list_objects_max_results: default_max_results(),
            list_users_max_results: default_max_results(),
            max_concurrent_checks: default_max_concurrent_checks(),
        }
    }
}

fn default_max_depth() -> u32 {
    25
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_results() -> usize {
    1000
}

fn default_max_concurrent_checks() -> usize {
    50
}

/// Tuple store settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Behaviour for deletes of missing tuples: "strict" or "lenient"
    #[serde(default)]
    pub delete_mode: DeleteMode,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl RebacConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `REBAC_` and use `__` as separator,
    /// so `REBAC_STORAGE__DELETE_MODE=lenient` overrides `storage.delete_mode`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&RebacConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let rebac_config: RebacConfig = config.try_deserialize()?;
        rebac_config.validate()?;

        Ok(rebac_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&RebacConfig::default())?)
            .add_source(env_source())
            .build()?;

        let rebac_config: RebacConfig = config.try_deserialize()?;
        rebac_config.validate()?;

        Ok(rebac_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let resolver = &self.resolver;
        let positive = [
            ("resolver.max_depth", u64::from(resolver.max_depth)),
            ("resolver.timeout_ms", resolver.timeout_ms),
            (
                "resolver.list_objects_max_results",
                resolver.list_objects_max_results as u64,
            ),
            (
                "resolver.list_users_max_results",
                resolver.list_users_max_results as u64,
            ),
            (
                "resolver.max_concurrent_checks",
                resolver.max_concurrent_checks as u64,
            ),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigLoadError::Invalid {
                message: format!("{name} must be greater than 0"),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Resolver limits derived from the `resolver` section.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_max_depth(self.resolver.max_depth)
            .with_timeout(Duration::from_millis(self.resolver.timeout_ms))
            .with_list_objects_max_results(self.resolver.list_objects_max_results)
            .with_list_users_max_results(self.resolver.list_users_max_results)
            .with_max_concurrent_checks(self.resolver.max_concurrent_checks)
    }
}

// REBAC_RESOLVER__MAX_DEPTH -> resolver.max_depth
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
