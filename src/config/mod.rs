//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod txlog;

pub use txlog::{
    RestoreConfig, TxLogConfig, UnrecognizedMethodPolicy, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SOURCE, DEFAULT_TOPIC_PREFIX,
};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "txlog.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TXLOG_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TXLOG";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TXLOG_LOG";

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transaction log configuration.
    pub txlog: TxLogConfig,
    /// Restore session configuration.
    pub restore: RestoreConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `txlog.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `TXLOG__RESTORE__POLL_INTERVAL_MS=500`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create config for testing: short poll interval, defaults otherwise.
    pub fn for_test() -> Self {
        Self {
            restore: RestoreConfig {
                poll_interval_ms: 50,
                ..RestoreConfig::default()
            },
            ..Self::default()
        }
    }
}
