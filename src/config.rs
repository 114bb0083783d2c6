//! Resilience configuration.
//!
//! Loaded from a TOML file with environment overrides using the
//! `AUTH_RESILIENCE` prefix and `__` as the nesting separator, e.g.
//! `AUTH_RESILIENCE__MAX_RETRIES=5` or `AUTH_RESILIENCE__LOGGING__LEVEL=debug`.

use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{LogLevel, LoggingConfig};
use crate::retry::RetryPolicy;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "AUTH_RESILIENCE";

/// Largest accepted `refresh_skew_secs` (one year).
pub const MAX_REFRESH_SKEW_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub timestamps: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            timestamps: true,
        }
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        LoggingConfig::new()
            .with_level(settings.level)
            .with_timestamps(settings.timestamps)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Cap on any single backoff delay.
    pub max_delay_ms: u64,
    /// Floor between two consecutive attempts.
    pub min_spacing_ms: u64,
    /// Tokens expiring within this window are refreshed ahead of time.
    pub refresh_skew_secs: u64,
    /// Single-flight key used for token refresh.
    pub refresh_operation: String,
    pub logging: LoggingSettings,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            min_spacing_ms: 1000,
            refresh_skew_secs: 60,
            refresh_operation: "tokenRefresh".to_string(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ResilienceConfig {
    /// Loads configuration from `path`, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or the
    /// resulting values fail [`ResilienceConfig::validate`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path_str.to_string()));
        }

        let config = Config::builder()
            .add_source(File::with_name(path_str))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: ResilienceConfig = config.try_deserialize()?;
        loaded.validate()?;
        tracing::debug!(path = path_str, max_retries = loaded.max_retries, "configuration loaded");
        Ok(loaded)
    }

    /// Parses an in-memory TOML document. No environment overrides apply.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let parsed: ResilienceConfig = toml::from_str(source)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "base_delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "max_delay_ms ({}) must not be below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if self.refresh_skew_secs > MAX_REFRESH_SKEW_SECS {
            return Err(ConfigError::Invalid(format!(
                "refresh_skew_secs ({}) must not exceed {}",
                self.refresh_skew_secs, MAX_REFRESH_SKEW_SECS
            )));
        }
        if self.refresh_operation.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "refresh_operation must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry policy built from the delay and retry settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_min_spacing(Duration::from_millis(self.min_spacing_ms))
    }

    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from(&self.logging)
    }
}
