//! Storage location and connection retry configuration.

use std::{path::PathBuf, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Storage configuration.
///
/// # Example
///
/// ```no_run
/// # use chain_ledger_types::config::StorageConfig;
/// let config = StorageConfig::builder()
///     .path("/var/lib/chain-ledger/ledger.redb")
///     .build()
///     .expect("valid storage config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfig {
    /// Path of the database file. Created by `setup` if missing.
    pub path: PathBuf,
}

#[bon::bon]
impl StorageConfig {
    /// Creates a new storage configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `path` is empty.
    #[builder]
    pub fn new(#[builder(into)] path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self { path };
        config.validate()?;
        Ok(config)
    }
}

impl StorageConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `path` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation { message: "storage.path must be set".to_string() });
        }
        Ok(())
    }
}

// =========================================================================
// ConnectConfig
// =========================================================================

/// Default delay before the first retry (1s).
fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

/// Default upper bound on the delay between retries (30s).
fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

/// Default number of connection attempts before giving up.
const fn default_max_attempts() -> u32 {
    10
}

/// Retry policy for opening the store and waiting until it is provisioned.
///
/// Delays grow exponentially from `base_delay`, doubling after every failed
/// attempt and capped at `max_delay`. After `max_attempts` failures the
/// connect call returns a terminal error.
///
/// # Validation Rules
///
/// - `max_attempts` must be > 0
/// - `base_delay` must be <= `max_delay`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectConfig {
    /// Delay after the first failed attempt.
    #[serde(default = "default_base_delay")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    #[serde(default = "default_max_delay")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub max_delay: Duration,
    /// Attempts made before connecting fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[bon::bon]
impl ConnectConfig {
    /// Creates a new connect configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_base_delay())] base_delay: Duration,
        #[builder(default = default_max_delay())] max_delay: Duration,
        #[builder(default = default_max_attempts())] max_attempts: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self { base_delay, max_delay, max_attempts };
        config.validate()?;
        Ok(config)
    }
}

impl ConnectConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "connect.max_attempts must be > 0".to_string(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::Validation {
                message: format!(
                    "connect.base_delay ({:?}) must be <= connect.max_delay ({:?})",
                    self.base_delay, self.max_delay
                ),
            });
        }
        Ok(())
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(multiplier);
        std::cmp::min(delay, self.max_delay)
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}
