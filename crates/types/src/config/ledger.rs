//! Top-level ledger configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, ConnectConfig, StorageConfig, TableConfig, validate_tables};

/// Main configuration for a ledger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerConfig {
    /// Storage location.
    pub storage: StorageConfig,
    /// Connection retry policy.
    #[serde(default)]
    pub connect: ConnectConfig,
    /// Tracked state tables, in the order they are rolled back on a fork.
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

#[bon::bon]
impl LedgerConfig {
    /// Creates a new ledger configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any nested section is invalid or
    /// two tables share a name or entity type.
    #[builder]
    pub fn new(
        storage: StorageConfig,
        #[builder(default)] connect: ConnectConfig,
        #[builder(default)] tables: Vec<TableConfig>,
    ) -> Result<Self, ConfigError> {
        let config = Self { storage, connect, tables };
        config.validate()?;
        Ok(config)
    }
}

impl LedgerConfig {
    /// Validates every section and cross-table uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.connect.validate()?;
        validate_tables(&self.tables)
    }

    /// Names of the tracked state tables, in configuration order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}
