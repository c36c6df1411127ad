//! Tracked state table configuration.

use std::{collections::HashSet, path::Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::types::RESERVED_STATE_FIELDS;

/// Name of the blocks table. Not available for state tables.
pub const BLOCKS_TABLE: &str = "blocks";

/// Binding of an entity type to the state table that versions it.
///
/// Keys keep the names used by existing deployment files, so the entity type
/// is read from `proto_message_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableConfig {
    /// State table name.
    pub name: String,
    /// Payload field whose value identifies the entity.
    pub index: String,
    /// Entity-type name callers submit state under.
    #[serde(rename = "proto_message_name")]
    pub entity_type: String,
    /// Message schema file describing the payload, relative to the schema directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto_file: Option<String>,
}

#[bon::bon]
impl TableConfig {
    /// Creates a new table binding with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a name is empty or reserved.
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(into)] index: String,
        #[builder(into)] entity_type: String,
        #[builder(into)] proto_file: Option<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self { name, index, entity_type, proto_file };
        config.validate()?;
        Ok(config)
    }
}

impl TableConfig {
    /// Validates the binding.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `name`, `index` or `proto_message_name` is empty
    /// - `name` is `blocks` or contains `'.'` (used by internal index tables)
    /// - `index` is a ledger-owned field
    /// - `proto_file` is absolute or not a `.proto` file
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(validation("table name must not be empty".to_string()));
        }
        if self.name == BLOCKS_TABLE {
            return Err(validation(format!("table name \"{BLOCKS_TABLE}\" is reserved")));
        }
        if self.name.contains('.') {
            return Err(validation(format!("table name \"{}\" must not contain '.'", self.name)));
        }
        if self.index.is_empty() {
            return Err(validation(format!("table \"{}\" has an empty index", self.name)));
        }
        if RESERVED_STATE_FIELDS.contains(&self.index.as_str()) {
            return Err(validation(format!(
                "table \"{}\" cannot index ledger field \"{}\"",
                self.name, self.index
            )));
        }
        if self.entity_type.is_empty() {
            return Err(validation(format!(
                "table \"{}\" has an empty proto_message_name",
                self.name
            )));
        }
        if let Some(proto_file) = &self.proto_file {
            let path = Path::new(proto_file);
            if path.is_absolute() || path.extension().is_none_or(|ext| ext != "proto") {
                return Err(validation(format!(
                    "table \"{}\" proto_file \"{proto_file}\" must be a relative .proto path",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Validates each table and that names and entity types are unique.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] describing the first violation found.
pub fn validate_tables(tables: &[TableConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut entity_types = HashSet::new();
    for table in tables {
        table.validate()?;
        if !names.insert(table.name.as_str()) {
            return Err(validation(format!("duplicate table \"{}\"", table.name)));
        }
        if !entity_types.insert(table.entity_type.as_str()) {
            return Err(validation(format!("duplicate entity type \"{}\"", table.entity_type)));
        }
    }
    Ok(())
}

fn validation(message: String) -> ConfigError {
    ConfigError::Validation { message }
}
