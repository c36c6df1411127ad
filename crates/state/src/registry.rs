//! Entity-type to state-table bindings.

use std::collections::HashMap;

use chain_ledger_types::{
    LedgerError, Result,
    config::{ConfigError, LedgerConfig, TableConfig, validate_tables},
    error::UnknownEntityTypeSnafu,
};
use snafu::OptionExt;

/// Where states of one entity type are versioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityBinding {
    entity_type: String,
    table: String,
    index: String,
}

impl EntityBinding {
    /// Entity-type name callers submit state under.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// State table holding the versions.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Payload field identifying the entity.
    pub fn index(&self) -> &str {
        &self.index
    }
}

/// Validated, read-only set of entity bindings in configuration order.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    bindings: Vec<EntityBinding>,
    by_entity_type: HashMap<String, usize>,
}

impl TableRegistry {
    /// Builds a registry from table configurations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Configuration`] if a table is invalid, or two
    /// tables share a name or an entity type.
    pub fn new(tables: impl IntoIterator<Item = TableConfig>) -> Result<Self> {
        let tables: Vec<TableConfig> = tables.into_iter().collect();
        validate_tables(&tables).map_err(configuration)?;
        Ok(Self::from_validated(tables))
    }

    /// Builds a registry from a ledger configuration, validating all of it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Configuration`] if any section is invalid.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        config.validate().map_err(configuration)?;
        Ok(Self::from_validated(config.tables.iter().cloned()))
    }

    fn from_validated(tables: impl IntoIterator<Item = TableConfig>) -> Self {
        let mut registry = Self::default();
        for config in tables {
            registry.by_entity_type.insert(config.entity_type.clone(), registry.bindings.len());
            registry.bindings.push(EntityBinding {
                entity_type: config.entity_type,
                table: config.name,
                index: config.index,
            });
        }
        registry
    }

    /// Resolves an entity-type name to its binding.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownEntityType`] if no table is configured for it.
    pub fn resolve(&self, entity_type: &str) -> Result<&EntityBinding> {
        self.by_entity_type
            .get(entity_type)
            .and_then(|&i| self.bindings.get(i))
            .context(UnknownEntityTypeSnafu { entity_type })
    }

    /// Every binding, in configuration order.
    pub fn bindings(&self) -> &[EntityBinding] {
        &self.bindings
    }

    /// State table names, in configuration order.
    pub fn table_names(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.table.clone()).collect()
    }

    /// Returns true if no state table is configured.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn configuration(error: ConfigError) -> LedgerError {
    LedgerError::Configuration { message: error.to_string() }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chain_ledger_test_utils::table_config;
    use chain_ledger_types::ErrorCode;

    use super::*;

    #[test]
    fn test_resolve_known_entity_type() {
        let registry = TableRegistry::new([
            table_config("agents", "Agent", "publicKey"),
            table_config("records", "Record", "recordId"),
        ])
        .expect("registry");

        let binding = registry.resolve("Record").expect("resolve");
        assert_eq!(binding.table(), "records");
        assert_eq!(binding.index(), "recordId");
        assert_eq!(binding.entity_type(), "Record");
        assert_eq!(registry.table_names(), vec!["agents", "records"]);
    }

    #[test]
    fn test_unknown_entity_type() {
        let registry =
            TableRegistry::new([table_config("agents", "Agent", "id")]).expect("registry");
        let err = registry.resolve("Widget").unwrap_err();
        assert_eq!(err.code(), ErrorCode::AppConfig);
        assert!(matches!(
            err,
            LedgerError::UnknownEntityType { ref entity_type } if entity_type == "Widget"
        ));
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let err = TableRegistry::new([
            table_config("agents", "Agent", "id"),
            table_config("agents", "Other", "id"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate table"));

        let err = TableRegistry::new([
            table_config("agents", "Agent", "id"),
            table_config("others", "Agent", "id"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate entity type"));
    }

    #[test]
    fn test_invalid_table_is_rejected() {
        let mut config = table_config("agents", "Agent", "id");
        config.name = "blocks".to_string();
        let err = TableRegistry::new([config]).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration { .. }));
    }

    #[test]
    fn test_from_config_validates_whole_config() {
        let config = LedgerConfig {
            storage: chain_ledger_types::config::StorageConfig { path: "ledger.redb".into() },
            connect: Default::default(),
            tables: vec![
                table_config("agents", "Agent", "id"),
                table_config("others", "Agent", "id"),
            ],
        };
        let err = TableRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration { .. }));
        assert!(err.to_string().contains("duplicate entity type"));

        let config = LedgerConfig { tables: vec![table_config("agents", "Agent", "id")], ..config };
        let registry = TableRegistry::from_config(&config).expect("registry");
        assert_eq!(registry.table_names(), vec!["agents"]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = TableRegistry::new(Vec::new()).expect("registry");
        assert!(registry.is_empty());
        assert!(registry.bindings().is_empty());
    }
}
