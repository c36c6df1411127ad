//! Configuration types for the chain ledger.
//!
//! Configuration is loaded from TOML files and environment variables.
//! All config structs validate their values at construction time via
//! fallible builders. Post-deserialization validation is available via
//! the `validate()` method on each struct.

// The schemars `JsonSchema` derive macro internally uses `.unwrap()` in its
// expansions.
#![allow(clippy::disallowed_methods)]

mod ledger;
mod storage;
mod tables;

pub use ledger::*;
use snafu::Snafu;
pub use storage::*;
pub use tables::*;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    // =========================================================================
    // ConnectConfig validation tests
    // =========================================================================

    #[test]
    fn test_connect_config_defaults_are_valid() {
        let config = ConnectConfig::builder().build().expect("defaults should be valid");
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 10);
    }

    #[test]
    fn test_connect_config_zero_attempts_rejected() {
        let err = ConnectConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_connect_config_base_above_max_rejected() {
        let result = ConnectConfig::builder()
            .base_delay(Duration::from_secs(60))
            .max_delay(Duration::from_secs(30))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_connect_config_backoff_doubles_then_caps() {
        let config = ConnectConfig::builder()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .build()
            .expect("valid");
        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(400));
        assert_eq!(config.retry_delay(4), Duration::from_millis(500));
        assert_eq!(config.retry_delay(40), Duration::from_millis(500));
    }

    proptest! {
        #[test]
        fn prop_retry_delay_is_monotonic_and_bounded(
            base_ms in 1u64..1_000,
            extra_ms in 0u64..60_000,
            attempt in 1u32..64,
        ) {
            let config = ConnectConfig::builder()
                .base_delay(Duration::from_millis(base_ms))
                .max_delay(Duration::from_millis(base_ms + extra_ms))
                .build()
                .expect("valid");
            let delay = config.retry_delay(attempt);
            prop_assert!(delay >= config.base_delay);
            prop_assert!(delay <= config.max_delay);
            prop_assert!(config.retry_delay(attempt + 1) >= delay);
        }
    }

    // =========================================================================
    // TableConfig validation tests
    // =========================================================================

    #[test]
    fn test_table_config_requires_names() {
        assert!(TableConfig::builder().name("").index("id").entity_type("Agent").build().is_err());
        assert!(
            TableConfig::builder().name("agents").index("").entity_type("Agent").build().is_err()
        );
        assert!(TableConfig::builder().name("agents").index("id").entity_type("").build().is_err());
    }

    #[test]
    fn test_table_config_rejects_reserved_names() {
        let err = TableConfig::builder()
            .name("blocks")
            .index("blockNum")
            .entity_type("Block")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));

        let err = TableConfig::builder()
            .name("agents.by_start")
            .index("id")
            .entity_type("Agent")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'.'"));
    }

    #[test]
    fn test_table_config_rejects_reserved_index_field() {
        let result = TableConfig::builder()
            .name("agents")
            .index("startBlockNum")
            .entity_type("Agent")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_table_config_proto_file_must_be_relative_proto() {
        let ok = TableConfig::builder()
            .name("agents")
            .index("public_key")
            .entity_type("Agent")
            .proto_file("agent.proto")
            .build();
        assert!(ok.is_ok());

        let absolute = TableConfig::builder()
            .name("agents")
            .index("public_key")
            .entity_type("Agent")
            .proto_file("/etc/agent.proto")
            .build();
        assert!(absolute.is_err());

        let wrong_ext = TableConfig::builder()
            .name("agents")
            .index("public_key")
            .entity_type("Agent")
            .proto_file("agent.json")
            .build();
        assert!(wrong_ext.is_err());
    }

    // =========================================================================
    // LedgerConfig validation tests
    // =========================================================================

    fn table(name: &str, entity_type: &str) -> TableConfig {
        TableConfig::builder()
            .name(name)
            .index("id")
            .entity_type(entity_type)
            .build()
            .expect("table")
    }

    #[test]
    fn test_ledger_config_duplicate_table_rejected() {
        let result = LedgerConfig::builder()
            .storage(StorageConfig::builder().path("/tmp/ledger.redb").build().expect("storage"))
            .tables(vec![table("agents", "Agent"), table("agents", "Other")])
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("duplicate table"));
    }

    #[test]
    fn test_ledger_config_duplicate_entity_type_rejected() {
        let result = LedgerConfig::builder()
            .storage(StorageConfig::builder().path("/tmp/ledger.redb").build().expect("storage"))
            .tables(vec![table("agents", "Agent"), table("records", "Agent")])
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("duplicate entity type"));
    }

    #[test]
    fn test_ledger_config_deserializes_table_keys() {
        let toml_like = serde_json::json!({
            "storage": { "path": "/var/lib/chain-ledger/ledger.redb" },
            "connect": { "base_delay": "500ms", "max_attempts": 3 },
            "tables": [
                { "name": "agents", "index": "public_key", "proto_message_name": "Agent",
                  "proto_file": "agent.proto" },
                { "name": "records", "index": "record_id", "proto_message_name": "Record" }
            ]
        });
        let config: LedgerConfig = serde_json::from_value(toml_like).expect("deserialize");
        config.validate().expect("valid");

        assert_eq!(config.connect.base_delay, Duration::from_millis(500));
        assert_eq!(config.connect.max_delay, Duration::from_secs(30));
        assert_eq!(config.connect.max_attempts, 3);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.tables[0].entity_type, "Agent");
        assert_eq!(config.tables[1].proto_file, None);
        assert_eq!(config.table_names(), vec!["agents", "records"]);
    }

    #[test]
    fn test_ledger_config_schema_lists_tables() {
        let schema = schemars::schema_for!(LedgerConfig);
        let json = serde_json::to_string(&schema).expect("schema json");
        assert!(json.contains("proto_message_name"));
        assert!(json.contains("max_attempts"));
    }
}
