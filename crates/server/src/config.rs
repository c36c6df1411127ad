//! Command-line arguments and configuration loading.
//!
//! Configuration is read from a TOML file and environment variables. Values
//! from the environment override the file; nested keys use `__` as a separator:
//!
//! ```bash
//! CHAIN_LEDGER__STORAGE__PATH=/var/lib/chain-ledger/ledger.redb \
//! CHAIN_LEDGER__CONNECT__MAX_ATTEMPTS=3 \
//! chain-ledger ingest blocks.ndjson
//! ```

use std::path::PathBuf;

use chain_ledger_types::config::LedgerConfig;
use clap::{Parser, Subcommand, ValueEnum};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{CliError, InvalidConfigSnafu, LoadConfigSnafu};

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chain-ledger.toml";

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "CHAIN_LEDGER";

/// Chain-aware state ledger.
#[derive(Debug, Parser)]
#[command(name = "chain-ledger", version, about)]
pub struct Cli {
    /// Configuration file. Defaults to `chain-ledger.toml` if present.
    #[arg(long, short, global = true, env = "CHAIN_LEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format. Overrides `log_format` from the configuration.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Create the blocks table and every configured state table.
    Setup {
        /// Delete every table first, discarding all stored data.
        #[arg(long)]
        reset: bool,
    },
    /// Apply newline-delimited JSON events to the ledger.
    Ingest {
        /// Event file. Reads standard input when omitted.
        file: Option<PathBuf>,
    },
    /// Print stored blocks or state as JSON lines.
    Show {
        #[command(subcommand)]
        target: ShowTarget,
    },
    /// Configuration utilities.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// What `show` prints.
#[derive(Debug, Subcommand)]
pub enum ShowTarget {
    /// Stored blocks, ordered by height.
    Blocks {
        /// Lowest height to print.
        #[arg(long, default_value_t = 0)]
        from: u64,
        /// Highest height to print. Defaults to the latest block.
        #[arg(long)]
        to: Option<u64>,
    },
    /// State versions of one table.
    State {
        /// State table name.
        table: String,
        /// Index value of one entity, as JSON (`7`, `"pk1"`). Bare text is read as a string.
        #[arg(long)]
        key: Option<String>,
        /// Print every version instead of only current ones.
        #[arg(long)]
        history: bool,
    },
}

/// `config` subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the JSON Schema of the configuration file.
    Schema,
    /// Print an example configuration file.
    Example,
}

/// Log output format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    Text,
    /// One JSON object per event.
    Json,
    /// JSON when stderr is not a terminal, text otherwise.
    #[default]
    Auto,
}

/// Complete configuration of the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AppConfig {
    /// Ledger storage, connection, and table configuration.
    #[serde(flatten)]
    pub ledger: LedgerConfig,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Loads configuration from `path` (or the default file) and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::LoadConfig`] if a source cannot be read or parsed,
    /// or [`CliError::InvalidConfig`] if a value fails validation.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, CliError> {
        let builder = config::Config::builder();

        let builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => {
                builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
            },
        };

        // Single underscores in field names are preserved
        // (CHAIN_LEDGER__CONNECT__MAX_ATTEMPTS → connect.max_attempts).
        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_config(builder.build().context(LoadConfigSnafu)?)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, CliError> {
        let source = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()
            .context(LoadConfigSnafu)?;
        Self::from_config(source)
    }

    fn from_config(source: config::Config) -> Result<Self, CliError> {
        let config: Self = source.try_deserialize().context(LoadConfigSnafu)?;
        config.ledger.validate().context(InvalidConfigSnafu)?;
        Ok(config)
    }
}

/// JSON Schema of the configuration file.
pub fn config_schema() -> String {
    let schema = schemars::schema_for!(AppConfig);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// Example configuration file.
pub const CONFIG_EXAMPLE: &str = r#"# chain-ledger configuration
log_format = "auto"

[storage]
path = "/var/lib/chain-ledger/ledger.redb"

[connect]
base_delay = "1s"
max_delay = "30s"
max_attempts = 10

[[tables]]
name = "agents"
index = "publicKey"
proto_message_name = "Agent"
proto_file = "agent.proto"

[[tables]]
name = "records"
index = "recordId"
proto_message_name = "Record"
"#;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use chain_ledger_test_utils::TestDir;

    use super::*;

    #[test]
    fn test_example_parses_and_validates() {
        let config = AppConfig::from_toml(CONFIG_EXAMPLE).expect("example config");
        assert_eq!(config.log_format, LogFormat::Auto);
        assert_eq!(config.ledger.connect.max_delay, Duration::from_secs(30));
        assert_eq!(config.ledger.table_names(), vec!["agents", "records"]);
        assert_eq!(config.ledger.tables[0].entity_type, "Agent");
        assert_eq!(config.ledger.tables[0].proto_file.as_deref(), Some("agent.proto"));
    }

    #[test]
    fn test_defaults_apply_to_minimal_config() {
        let config = AppConfig::from_toml("[storage]\npath = \"ledger.redb\"\n").expect("config");
        assert_eq!(config.log_format, LogFormat::Auto);
        assert_eq!(config.ledger.connect.max_attempts, 10);
        assert!(config.ledger.tables.is_empty());
    }

    #[test]
    fn test_invalid_tables_are_rejected() {
        let text = r#"
            [storage]
            path = "ledger.redb"

            [[tables]]
            name = "blocks"
            index = "id"
            proto_message_name = "Block"
        "#;
        let err = AppConfig::from_toml(text).unwrap_err();
        assert!(matches!(err, CliError::InvalidConfig { .. }));
    }

    #[test]
    fn test_missing_storage_is_a_load_error() {
        let err = AppConfig::from_toml("log_format = \"json\"\n").unwrap_err();
        assert!(matches!(err, CliError::LoadConfig { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TestDir::new();
        let path =
            dir.write("chain-ledger.toml", "log_format = \"json\"\n[storage]\npath = \"x.redb\"\n");
        let config = AppConfig::load(Some(path.as_path())).expect("load");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.ledger.storage.path, PathBuf::from("x.redb"));
    }

    #[test]
    fn test_schema_names_sections() {
        let schema = config_schema();
        assert!(schema.contains("storage"));
        assert!(schema.contains("proto_message_name"));
        assert!(schema.contains("log_format"));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["chain-ledger", "setup", "--reset"]).expect("parse");
        assert!(matches!(cli.command, CliCommand::Setup { reset: true }));

        let cli = Cli::try_parse_from([
            "chain-ledger",
            "--log-format",
            "json",
            "show",
            "state",
            "agents",
            "--key",
            "pk1",
        ])
        .expect("parse");
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        match cli.command {
            CliCommand::Show { target: ShowTarget::State { table, key, history } } => {
                assert_eq!(table, "agents");
                assert_eq!(key.as_deref(), Some("pk1"));
                assert!(!history);
            },
            other => panic!("unexpected command {other:?}"),
        }
    }
}
