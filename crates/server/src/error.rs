//! Errors surfaced by the command-line front end.

use std::path::PathBuf;

use chain_ledger_state::StoreError;
use chain_ledger_types::LedgerError;
use snafu::Snafu;

/// Top-level error type for the binary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    /// A configuration source could not be read or deserialized.
    #[snafu(display("Failed to load configuration: {source}"))]
    LoadConfig {
        /// Underlying loader error.
        source: config::ConfigError,
    },

    /// Configuration values failed validation.
    #[snafu(display("Invalid configuration: {source}"))]
    InvalidConfig {
        /// Validation failure.
        source: chain_ledger_types::config::ConfigError,
    },

    /// A ledger operation failed.
    #[snafu(display("{source}"))]
    Ledger {
        /// Underlying ledger error.
        source: LedgerError,
    },

    /// The storage directory could not be created.
    #[snafu(display("Failed to create {}: {source}", path.display()))]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The database file could not be created or opened.
    #[snafu(display("Failed to open store at {}: {source}", path.display()))]
    OpenStore {
        /// Database file.
        path: PathBuf,
        /// Underlying storage error.
        source: StoreError,
    },

    /// The event input could not be read.
    #[snafu(display("Failed to read events: {source}"))]
    ReadInput {
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An event line is not a valid event.
    #[snafu(display("Invalid event on line {line}: {source}"))]
    ParseEvent {
        /// 1-based line number.
        line: usize,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// An event was rejected by the ledger.
    #[snafu(display("Event on line {line} failed: {source}"))]
    ApplyEvent {
        /// 1-based line number.
        line: usize,
        /// Underlying ledger error.
        source: LedgerError,
    },

    /// Output could not be written.
    #[snafu(display("Failed to write output: {source}"))]
    Output {
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl CliError {
    /// Suggested recovery action, when the failure came from the ledger.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            Self::Ledger { source } | Self::ApplyEvent { source, .. } => {
                Some(source.suggested_action())
            },
            _ => None,
        }
    }
}
