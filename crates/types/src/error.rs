//! Error types for the chain ledger using snafu.
//!
//! Defines a unified error type hierarchy that captures:
//! - Store errors (unreachable store, failed queries, rejected writes)
//! - Ledger errors (codec failures, partially applied fork rollback)
//! - Caller errors (unknown entity types, invalid arguments)
//!
//! Each error variant maps to an [`ErrorCode`] with a unique numeric identifier,
//! retryability classification, and suggested recovery action.

use snafu::{Location, Snafu};

use crate::{codec::CodecError, types::BlockNum};

/// Unified result type for ledger operations.
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Machine-readable error codes for programmatic error handling.
///
/// | Range       | Domain      | Examples                                  |
/// |-------------|-------------|-------------------------------------------|
/// | 1000–1099   | Store       | Connect, query, modify                    |
/// | 2000–2099   | Ledger      | Codec, fork resolution                    |
/// | 3000–3099   | Application | Configuration, invalid argument           |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Store could not be opened or never became ready.
    StoreTransport = 1000,
    /// A read or write step failed inside the store.
    StoreQuery = 1001,
    /// A write step reported errors and was aborted.
    StoreModify = 1002,
    /// Stored document could not be encoded or decoded.
    LedgerCodec = 2000,
    /// Fork rollback stopped part-way across state tables.
    LedgerForkResolution = 2001,
    /// Configuration is invalid or names an unknown entity type.
    AppConfig = 3000,
    /// Request argument is invalid.
    AppInvalidArgument = 3001,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::StoreTransport),
            1001 => Some(Self::StoreQuery),
            1002 => Some(Self::StoreModify),
            2000 => Some(Self::LedgerCodec),
            2001 => Some(Self::LedgerForkResolution),
            3000 => Some(Self::AppConfig),
            3001 => Some(Self::AppInvalidArgument),
            _ => None,
        }
    }

    /// Whether an operation failing with this code may succeed if retried unchanged.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StoreTransport)
    }

    /// Suggested recovery action.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::StoreTransport => {
                "Check that the database file is reachable and provisioned, then reconnect."
            },
            Self::StoreQuery => "Inspect the store for corruption or disk errors before retrying.",
            Self::StoreModify => {
                "The write was aborted; fix the conflicting document and resubmit."
            },
            Self::LedgerCodec => "A stored document is malformed; repair or remove it.",
            Self::LedgerForkResolution => {
                "Some state tables were rolled back and others not; resubmit the fork block once \
                 the store is healthy."
            },
            Self::AppConfig => "Fix the table configuration and restart.",
            Self::AppInvalidArgument => "Fix the request and resubmit.",
        }
    }
}

/// Top-level error type for ledger operations.
///
/// # Recovery Guide
///
/// | Variant             | Retryable | Recovery Action                                     |
/// | ------------------- | --------- | --------------------------------------------------- |
/// | `Transport`         | Yes       | Reconnect once the store is reachable               |
/// | `Query`             | No        | Check the store; the step was not applied           |
/// | `Modify`            | No        | Fix the rejected document and resubmit              |
/// | `Codec`             | No        | Repair the stored document                          |
/// | `ForkResolution`    | No        | Resubmit the fork block; reconcile listed tables    |
/// | `UnknownEntityType` | No        | Add the entity type to the table configuration      |
/// | `Configuration`     | No        | Fix the configuration                               |
/// | `InvalidArgument`   | No        | Fix the request                                     |
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    /// The store could not be opened, or never became ready, within the connect budget.
    #[snafu(display("Unable to connect to store at {path} after {attempts} attempts: {message}"))]
    Transport {
        /// Database path.
        path: String,
        /// Connection attempts made.
        attempts: u32,
        /// Last failure observed.
        message: String,
    },

    /// A step against `table` failed inside the store. Nothing was applied.
    #[snafu(display("Unable to query \"{table}\" table at {location}: {message}"))]
    Query {
        /// Table the step ran against.
        table: String,
        /// Store error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A write against `table` reported errors. The transaction was aborted.
    #[snafu(display("Failed to modify \"{table}\": {message}"))]
    Modify {
        /// Table the write ran against.
        table: String,
        /// First error reported by the write.
        message: String,
    },

    /// A stored document could not be encoded or decoded.
    #[snafu(display("Codec error in \"{table}\" at {location}: {source}"))]
    Codec {
        /// Table holding the document.
        table: String,
        /// Underlying codec error.
        source: CodecError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Fork rollback failed on `table` after the blocks table was rewritten.
    ///
    /// Tables in `completed` were rolled back; `table` and any after it were not.
    #[snafu(display(
        "Fork at block {block_num} left state tables inconsistent: defork of \"{table}\" failed \
         after {completed:?}: {source}"
    ))]
    ForkResolution {
        /// Height of the fork block.
        block_num: BlockNum,
        /// Table whose rollback failed.
        table: String,
        /// Tables rolled back before the failure.
        completed: Vec<String>,
        /// Failure reported for `table`.
        #[snafu(source(from(LedgerError, Box::new)))]
        source: Box<LedgerError>,
    },

    /// No table is configured for the entity type.
    #[snafu(display("No table configured for entity type \"{entity_type}\""))]
    UnknownEntityType {
        /// The entity-type name that was looked up.
        entity_type: String,
    },

    /// Configuration is invalid.
    #[snafu(display("Configuration error: {message}"))]
    Configuration {
        /// Error description.
        message: String,
    },

    /// Request argument is invalid.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// Error description.
        message: String,
    },
}

impl LedgerError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport { .. } => ErrorCode::StoreTransport,
            Self::Query { .. } => ErrorCode::StoreQuery,
            Self::Modify { .. } => ErrorCode::StoreModify,
            Self::Codec { .. } => ErrorCode::LedgerCodec,
            Self::ForkResolution { .. } => ErrorCode::LedgerForkResolution,
            Self::UnknownEntityType { .. } | Self::Configuration { .. } => ErrorCode::AppConfig,
            Self::InvalidArgument { .. } => ErrorCode::AppInvalidArgument,
        }
    }

    /// Whether this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Suggested recovery action for this error.
    #[must_use]
    pub const fn suggested_action(&self) -> &'static str {
        self.code().suggested_action()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ALL_CODES: [ErrorCode; 7] = [
        ErrorCode::StoreTransport,
        ErrorCode::StoreQuery,
        ErrorCode::StoreModify,
        ErrorCode::LedgerCodec,
        ErrorCode::LedgerForkResolution,
        ErrorCode::AppConfig,
        ErrorCode::AppInvalidArgument,
    ];

    #[test]
    fn test_error_code_numeric_roundtrip() {
        for code in ALL_CODES {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(code));
        }
        assert_eq!(ErrorCode::from_u16(9999), None);
    }

    #[test]
    fn test_only_transport_is_retryable() {
        let retryable: Vec<_> = ALL_CODES.iter().filter(|c| c.is_retryable()).collect();
        assert_eq!(retryable, vec![&ErrorCode::StoreTransport]);
    }

    #[test]
    fn test_query_error_names_table() {
        let err = QuerySnafu { table: "agents", message: "boom" }.build();
        assert!(err.to_string().contains("\"agents\""));
        assert_eq!(err.code(), ErrorCode::StoreQuery);
    }

    #[test]
    fn test_fork_resolution_wraps_inner_error() {
        let inner = ModifySnafu { table: "records", message: "duplicate" }.build();
        let err = LedgerError::ForkResolution {
            block_num: 12,
            table: "records".to_string(),
            completed: vec!["agents".to_string()],
            source: Box::new(inner),
        };
        let message = err.to_string();
        assert!(message.contains("block 12"));
        assert!(message.contains("agents"));
        assert!(message.contains("duplicate"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_entity_type_is_config_error() {
        let err = UnknownEntityTypeSnafu { entity_type: "Widget" }.build();
        assert_eq!(err.code(), ErrorCode::AppConfig);
        assert!(err.to_string().contains("Widget"));
    }
}
