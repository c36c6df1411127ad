//! redb storage engine wrapper.
//!
//! Provides a thin wrapper around redb with:
//! - Database lifecycle management (open, in-memory, connect with retry)
//! - Readiness probing
//! - Single-transaction read and write steps against a named table

use std::{path::Path, sync::Arc, thread};

use chain_ledger_types::{
    CodecError, LedgerError, Result,
    config::{BLOCKS_TABLE, ConnectConfig},
    error::{CodecSnafu, ModifySnafu, QuerySnafu, TransportSnafu},
};
use redb::{Database, ReadTransaction, TableHandle, WriteTransaction, backends::InMemoryBackend};
use snafu::{IntoError, ResultExt, Snafu};
use tracing::{debug, info, warn};

/// Errors raised inside a single store step.
///
/// The engine converts these into [`LedgerError`] tagged with the table the
/// step ran against.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Error opening the database.
    #[snafu(display("Database error: {source}"))]
    Database {
        /// The underlying redb database error.
        source: redb::DatabaseError,
    },

    /// Error from redb transaction operations.
    #[snafu(display("Transaction error: {source}"))]
    Transaction {
        /// The underlying redb transaction error.
        source: redb::TransactionError,
    },

    /// Error from redb commit operations.
    #[snafu(display("Commit error: {source}"))]
    Commit {
        /// The underlying redb commit error.
        source: redb::CommitError,
    },

    /// Error from redb table operations.
    #[snafu(display("Table error: {source}"))]
    Table {
        /// The underlying redb table error.
        source: redb::TableError,
    },

    /// Error from redb storage operations.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// The underlying redb storage error.
        source: redb::StorageError,
    },

    /// A stored document could not be encoded or decoded.
    #[snafu(display("Document error: {source}"))]
    Document {
        /// The underlying codec error.
        source: CodecError,
    },

    /// A write step targeted a table that was never provisioned.
    #[snafu(display("Table \"{table}\" does not exist"))]
    MissingTable {
        /// Name of the missing table.
        table: String,
    },

    /// A key or index entry does not match the expected layout.
    #[snafu(display("Corrupt entry: {message}"))]
    Corrupt {
        /// Description of the mismatch.
        message: String,
    },

    /// The write was refused. The step's transaction is aborted.
    #[snafu(display("{message}"))]
    Rejected {
        /// First error reported by the write.
        message: String,
    },
}

/// Counts of the documents a write step touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Documents inserted.
    pub inserted: u64,
    /// Documents rewritten in place.
    pub replaced: u64,
    /// Documents deleted.
    pub deleted: u64,
    /// Documents the step chose to leave as they were.
    pub unchanged: u64,
    /// Writes the step refused.
    pub errors: u64,
    /// Message of the first refused write.
    pub first_error: Option<String>,
}

impl WriteSummary {
    /// Records a refused write. Any error aborts the step's transaction.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors += 1;
        if self.first_error.is_none() {
            self.first_error = Some(message.into());
        }
    }
}

/// Storage engine backed by redb.
///
/// Cloning is cheap and shares the underlying database handle.
#[derive(Clone)]
pub struct StorageEngine {
    db: Arc<Database>,
    location: Arc<str>,
}

#[allow(clippy::result_large_err)]
impl StorageEngine {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> std::result::Result<Self, StoreError> {
        let path = path.as_ref();
        let db = if path.exists() { Database::open(path) } else { Database::create(path) }
            .context(DatabaseSnafu)?;

        Ok(Self { db: Arc::new(db), location: path.display().to_string().into() })
    }

    /// Create a new in-memory database.
    pub fn open_in_memory() -> std::result::Result<Self, StoreError> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .context(DatabaseSnafu)?;

        Ok(Self { db: Arc::new(db), location: ":memory:".into() })
    }

    /// Connect to an existing, provisioned database.
    ///
    /// Each attempt opens the file and checks that the blocks table exists.
    /// Failed attempts are retried with exponential backoff as configured by
    /// `policy`, blocking the calling thread between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Transport`] once `policy.max_attempts` attempts
    /// have failed.
    pub fn connect(path: impl AsRef<Path>, policy: &ConnectConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let failure = match Self::open_existing(path) {
                Ok(engine) => match engine.is_ready() {
                    Ok(true) => {
                        info!(path = %path.display(), attempt, "Connected to store");
                        return Ok(engine);
                    },
                    Ok(false) => format!("store not initialized: \"{BLOCKS_TABLE}\" table missing"),
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            };

            if attempt >= policy.max_attempts {
                return TransportSnafu {
                    path: path.display().to_string(),
                    attempts: attempt,
                    message: failure,
                }
                .fail();
            }

            let delay = policy.retry_delay(attempt);
            warn!(
                path = %path.display(),
                attempt,
                max_attempts = policy.max_attempts,
                retry_in = ?delay,
                error = %failure,
                "Store unavailable, retrying"
            );
            thread::sleep(delay);
        }
    }

    fn open_existing(path: &Path) -> std::result::Result<Self, StoreError> {
        let db = Database::open(path).context(DatabaseSnafu)?;
        Ok(Self { db: Arc::new(db), location: path.display().to_string().into() })
    }

    /// Get a clone of the database handle.
    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    /// Where the database lives, for diagnostics.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Names of every table in the database.
    pub fn table_names(&self) -> std::result::Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let names = txn.list_tables().context(StorageSnafu)?;
        Ok(names.map(|t| t.name().to_string()).collect())
    }

    /// Returns true once the blocks table exists.
    pub fn is_ready(&self) -> std::result::Result<bool, StoreError> {
        Ok(self.table_names()?.iter().any(|name| name == BLOCKS_TABLE))
    }

    /// Runs a read step against `table` in one read transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Query`] or [`LedgerError::Codec`] tagged with `table`.
    pub fn query_table<T, F>(&self, table: &str, query: F) -> Result<T>
    where
        F: FnOnce(&ReadTransaction) -> std::result::Result<T, StoreError>,
    {
        let txn = self.db.begin_read().context(TransactionSnafu).map_err(|e| step_error(table, e))?;
        query(&txn).map_err(|e| step_error(table, e))
    }

    /// Runs a write step against `table` in one write transaction.
    ///
    /// The step commits only if `write` succeeds. redb admits one write
    /// transaction at a time, so no other step observes a partial write.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Modify`] carrying the first error if the step
    /// tallied any refused write, or [`LedgerError::Query`] /
    /// [`LedgerError::Codec`] if it failed. The transaction is aborted in
    /// every error case.
    pub fn modify_table<T, F>(&self, table: &str, write: F) -> Result<T>
    where
        F: FnOnce(&WriteTransaction, &mut WriteSummary) -> std::result::Result<T, StoreError>,
    {
        let txn =
            self.db.begin_write().context(TransactionSnafu).map_err(|e| step_error(table, e))?;
        let mut summary = WriteSummary::default();

        let outcome = match write(&txn, &mut summary) {
            Err(StoreError::Rejected { message }) => {
                summary.error(message);
                None
            },
            Err(e) => {
                abort(table, txn);
                return Err(step_error(table, e));
            },
            Ok(value) => Some(value),
        };

        match outcome {
            Some(value) if summary.errors == 0 => {
                txn.commit().context(CommitSnafu).map_err(|e| step_error(table, e))?;
                debug!(
                    table,
                    inserted = summary.inserted,
                    replaced = summary.replaced,
                    deleted = summary.deleted,
                    unchanged = summary.unchanged,
                    "Write committed"
                );
                Ok(value)
            },
            _ => {
                abort(table, txn);
                let message = summary.first_error.unwrap_or_else(|| "write refused".to_string());
                ModifySnafu { table, message }.fail()
            },
        }
    }
}

fn abort(table: &str, txn: WriteTransaction) {
    if let Err(e) = txn.abort() {
        warn!(table, error = %e, "Failed to abort write transaction");
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine").field("location", &self.location).finish()
    }
}

/// Fails a write step unless `table` exists.
///
/// Opening a table inside a write transaction creates it, so write steps
/// check first to keep unprovisioned tables an error.
pub(crate) fn require_table(
    txn: &WriteTransaction,
    table: &str,
) -> std::result::Result<(), StoreError> {
    let mut tables = txn.list_tables().context(StorageSnafu)?;
    if tables.any(|handle| handle.name() == table) {
        Ok(())
    } else {
        MissingTableSnafu { table }.fail()
    }
}

/// Tags a step failure with the table it ran against.
fn step_error(table: &str, error: StoreError) -> LedgerError {
    match error {
        StoreError::Document { source } => CodecSnafu { table }.into_error(source),
        other => QuerySnafu { table, message: other.to_string() }.build(),
    }
}
