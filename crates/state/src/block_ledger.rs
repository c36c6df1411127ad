//! Block storage with fork detection and resolution.
//!
//! Stores at most one block per height. A block submitted at an occupied
//! height with the same id is a replay; with a different id it is a fork,
//! which discards every stored block from that height upward and rolls the
//! tracked state tables back to it.

use std::{ops::RangeInclusive, time::Instant};

use chain_ledger_types::{
    Block, BlockNum, LedgerError, Result, config::BLOCKS_TABLE, decode, encode,
    error::InvalidArgumentSnafu, is_valid_block_num,
};
use redb::{ReadableTable, ReadableTableMetadata};
use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    engine::{DocumentSnafu, StorageEngine, StorageSnafu, StoreError, TableSnafu, require_table},
    metrics,
    tables::Tables,
    temporal::{DeforkReport, TemporalStore},
};

/// How a submitted block became canonical.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockInsert {
    /// The height was empty and the block was stored.
    Appended(Block),
    /// The same block was already stored. Nothing changed.
    Replayed(Block),
    /// A different block was stored at the height and has been replaced.
    Forked(ForkReport),
}

impl BlockInsert {
    /// The canonical block for the submitted height.
    pub fn block(&self) -> &Block {
        match self {
            Self::Appended(block) | Self::Replayed(block) => block,
            Self::Forked(report) => &report.block,
        }
    }

    /// Consumes the outcome, returning the canonical block.
    pub fn into_block(self) -> Block {
        match self {
            Self::Appended(block) | Self::Replayed(block) => block,
            Self::Forked(report) => report.block,
        }
    }

    /// Returns true if the insert resolved a fork.
    pub fn is_fork(&self) -> bool {
        matches!(self, Self::Forked(_))
    }
}

/// What resolving a fork discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct ForkReport {
    /// The block now stored at the fork height.
    pub block: Block,
    /// Id of the block it replaced, if one was still stored.
    pub replaced_block_id: Option<String>,
    /// Stored blocks deleted, including the replaced one.
    pub blocks_removed: u64,
    /// Per-table rollback results, in configuration order.
    pub tables: Vec<DeforkReport>,
}

/// Result of the atomic check-and-insert step.
enum Stored {
    Appended,
    Replayed,
    Conflict(String),
}

/// Canonical block storage keyed by height.
#[derive(Debug, Clone)]
pub struct BlockLedger {
    engine: StorageEngine,
    state: TemporalStore,
    state_tables: Vec<String>,
}

impl BlockLedger {
    /// Creates a ledger over `engine` that rolls back `state_tables`, in order, on a fork.
    pub fn new(engine: StorageEngine, state_tables: Vec<String>) -> Self {
        let state = TemporalStore::new(engine.clone());
        Self { engine, state, state_tables }
    }

    /// Records `block` as canonical for its height.
    ///
    /// Checking the height and storing the block happen in one write
    /// transaction. A conflicting block at the height is resolved with
    /// [`resolve_fork`](Self::resolve_fork).
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidArgument`] if the height is out of range
    /// - [`LedgerError::Query`] / [`LedgerError::Codec`] on store failures
    /// - [`LedgerError::ForkResolution`] if a state table could not be rolled back
    pub fn insert(&self, block: Block) -> Result<BlockInsert> {
        validate(&block)?;
        let block_num = block.block_num;

        let stored = self.engine.modify_table(BLOCKS_TABLE, |txn, summary| {
            require_table(txn, BLOCKS_TABLE)?;
            let mut table = txn.open_table(Tables::BLOCKS).context(TableSnafu)?;
            let existing = match table.get(block_num).context(StorageSnafu)? {
                Some(guard) => Some(decode::<Block>(guard.value()).context(DocumentSnafu)?),
                None => None,
            };

            match existing {
                None => {
                    let encoded = encode(&block).context(DocumentSnafu)?;
                    table.insert(block_num, &encoded[..]).context(StorageSnafu)?;
                    summary.inserted += 1;
                    Ok(Stored::Appended)
                },
                Some(stored) if stored.same_identity(&block) => {
                    summary.unchanged += 1;
                    Ok(Stored::Replayed)
                },
                Some(stored) => Ok(Stored::Conflict(stored.block_id)),
            }
        })?;

        match stored {
            Stored::Appended => {
                metrics::record_block_appended();
                debug!(block_num, block_id = %block.block_id, "Block appended");
                Ok(BlockInsert::Appended(block))
            },
            Stored::Replayed => {
                metrics::record_block_replay();
                debug!(block_num, block_id = %block.block_id, "Block replayed");
                Ok(BlockInsert::Replayed(block))
            },
            Stored::Conflict(stored_id) => {
                warn!(
                    block_num,
                    stored_block_id = %stored_id,
                    new_block_id = %block.block_id,
                    "Fork detected"
                );
                self.resolve_fork(block).map(BlockInsert::Forked)
            },
        }
    }

    /// Makes `block` canonical at its height, discarding everything built above it.
    ///
    /// Deleting every block at or above the height and storing `block` is one
    /// write transaction. Each state table is then rolled back in its own
    /// transaction, one after another, so a failure part-way leaves earlier
    /// tables rolled back and later ones untouched.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidArgument`] if the height is out of range
    /// - [`LedgerError::Query`] / [`LedgerError::Codec`] if the blocks table
    ///   could not be rewritten; no state table was touched
    /// - [`LedgerError::ForkResolution`] naming the table whose rollback failed
    ///   and the tables already rolled back
    pub fn resolve_fork(&self, block: Block) -> Result<ForkReport> {
        validate(&block)?;
        let started_at = Instant::now();
        let block_num = block.block_num;

        let (replaced_block_id, blocks_removed) =
            self.engine.modify_table(BLOCKS_TABLE, |txn, summary| {
                require_table(txn, BLOCKS_TABLE)?;
                let mut table = txn.open_table(Tables::BLOCKS).context(TableSnafu)?;
                let mut replaced = None;
                let mut doomed = Vec::new();
                for entry in table.range(block_num..).context(StorageSnafu)? {
                    let (key, value) = entry.context(StorageSnafu)?;
                    if key.value() == block_num {
                        replaced = Some(decode::<Block>(value.value()).context(DocumentSnafu)?);
                    }
                    doomed.push(key.value());
                }
                for height in &doomed {
                    table.remove(*height).context(StorageSnafu)?;
                }

                let encoded = encode(&block).context(DocumentSnafu)?;
                table.insert(block_num, &encoded[..]).context(StorageSnafu)?;
                summary.deleted += doomed.len() as u64;
                summary.inserted += 1;
                Ok((replaced.map(|b| b.block_id), doomed.len() as u64))
            })?;

        let mut tables = Vec::with_capacity(self.state_tables.len());
        for table in &self.state_tables {
            match self.state.defork(table, block_num) {
                Ok(report) => tables.push(report),
                Err(source) => {
                    let completed: Vec<String> = tables.into_iter().map(|r| r.table).collect();
                    warn!(
                        block_num,
                        table = %table,
                        completed = ?completed,
                        error = %source,
                        "Fork rollback stopped part-way"
                    );
                    return Err(LedgerError::ForkResolution {
                        block_num,
                        table: table.clone(),
                        completed,
                        source: Box::new(source),
                    });
                },
            }
        }

        metrics::record_fork(blocks_removed);
        info!(
            block_num,
            block_id = %block.block_id,
            blocks_removed,
            tables = tables.len(),
            latency_ms = started_at.elapsed().as_millis() as u64,
            "Fork resolved"
        );
        Ok(ForkReport { block, replaced_block_id, blocks_removed, tables })
    }

    /// Returns the block stored at `block_num`.
    pub fn get(&self, block_num: BlockNum) -> Result<Option<Block>> {
        self.engine.query_table(BLOCKS_TABLE, |txn| {
            let table = txn.open_table(Tables::BLOCKS).context(TableSnafu)?;
            match table.get(block_num).context(StorageSnafu)? {
                Some(guard) => Ok(Some(decode(guard.value()).context(DocumentSnafu)?)),
                None => Ok(None),
            }
        })
    }

    /// Returns the highest stored block.
    pub fn latest(&self) -> Result<Option<Block>> {
        self.engine.query_table(BLOCKS_TABLE, |txn| {
            let table = txn.open_table(Tables::BLOCKS).context(TableSnafu)?;
            let latest = match table.last().context(StorageSnafu)? {
                Some((_, value)) => Ok(Some(decode(value.value()).context(DocumentSnafu)?)),
                None => Ok(None),
            };
            latest
        })
    }

    /// Returns the stored blocks with heights in `heights`, ordered by height.
    pub fn range(&self, heights: RangeInclusive<BlockNum>) -> Result<Vec<Block>> {
        self.engine.query_table(BLOCKS_TABLE, |txn| {
            let table = txn.open_table(Tables::BLOCKS).context(TableSnafu)?;
            let mut blocks = Vec::new();
            for entry in table.range(heights).context(StorageSnafu)? {
                let (_, value) = entry.context(StorageSnafu)?;
                blocks.push(decode(value.value()).context(DocumentSnafu)?);
            }
            Ok::<_, StoreError>(blocks)
        })
    }

    /// Returns the number of stored blocks.
    pub fn count(&self) -> Result<u64> {
        self.engine.query_table(BLOCKS_TABLE, |txn| {
            let table = txn.open_table(Tables::BLOCKS).context(TableSnafu)?;
            table.len().context(StorageSnafu)
        })
    }
}

fn validate(block: &Block) -> Result<()> {
    ensure!(
        is_valid_block_num(block.block_num),
        InvalidArgumentSnafu {
            message: format!("block number {} is out of range", block.block_num)
        }
    );
    ensure!(
        !block.block_id.is_empty(),
        InvalidArgumentSnafu { message: format!("block {} has an empty blockId", block.block_num) }
    );
    Ok(())
}
