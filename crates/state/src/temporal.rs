//! Block-versioned state tables.
//!
//! Every entity in a state table is stored as a chain of versions, each
//! authoritative for a half-open block interval `[startBlockNum, endBlockNum)`.
//! The newest version is open-ended (`endBlockNum == OPEN_END_BLOCK`) and is
//! flagged `latest`.
//!
//! Adding a version closes the open one at the new height. Rolling back a fork
//! deletes versions that started at or after the fork height and reopens
//! versions closed at or after it. Each operation runs in one write
//! transaction, so a reader sees either all of it or none of it.

use std::{collections::BTreeSet, time::Instant};

use chain_ledger_types::{
    BlockNum, Document, IndexValue, Result, StateRecord, decode, encode,
    error::InvalidArgumentSnafu, is_valid_block_num,
};
use redb::{ReadableTable, ReadableTableMetadata};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    engine::{
        CorruptSnafu, DocumentSnafu, RejectedSnafu, StorageEngine, StorageSnafu, StoreError,
        TableSnafu, require_table,
    },
    keys::{
        decode_height_key, decode_version_key, encode_height_key, encode_version_key,
        height_lower_bound, version_range,
    },
    metrics,
    tables::StateTable,
};

/// Outcome of adding a state version.
#[derive(Debug, Clone, PartialEq)]
pub enum AddVersion {
    /// A new current version was stored.
    Inserted {
        /// The new current version.
        record: StateRecord,
        /// Versions closed at the new version's start height.
        closed: Vec<StateRecord>,
    },
    /// A current version already starts at the requested height. Nothing changed.
    Duplicate(Vec<StateRecord>),
}

impl AddVersion {
    /// Returns true if the add was a no-op.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Summary of rolling one state table back to a fork height.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeforkReport {
    /// State table that was rolled back.
    pub table: String,
    /// Versions deleted because they started at or after the fork height.
    pub deleted: u64,
    /// Versions made current again because they closed at or after the fork height.
    pub reopened: u64,
    /// Entities left with more than one current version after reopening.
    pub conflicting: Vec<IndexValue>,
}

/// Versioned state tables backed by the storage engine.
#[derive(Debug, Clone)]
pub struct TemporalStore {
    engine: StorageEngine,
}

impl TemporalStore {
    /// Creates a store over `engine`.
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Adds the version of `index_value` starting at `block_num`.
    ///
    /// If a current version already starts at `block_num` it is returned
    /// unchanged. Otherwise every current version is closed at `block_num` and
    /// `payload` is stored as the new current version. Both happen in one
    /// write transaction.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidArgument`] if `block_num` is out of range or
    ///   `payload[index_name]` does not hold `index_value`
    /// - [`LedgerError::Modify`] if the current version starts above
    ///   `block_num`; nothing is written
    /// - [`LedgerError::Query`] / [`LedgerError::Codec`] on store failures
    ///
    /// [`LedgerError::InvalidArgument`]: chain_ledger_types::LedgerError::InvalidArgument
    /// [`LedgerError::Modify`]: chain_ledger_types::LedgerError::Modify
    /// [`LedgerError::Query`]: chain_ledger_types::LedgerError::Query
    /// [`LedgerError::Codec`]: chain_ledger_types::LedgerError::Codec
    pub fn add_version(
        &self,
        table: &str,
        index_name: &str,
        index_value: &IndexValue,
        payload: Document,
        block_num: BlockNum,
    ) -> Result<AddVersion> {
        ensure!(
            is_valid_block_num(block_num),
            InvalidArgumentSnafu { message: format!("block number {block_num} is out of range") }
        );
        let found = IndexValue::from_document(&payload, index_name);
        ensure!(
            found.as_ref() == Some(index_value),
            InvalidArgumentSnafu {
                message: format!(
                    "payload field \"{index_name}\" must hold {index_value}, found {}",
                    found.map_or_else(|| "nothing".to_string(), |v| v.to_string())
                ),
            }
        );

        let state_table = StateTable::new(table);
        let outcome = self.engine.modify_table(table, |txn, summary| {
            require_table(txn, table)?;
            let mut records = txn.open_table(state_table.records()).context(TableSnafu)?;
            let mut by_start = txn.open_table(state_table.by_start()).context(TableSnafu)?;
            let mut by_end = txn.open_table(state_table.by_end()).context(TableSnafu)?;

            let current: Vec<_> = versions_of(&records, index_value)?
                .into_iter()
                .filter(|(_, record)| record.is_current())
                .collect();

            if current.iter().any(|(_, record)| record.start_block_num == block_num) {
                summary.unchanged += current.len() as u64;
                return Ok(AddVersion::Duplicate(current.into_iter().map(|(_, r)| r).collect()));
            }
            if let Some((_, newer)) = current.iter().find(|(_, r)| r.start_block_num > block_num) {
                return RejectedSnafu {
                    message: format!(
                        "cannot add {index_value} at block {block_num}: current version starts \
                         at block {}",
                        newer.start_block_num
                    ),
                }
                .fail();
            }

            let key = encode_version_key(index_value, block_num);
            if records.get(&key[..]).context(StorageSnafu)?.is_some() {
                return RejectedSnafu {
                    message: format!("Duplicate primary key {index_value}@{block_num}"),
                }
                .fail();
            }

            let mut closed = Vec::with_capacity(current.len());
            for (version_key, mut record) in current {
                record.close(block_num);
                let encoded = encode(&record).context(DocumentSnafu)?;
                records.insert(&version_key[..], &encoded[..]).context(StorageSnafu)?;
                by_end
                    .insert(&encode_height_key(block_num, &version_key)[..], ())
                    .context(StorageSnafu)?;
                summary.replaced += 1;
                closed.push(record);
            }

            let record = StateRecord::open(payload, block_num);
            let encoded = encode(&record).context(DocumentSnafu)?;
            records.insert(&key[..], &encoded[..]).context(StorageSnafu)?;
            by_start.insert(&encode_height_key(block_num, &key)[..], ()).context(StorageSnafu)?;
            summary.inserted += 1;

            Ok(AddVersion::Inserted { record, closed })
        })?;

        match &outcome {
            AddVersion::Inserted { closed, .. } => {
                metrics::record_state_version(table);
                debug!(
                    table,
                    %index_value,
                    block_num,
                    closed = closed.len(),
                    "State version added"
                );
            },
            AddVersion::Duplicate(_) => {
                metrics::record_state_duplicate(table);
                debug!(table, %index_value, block_num, "Duplicate state add ignored");
            },
        }
        Ok(outcome)
    }

    /// Rolls `table` back to the state it had before `block_num`.
    ///
    /// Deletes every version starting at or after `block_num` and reopens
    /// every remaining version closed at or after it, in one write
    /// transaction. Entities left with more than one current version are
    /// reported in [`DeforkReport::conflicting`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Query`] or [`LedgerError::Codec`] on store
    /// failures, in which case nothing was changed.
    ///
    /// [`LedgerError::Query`]: chain_ledger_types::LedgerError::Query
    /// [`LedgerError::Codec`]: chain_ledger_types::LedgerError::Codec
    pub fn defork(&self, table: &str, block_num: BlockNum) -> Result<DeforkReport> {
        let started_at = Instant::now();
        let state_table = StateTable::new(table);
        let lower = height_lower_bound(block_num);

        let report = self.engine.modify_table(table, |txn, summary| {
            require_table(txn, table)?;
            let mut records = txn.open_table(state_table.records()).context(TableSnafu)?;
            let mut by_start = txn.open_table(state_table.by_start()).context(TableSnafu)?;
            let mut by_end = txn.open_table(state_table.by_end()).context(TableSnafu)?;
            let mut report = DeforkReport { table: table.to_string(), ..DeforkReport::default() };

            // Versions that started on the discarded branch.
            let started = height_keys_from(&by_start, &lower)?;
            for height_key in started {
                let (_, version_key) = split_height_key(&height_key)?;
                let removed = match records.remove(version_key).context(StorageSnafu)? {
                    Some(guard) => {
                        Some(decode::<StateRecord>(guard.value()).context(DocumentSnafu)?)
                    },
                    None => None,
                };
                if let Some(record) = removed {
                    if !record.is_current() {
                        by_end
                            .remove(&encode_height_key(record.end_block_num, version_key)[..])
                            .context(StorageSnafu)?;
                    }
                    report.deleted += 1;
                }
                by_start.remove(&height_key[..]).context(StorageSnafu)?;
            }

            // Versions closed by a block on the discarded branch.
            let mut touched = BTreeSet::new();
            let closed = height_keys_from(&by_end, &lower)?;
            for height_key in closed {
                let (_, version_key) = split_height_key(&height_key)?;
                let bytes = records
                    .get(version_key)
                    .context(StorageSnafu)?
                    .map(|guard| guard.value().to_vec())
                    .context(CorruptSnafu {
                        message: format!("{table}.by_end points at a missing version"),
                    })?;
                let mut record: StateRecord = decode(&bytes).context(DocumentSnafu)?;
                record.reopen();
                let encoded = encode(&record).context(DocumentSnafu)?;
                records.insert(version_key, &encoded[..]).context(StorageSnafu)?;
                by_end.remove(&height_key[..]).context(StorageSnafu)?;

                let decoded = decode_version_key(version_key).context(CorruptSnafu {
                    message: format!("malformed version key in {table}"),
                })?;
                touched.insert(decoded.index_value);
                report.reopened += 1;
            }

            for index_value in touched {
                let open = versions_of(&records, &index_value)?
                    .iter()
                    .filter(|(_, record)| record.is_current())
                    .count();
                if open > 1 {
                    report.conflicting.push(index_value);
                }
            }

            summary.deleted = report.deleted;
            summary.replaced = report.reopened;
            Ok(report)
        })?;

        metrics::record_defork(
            table,
            report.deleted,
            report.reopened,
            started_at.elapsed().as_secs_f64(),
        );
        info!(
            table,
            block_num,
            deleted = report.deleted,
            reopened = report.reopened,
            "State table deforked"
        );
        if !report.conflicting.is_empty() {
            warn!(
                table,
                block_num,
                conflicting = ?report.conflicting,
                "Defork left entities with more than one current version"
            );
        }
        Ok(report)
    }

    /// Returns the current version of `index_value`, if any.
    ///
    /// If rollback left several current versions, the one starting last is returned.
    pub fn current(&self, table: &str, index_value: &IndexValue) -> Result<Option<StateRecord>> {
        Ok(self.history(table, index_value)?.into_iter().filter(StateRecord::is_current).last())
    }

    /// Returns every version of `index_value`, ordered by start height.
    pub fn history(&self, table: &str, index_value: &IndexValue) -> Result<Vec<StateRecord>> {
        let state_table = StateTable::new(table);
        self.engine.query_table(table, |txn| {
            let records = txn.open_table(state_table.records()).context(TableSnafu)?;
            Ok(versions_of(&records, index_value)?.into_iter().map(|(_, r)| r).collect())
        })
    }

    /// Returns the version of `index_value` authoritative at `block_num`.
    pub fn as_of(
        &self,
        table: &str,
        index_value: &IndexValue,
        block_num: BlockNum,
    ) -> Result<Option<StateRecord>> {
        Ok(self.history(table, index_value)?.into_iter().find(|r| r.covers(block_num)))
    }

    /// Returns every current version in `table`, ordered by index value.
    pub fn current_all(&self, table: &str) -> Result<Vec<StateRecord>> {
        let state_table = StateTable::new(table);
        self.engine.query_table(table, |txn| {
            let records = txn.open_table(state_table.records()).context(TableSnafu)?;
            let mut current = Vec::new();
            for entry in records.iter().context(StorageSnafu)? {
                let (_, value) = entry.context(StorageSnafu)?;
                let record: StateRecord = decode(value.value()).context(DocumentSnafu)?;
                if record.is_current() {
                    current.push(record);
                }
            }
            Ok(current)
        })
    }

    /// Returns the number of versions stored in `table`.
    pub fn count(&self, table: &str) -> Result<u64> {
        let state_table = StateTable::new(table);
        self.engine.query_table(table, |txn| {
            let records = txn.open_table(state_table.records()).context(TableSnafu)?;
            records.len().context(StorageSnafu)
        })
    }
}

/// Reads every version of `index_value` with its key, ordered by start height.
fn versions_of<T>(
    records: &T,
    index_value: &IndexValue,
) -> std::result::Result<Vec<(Vec<u8>, StateRecord)>, StoreError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let (lower, upper) = version_range(index_value);
    let mut versions = Vec::new();
    for entry in records.range(&lower[..]..=&upper[..]).context(StorageSnafu)? {
        let (key, value) = entry.context(StorageSnafu)?;
        let record = decode(value.value()).context(DocumentSnafu)?;
        versions.push((key.value().to_vec(), record));
    }
    Ok(versions)
}

/// Collects every height index key at or above `lower`.
///
/// Keys are collected before the caller mutates the table.
fn height_keys_from<T>(index: &T, lower: &[u8]) -> std::result::Result<Vec<Vec<u8>>, StoreError>
where
    T: ReadableTable<&'static [u8], ()>,
{
    let mut keys = Vec::new();
    for entry in index.range(lower..).context(StorageSnafu)? {
        let (key, _) = entry.context(StorageSnafu)?;
        keys.push(key.value().to_vec());
    }
    Ok(keys)
}

fn split_height_key(key: &[u8]) -> std::result::Result<(BlockNum, &[u8]), StoreError> {
    decode_height_key(key).context(CorruptSnafu { message: "truncated height index key" })
}
