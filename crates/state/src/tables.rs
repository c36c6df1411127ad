//! Table definitions for redb storage.
//!
//! Keys and values are byte arrays except for the blocks table, which is
//! keyed by height. Key encoding is handled by the keys module.

use chain_ledger_types::config::BLOCKS_TABLE;
use redb::TableDefinition;

/// Suffix of the index from start height to version key.
const BY_START_SUFFIX: &str = ".by_start";

/// Suffix of the index from end height to version key.
const BY_END_SUFFIX: &str = ".by_end";

/// Fixed table definitions.
pub struct Tables;

impl Tables {
    /// Block storage: block_num → serialized Block.
    ///
    /// Its presence marks a provisioned store.
    pub const BLOCKS: TableDefinition<'static, u64, &'static [u8]> =
        TableDefinition::new(BLOCKS_TABLE);
}

/// The redb tables backing one tracked state table.
///
/// - `{name}`: version key → serialized StateRecord
/// - `{name}.by_start`: height key (start height) → ()
/// - `{name}.by_end`: height key (end height) → (), closed versions only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTable {
    name: String,
    by_start: String,
    by_end: String,
}

impl StateTable {
    /// Names the tables backing the state table `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            by_start: format!("{name}{BY_START_SUFFIX}"),
            by_end: format!("{name}{BY_END_SUFFIX}"),
        }
    }

    /// Version records.
    pub fn records(&self) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
        TableDefinition::new(&self.name)
    }

    /// Versions by start height.
    pub fn by_start(&self) -> TableDefinition<'_, &'static [u8], ()> {
        TableDefinition::new(&self.by_start)
    }

    /// Closed versions by end height.
    pub fn by_end(&self) -> TableDefinition<'_, &'static [u8], ()> {
        TableDefinition::new(&self.by_end)
    }

    /// Names of every redb table backing this state table.
    pub fn table_names(&self) -> [&str; 3] {
        [&self.name, &self.by_start, &self.by_end]
    }
}
