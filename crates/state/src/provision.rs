//! Creating and resetting the ledger's tables.

use chain_ledger_types::{Result, config::BLOCKS_TABLE};
use redb::TableHandle;
use snafu::ResultExt;
use tracing::info;

use crate::{
    engine::{StorageEngine, StorageSnafu, TableSnafu},
    registry::TableRegistry,
    tables::{StateTable, Tables},
};

/// How [`provision`] treats existing tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionMode {
    /// Create missing tables and keep existing data.
    #[default]
    Ensure,
    /// Delete every table in the database, then create the ledger's tables empty.
    Reset,
}

/// Tables touched by [`provision`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Tables deleted before creation.
    pub dropped: Vec<String>,
    /// Tables that did not exist and were created.
    pub created: Vec<String>,
}

/// Creates the blocks table and the tables backing every configured state table.
///
/// Runs in one write transaction, so a reader never sees a half-provisioned
/// store. [`ProvisionMode::Reset`] deletes every table in the database first,
/// including tables no longer configured.
pub fn provision(
    engine: &StorageEngine,
    registry: &TableRegistry,
    mode: ProvisionMode,
) -> Result<ProvisionReport> {
    let report = engine.modify_table(BLOCKS_TABLE, |txn, summary| {
        let mut report = ProvisionReport::default();
        let existing: Vec<_> = txn.list_tables().context(StorageSnafu)?.collect();
        let existing_names: Vec<String> = existing.iter().map(|h| h.name().to_string()).collect();

        if mode == ProvisionMode::Reset {
            for (handle, name) in existing.into_iter().zip(&existing_names) {
                if txn.delete_table(handle).context(TableSnafu)? {
                    summary.deleted += 1;
                    report.dropped.push(name.clone());
                }
            }
        }
        let present =
            |name: &str| mode == ProvisionMode::Ensure && existing_names.iter().any(|t| t == name);

        for table in registry.bindings().iter().map(|b| StateTable::new(b.table())) {
            let [records, by_start, by_end] = table.table_names();
            txn.open_table(table.records()).context(TableSnafu)?;
            txn.open_table(table.by_start()).context(TableSnafu)?;
            txn.open_table(table.by_end()).context(TableSnafu)?;
            for name in [records, by_start, by_end] {
                if !present(name) {
                    report.created.push(name.to_string());
                }
            }
        }

        txn.open_table(Tables::BLOCKS).context(TableSnafu)?;
        if !present(BLOCKS_TABLE) {
            report.created.push(BLOCKS_TABLE.to_string());
        }

        summary.inserted = report.created.len() as u64;
        Ok(report)
    })?;

    for name in &report.dropped {
        info!(table = %name, "Table dropped");
    }
    for name in &report.created {
        info!(table = %name, "Table created");
    }
    info!(
        location = engine.location(),
        ?mode,
        dropped = report.dropped.len(),
        created = report.created.len(),
        "Store provisioned"
    );
    Ok(report)
}
