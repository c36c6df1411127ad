//! Subcommand implementations.
//!
//! Commands write JSON lines to the given writer so they can be tested
//! without a terminal.

use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    path::Path,
};

use chain_ledger_state::{
    Ledger, ProvisionMode, ProvisionReport, StorageEngine, TableRegistry, provision,
};
use chain_ledger_types::{IndexValue, StateRecord, config::LedgerConfig};
use serde::Serialize;
use snafu::ResultExt;
use tracing::info;

use crate::{
    error::{CliError, CreateDirSnafu, LedgerSnafu, OpenStoreSnafu, OutputSnafu, ReadInputSnafu},
    ingest::{IngestReport, ingest},
};

/// Creates the database file if needed and provisions every table.
pub fn setup(config: &LedgerConfig, reset: bool) -> Result<ProvisionReport, CliError> {
    let path = &config.storage.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
    }

    let registry = TableRegistry::from_config(config).context(LedgerSnafu)?;
    let engine = StorageEngine::open(path).context(OpenStoreSnafu { path })?;
    let mode = if reset { ProvisionMode::Reset } else { ProvisionMode::Ensure };
    if reset {
        info!(path = %path.display(), "Resetting store; existing data will be discarded");
    }
    provision(&engine, &registry, mode).context(LedgerSnafu)
}

/// Connects to the configured store and applies the events in `file`, or stdin.
pub fn ingest_events(config: &LedgerConfig, file: Option<&Path>) -> Result<IngestReport, CliError> {
    let ledger = Ledger::connect(config).context(LedgerSnafu)?;
    match file {
        Some(path) => {
            let file = File::open(path).context(ReadInputSnafu)?;
            ingest(&ledger, BufReader::new(file))
        },
        None => ingest(&ledger, io::stdin().lock()),
    }
}

/// Writes stored blocks in `[from, to]` as JSON lines. `to` defaults to the latest block.
pub fn show_blocks(
    ledger: &Ledger,
    from: u64,
    to: Option<u64>,
    out: &mut impl Write,
) -> Result<usize, CliError> {
    let to = match to {
        Some(to) => to,
        None => match ledger.blocks().latest().context(LedgerSnafu)? {
            Some(latest) => latest.block_num,
            None => return Ok(0),
        },
    };
    if from > to {
        return Ok(0);
    }
    let blocks = ledger.blocks().range(from..=to).context(LedgerSnafu)?;
    for block in &blocks {
        write_line(out, block)?;
    }
    Ok(blocks.len())
}

/// Writes state versions of `table` as JSON lines.
///
/// With `key`, prints that entity only; `key` is parsed as JSON and falls back
/// to a plain string. Without `history`, only current versions are printed.
pub fn show_state(
    ledger: &Ledger,
    table: &str,
    key: Option<&str>,
    history: bool,
    out: &mut impl Write,
) -> Result<usize, CliError> {
    let records: Vec<StateRecord> = match key {
        Some(key) => {
            let index_value = parse_key(key);
            if history {
                ledger.state().history(table, &index_value).context(LedgerSnafu)?
            } else {
                let current = ledger.state().current(table, &index_value).context(LedgerSnafu)?;
                current.into_iter().collect()
            }
        },
        None if history => {
            let mut all = Vec::new();
            for record in ledger.state().current_all(table).context(LedgerSnafu)? {
                let Some(index_value) = index_of(ledger, table, &record) else { continue };
                all.extend(ledger.state().history(table, &index_value).context(LedgerSnafu)?);
            }
            all
        },
        None => ledger.state().current_all(table).context(LedgerSnafu)?,
    };

    for record in &records {
        write_line(out, record)?;
    }
    Ok(records.len())
}

/// Index value of `record` according to the binding of `table`.
fn index_of(ledger: &Ledger, table: &str, record: &StateRecord) -> Option<IndexValue> {
    let binding = ledger.registry().bindings().iter().find(|b| b.table() == table)?;
    record.index_value(binding.index())
}

fn parse_key(key: &str) -> IndexValue {
    match serde_json::from_str::<serde_json::Value>(key) {
        Ok(value) => IndexValue::new(&value),
        Err(_) => IndexValue::from(key),
    }
}

fn write_line(out: &mut impl Write, value: &impl Serialize) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, value).map_err(io::Error::from).context(OutputSnafu)?;
    out.write_all(b"\n").context(OutputSnafu)
}
