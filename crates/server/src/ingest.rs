//! Newline-delimited JSON event ingestion.
//!
//! Each non-blank line holds one event:
//!
//! ```json
//! {"block": {"blockNum": 2, "blockId": "0xab", "previousBlockId": "0x9f"}}
//! {"state": {"type": "Agent", "blockNum": 2, "payload": {"publicKey": "pk1"}}}
//! ```
//!
//! Events are applied in order. The first failing event stops ingestion;
//! events before it stay applied.

use std::io::BufRead;

use chain_ledger_state::{AddVersion, BlockInsert, Ledger};
use chain_ledger_types::{Block, BlockNum, Document};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, info};

use crate::error::{ApplyEventSnafu, CliError, ParseEventSnafu, ReadInputSnafu};

/// One ingest event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    /// A block to record.
    Block(Block),
    /// An entity state to version.
    State(StateEvent),
}

/// Entity state submitted at a height.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEvent {
    /// Entity-type name.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Height the state takes effect at.
    pub block_num: BlockNum,
    /// Entity fields, including its index field.
    pub payload: Document,
}

/// Counts of what an ingest run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Blocks stored at new heights.
    pub blocks_appended: u64,
    /// Blocks already stored with the same id.
    pub blocks_replayed: u64,
    /// Blocks that replaced a conflicting block.
    pub forks: u64,
    /// State versions added.
    pub states_added: u64,
    /// State adds that matched an existing version.
    pub states_duplicate: u64,
}

/// Applies every event read from `input` to `ledger`.
///
/// # Errors
///
/// Returns the first read, parse, or ledger failure, tagged with its line number.
pub fn ingest(ledger: &Ledger, input: impl BufRead) -> Result<IngestReport, CliError> {
    let mut report = IngestReport::default();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.context(ReadInputSnafu)?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line).context(ParseEventSnafu { line: line_no })?;
        apply(ledger, event, &mut report).context(ApplyEventSnafu { line: line_no })?;
    }

    info!(
        blocks_appended = report.blocks_appended,
        blocks_replayed = report.blocks_replayed,
        forks = report.forks,
        states_added = report.states_added,
        states_duplicate = report.states_duplicate,
        "Ingest complete"
    );
    Ok(report)
}

fn apply(
    ledger: &Ledger,
    event: Event,
    report: &mut IngestReport,
) -> chain_ledger_types::Result<()> {
    match event {
        Event::Block(block) => match ledger.insert_block(block)? {
            BlockInsert::Appended(_) => report.blocks_appended += 1,
            BlockInsert::Replayed(_) => report.blocks_replayed += 1,
            BlockInsert::Forked(fork) => {
                debug!(
                    block_num = fork.block.block_num,
                    blocks_removed = fork.blocks_removed,
                    "Ingested fork block"
                );
                report.forks += 1;
            },
        },
        Event::State(state) => {
            match ledger.add_entity_state(&state.entity_type, state.payload, state.block_num)? {
                AddVersion::Inserted { .. } => report.states_added += 1,
                AddVersion::Duplicate(_) => report.states_duplicate += 1,
            }
        },
    }
    Ok(())
}
