//! Ledger metrics recorded via the `metrics` crate.
//!
//! ## Metric Naming Conventions
//!
//! All metrics follow the pattern: `chain_ledger_{subsystem}_{name}_{unit}`
//!
//! - Counters: `_total` suffix
//! - Histograms: `_seconds` suffix, or a bare name for counts
//!
//! Nothing is exported unless the embedding process installs a recorder.

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

// Block ledger metrics
const BLOCKS_APPENDED_TOTAL: &str = "chain_ledger_blocks_appended_total";
const BLOCK_REPLAYS_TOTAL: &str = "chain_ledger_block_replays_total";
const FORKS_TOTAL: &str = "chain_ledger_forks_total";
const FORK_DEPTH: &str = "chain_ledger_fork_depth";

// Temporal state metrics
const DEFORK_DELETED_TOTAL: &str = "chain_ledger_defork_deleted_total";
const DEFORK_REOPENED_TOTAL: &str = "chain_ledger_defork_reopened_total";
const DEFORK_LATENCY: &str = "chain_ledger_defork_latency_seconds";
const STATE_VERSIONS_TOTAL: &str = "chain_ledger_state_versions_total";
const STATE_DUPLICATES_TOTAL: &str = "chain_ledger_state_duplicates_total";

// =============================================================================
// Block Ledger
// =============================================================================

/// Records a block stored at a new height.
#[inline]
pub fn record_block_appended() {
    counter!(BLOCKS_APPENDED_TOTAL).increment(1);
}

/// Records a block resubmitted with its stored identity.
#[inline]
pub fn record_block_replay() {
    counter!(BLOCK_REPLAYS_TOTAL).increment(1);
}

/// Records a resolved fork and the number of stored blocks it discarded.
#[inline]
pub fn record_fork(blocks_removed: u64) {
    counter!(FORKS_TOTAL).increment(1);
    histogram!(FORK_DEPTH).record(blocks_removed as f64);
}

// =============================================================================
// Temporal State
// =============================================================================

/// Records the outcome of rolling back one state table.
#[inline]
pub fn record_defork(table: &str, deleted: u64, reopened: u64, latency_secs: f64) {
    counter!(DEFORK_DELETED_TOTAL, "table" => table.to_string()).increment(deleted);
    counter!(DEFORK_REOPENED_TOTAL, "table" => table.to_string()).increment(reopened);
    histogram!(DEFORK_LATENCY, "table" => table.to_string()).record(latency_secs);
}

/// Records a new state version.
#[inline]
pub fn record_state_version(table: &str) {
    counter!(STATE_VERSIONS_TOTAL, "table" => table.to_string()).increment(1);
}

/// Records a state add that matched an existing version at the same height.
#[inline]
pub fn record_state_duplicate(table: &str) {
    counter!(STATE_DUPLICATES_TOTAL, "table" => table.to_string()).increment(1);
}
