//! Block ledger and block-versioned state for the chain ledger.
//!
//! This crate sits on top of redb and provides:
//!
//! - Storage engine wrapper with single-transaction read and write steps
//! - Block ledger with fork detection and resolution
//! - Temporal state tables versioned by block interval, with fork rollback
//! - Ledger facade dispatching entity state by entity type
//! - Table provisioning

#![deny(unsafe_code)]

mod block_ledger;
mod engine;
mod keys;
mod ledger;
pub mod metrics;
mod provision;
mod registry;
pub mod tables;
mod temporal;

pub use block_ledger::{BlockInsert, BlockLedger, ForkReport};
pub use engine::{StorageEngine, StoreError, WriteSummary};
pub use ledger::Ledger;
pub use provision::{ProvisionMode, ProvisionReport, provision};
pub use registry::{EntityBinding, TableRegistry};
pub use temporal::{AddVersion, DeforkReport, TemporalStore};
