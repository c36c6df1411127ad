//! Shared test utilities for the chain ledger crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test modules:
//!
//! - [`TestDir`] - Managed temporary directory with path helpers
//! - [`doc`] - JSON object literal to [`Document`](chain_ledger_types::Document)
//! - [`table_config`] - Validated table binding
//! - [`strategies`] - Proptest generators for blocks and state payloads

#![deny(unsafe_code)]

mod test_dir;
pub use test_dir::TestDir;

mod fixtures;
pub use fixtures::{doc, table_config};

pub mod strategies;
