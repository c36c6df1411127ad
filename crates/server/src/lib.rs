//! Chain ledger command-line front end.
//!
//! Provides configuration loading, table setup, event ingestion, and
//! inspection of stored blocks and state.

#![deny(unsafe_code)]

pub mod commands;
pub mod config;
pub mod error;
pub mod ingest;
