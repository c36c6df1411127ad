//! Core types, errors, and configuration for the chain ledger.
//!
//! This crate provides the foundational types used throughout the ledger:
//! - Blocks and versioned state records
//! - Index values used to group state versions
//! - JSON codec for stored documents
//! - Error types using snafu
//! - Configuration types loaded from TOML and the environment

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod error;
pub mod types;

pub use codec::{CodecError, decode, encode};
pub use error::{ErrorCode, LedgerError, Result};
pub use types::*;
