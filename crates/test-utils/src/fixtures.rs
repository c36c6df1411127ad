//! Fixture builders for ledger documents and table bindings.

// Fixtures panic on malformed input; callers pass literals.
#![allow(clippy::expect_used)]

use chain_ledger_types::{Document, config::TableConfig};
use serde_json::Value;

/// Converts a JSON object literal into a [`Document`].
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture document must be a JSON object, got {other}"),
    }
}

/// Builds a validated table binding.
///
/// # Panics
///
/// Panics if the binding is invalid.
pub fn table_config(name: &str, entity_type: &str, index: &str) -> TableConfig {
    TableConfig::builder()
        .name(name)
        .entity_type(entity_type)
        .index(index)
        .build()
        .expect("fixture table config must be valid")
}
