//! Proptest strategies for chain ledger domain types.
//!
//! Reusable generators for property-based testing across crates.
//!
//! # Usage
//!
//! ```no_run
//! use chain_ledger_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(chain in strategies::arb_chain(1..20)) {
//!         // test invariant with a randomly generated chain
//!     }
//! }
//! ```

use std::ops::Range;

use chain_ledger_types::{Block, BlockNum, Document};
use proptest::prelude::*;
use serde_json::{Value, json};

/// Generates a block id of the form `0x` followed by 8 hex digits.
pub fn arb_block_id() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}".prop_map(|hex| format!("0x{hex}"))
}

/// Generates a small opaque JSON value for extra fields.
pub fn arb_field_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        (-1_000i64..1_000).prop_map(Value::from),
        "[a-z]{0,12}".prop_map(Value::from),
    ]
}

/// Generates strictly increasing block heights starting from 1.
///
/// Gaps between consecutive heights are 1 to 3.
pub fn arb_heights(len: Range<usize>) -> impl Strategy<Value = Vec<BlockNum>> {
    proptest::collection::vec(1u64..=3, len).prop_map(|gaps| {
        gaps.into_iter()
            .scan(0, |height, gap| {
                *height += gap;
                Some(*height)
            })
            .collect()
    })
}

/// Generates a conflict-free chain: strictly increasing heights, random ids and fields.
pub fn arb_chain(len: Range<usize>) -> impl Strategy<Value = Vec<Block>> {
    arb_heights(len).prop_flat_map(|heights| {
        let count = heights.len();
        (
            Just(heights),
            proptest::collection::vec(arb_block_id(), count),
            proptest::collection::vec(arb_field_value(), count),
        )
            .prop_map(|(heights, ids, values)| {
                heights
                    .into_iter()
                    .zip(ids)
                    .zip(values)
                    .map(|((n, id), value)| Block::new(n, id).with_field("payload", value))
                    .collect()
            })
    })
}

/// Generates an index value: a short string key or a small integer.
pub fn arb_index_value() -> impl Strategy<Value = Value> {
    prop_oneof!["[a-z]{1,4}".prop_map(Value::from), (0i64..16).prop_map(Value::from)]
}

/// Generates a payload carrying `index` under `index_name` plus one extra field.
pub fn arb_payload(index_name: &'static str, index: Value) -> impl Strategy<Value = Document> {
    arb_field_value().prop_map(move |value| {
        let mut payload = Document::new();
        payload.insert(index_name.to_string(), index.clone());
        payload.insert("value".to_string(), value);
        payload
    })
}

/// Generates a payload for one of `keys` with a random extra field.
pub fn arb_keyed_payload(
    index_name: &'static str,
    keys: &'static [&'static str],
) -> impl Strategy<Value = Document> {
    (prop::sample::select(keys), arb_field_value()).prop_map(move |(key, value)| {
        let mut payload = Document::new();
        payload.insert(index_name.to_string(), json!(key));
        payload.insert("value".to_string(), value);
        payload
    })
}
