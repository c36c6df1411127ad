//! Core type definitions for the chain ledger.
//!
//! - Blocks, keyed by height and identified by an opaque id
//! - State records, each valid over a half-open block interval
//! - Index values grouping the versions of one logical entity

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Block height.
pub type BlockNum = u64;

/// An opaque JSON object carried alongside ledger fields.
pub type Document = serde_json::Map<String, Value>;

/// Sentinel `endBlockNum` of a version that has not been superseded.
///
/// Persisted as `2^53 - 1` so stored documents stay exact for JSON number
/// consumers.
pub const OPEN_END_BLOCK: BlockNum = 9_007_199_254_740_991;

/// Field holding the first height at which a state version is valid.
pub const START_BLOCK_FIELD: &str = "startBlockNum";

/// Field holding the first height at which a state version is no longer valid.
pub const END_BLOCK_FIELD: &str = "endBlockNum";

/// Field marking the current version of an entity.
pub const LATEST_FIELD: &str = "latest";

/// Payload fields owned by the ledger. Caller-supplied values are overwritten.
pub const RESERVED_STATE_FIELDS: [&str; 3] = [START_BLOCK_FIELD, END_BLOCK_FIELD, LATEST_FIELD];

/// Returns true if `height` can be stored as a block number.
#[inline]
pub const fn is_valid_block_num(height: BlockNum) -> bool {
    height < OPEN_END_BLOCK
}

// ============================================================================
// Blocks
// ============================================================================

/// A block as recorded by the ledger.
///
/// Only `block_num` and `block_id` carry meaning. Every other field is kept
/// verbatim and stored flattened next to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Height of the block. Primary key of the blocks table.
    pub block_num: BlockNum,
    /// Identity of the block. Two blocks at one height with different ids form a fork.
    pub block_id: String,
    /// Opaque fields stored with the block.
    #[serde(flatten)]
    pub fields: Document,
}

impl Block {
    /// Creates a block with no extra fields.
    pub fn new(block_num: BlockNum, block_id: impl Into<String>) -> Self {
        Self { block_num, block_id: block_id.into(), fields: Document::new() }
    }

    /// Adds an opaque field. Attempts to set `blockNum` or `blockId` are ignored.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "blockNum" && key != "blockId" {
            self.fields.insert(key, value);
        }
        self
    }

    /// Returns true if both blocks claim the same height with the same id.
    pub fn same_identity(&self, other: &Block) -> bool {
        self.block_num == other.block_num && self.block_id == other.block_id
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}@{}", self.block_id, self.block_num)
    }
}

// ============================================================================
// Index values
// ============================================================================

/// The domain key grouping all versions of one logical entity.
///
/// Holds the canonical JSON text of the payload's index field, so `"7"` and
/// `7` are distinct keys, as they would be in a document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexValue(String);

impl IndexValue {
    /// Creates an index value from any JSON value.
    ///
    /// Numbers compare by value: an integral float such as `1.0` is keyed
    /// the same as `1`.
    pub fn new(value: &Value) -> Self {
        Self(canonical_number(value).unwrap_or_else(|| value.to_string()))
    }

    /// Extracts the index value from `payload[index_name]`.
    ///
    /// Returns `None` if the field is missing or `null`.
    pub fn from_document(payload: &Document, index_name: &str) -> Option<Self> {
        match payload.get(index_name) {
            None | Some(Value::Null) => None,
            Some(value) => Some(Self::new(value)),
        }
    }

    /// Restores an index value from its canonical encoding.
    pub fn from_canonical(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the canonical JSON encoding.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the canonical JSON encoding as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Integer text of a float that holds an exact integer.
fn canonical_number(value: &Value) -> Option<String> {
    let number = value.as_number()?;
    if number.is_i64() || number.is_u64() {
        return None;
    }
    let float = number.as_f64()?;
    // 2^63 bounds the range where `as i64` is exact.
    if float.fract() != 0.0 || float.abs() >= 9_223_372_036_854_775_808.0 {
        return None;
    }
    Some((float as i64).to_string())
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        Self::new(&Value::String(value.to_string()))
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        Self::new(&Value::from(value))
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// State records
// ============================================================================

/// One version of an entity, authoritative for `[start_block_num, end_block_num)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    /// Entity fields, including the index field.
    #[serde(flatten)]
    pub payload: Document,
    /// First height at which this version is valid.
    pub start_block_num: BlockNum,
    /// First height at which this version is no longer valid.
    pub end_block_num: BlockNum,
    /// True iff `end_block_num == OPEN_END_BLOCK`.
    pub latest: bool,
}

impl StateRecord {
    /// Creates the current version of an entity starting at `start_block_num`.
    pub fn open(mut payload: Document, start_block_num: BlockNum) -> Self {
        for field in RESERVED_STATE_FIELDS {
            payload.remove(field);
        }
        Self { payload, start_block_num, end_block_num: OPEN_END_BLOCK, latest: true }
    }

    /// Returns true if this version has not been superseded.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.end_block_num == OPEN_END_BLOCK
    }

    /// Supersedes this version at `end_block_num`.
    pub fn close(&mut self, end_block_num: BlockNum) {
        self.end_block_num = end_block_num;
        self.latest = false;
    }

    /// Makes this version current again.
    pub fn reopen(&mut self) {
        self.end_block_num = OPEN_END_BLOCK;
        self.latest = true;
    }

    /// Returns true if this version is authoritative at `height`.
    #[inline]
    pub fn covers(&self, height: BlockNum) -> bool {
        self.start_block_num <= height && height < self.end_block_num
    }

    /// Returns the value of the payload's index field.
    pub fn index_value(&self, index_name: &str) -> Option<IndexValue> {
        IndexValue::from_document(&self.payload, index_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_open_record_strips_reserved_fields() {
        let record = StateRecord::open(
            doc(json!({"id": "a", "startBlockNum": 99, "endBlockNum": 1, "latest": false})),
            5,
        );
        assert_eq!(record.start_block_num, 5);
        assert_eq!(record.end_block_num, OPEN_END_BLOCK);
        assert!(record.latest);
        assert_eq!(record.payload.len(), 1);
    }

    #[test]
    fn test_close_and_reopen_keep_latest_in_sync() {
        let mut record = StateRecord::open(doc(json!({"id": "a"})), 10);
        record.close(20);
        assert!(!record.is_current());
        assert!(!record.latest);
        assert!(record.covers(10));
        assert!(record.covers(19));
        assert!(!record.covers(20));

        record.reopen();
        assert!(record.is_current());
        assert!(record.latest);
        assert!(record.covers(1_000_000));
    }

    #[test]
    fn test_index_value_is_type_sensitive() {
        let as_string = IndexValue::new(&json!("7"));
        let as_number = IndexValue::new(&json!(7));
        assert_ne!(as_string, as_number);
        assert_eq!(IndexValue::from("7"), as_string);
        assert_eq!(IndexValue::from(7), as_number);
    }

    #[test]
    fn test_index_value_compares_numbers_by_value() {
        assert_eq!(IndexValue::new(&json!(1.0)), IndexValue::from(1));
        assert_eq!(IndexValue::new(&json!(-3.0)), IndexValue::from(-3));
        assert_ne!(IndexValue::new(&json!(1.5)), IndexValue::from(1));
        assert_eq!(IndexValue::new(&json!(1.5)).as_str(), "1.5");
        assert_eq!(IndexValue::new(&json!(u64::MAX)).as_str(), u64::MAX.to_string());
    }

    proptest! {
        #[test]
        fn prop_integral_float_keys_like_integer(n in -(1i64 << 52)..(1i64 << 52)) {
            prop_assert_eq!(IndexValue::new(&json!(n as f64)), IndexValue::from(n));
        }
    }

    #[test]
    fn test_index_value_from_document() {
        let payload = doc(json!({"key": "k", "empty": null}));
        assert_eq!(IndexValue::from_document(&payload, "key"), Some(IndexValue::from("k")));
        assert_eq!(IndexValue::from_document(&payload, "empty"), None);
        assert_eq!(IndexValue::from_document(&payload, "missing"), None);
    }

    #[test]
    fn test_block_with_field_ignores_identity_keys() {
        let block = Block::new(1, "A").with_field("blockId", json!("B")).with_field("x", json!(1));
        assert_eq!(block.block_id, "A");
        assert_eq!(block.fields.len(), 1);
    }

    #[test]
    fn test_same_identity() {
        assert!(Block::new(2, "B").same_identity(&Block::new(2, "B")));
        assert!(!Block::new(2, "B").same_identity(&Block::new(2, "C")));
        assert!(!Block::new(2, "B").same_identity(&Block::new(3, "B")));
    }

    #[test]
    fn test_block_num_range() {
        assert!(is_valid_block_num(0));
        assert!(is_valid_block_num(OPEN_END_BLOCK - 1));
        assert!(!is_valid_block_num(OPEN_END_BLOCK));
    }
}
