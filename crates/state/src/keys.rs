//! Key encoding for state tables.
//!
//! Versions of one entity share a prefix so they can be found with a single
//! range scan, ordered by the height at which each version starts:
//!
//! Version key: {index_len:4BE}{index_value:var}{start_block:8BE}
//!
//! The height indexes prefix a version key with a block height so that every
//! version started or closed at or after a height can be found by range scan:
//!
//! Height key: {height:8BE}{version_key:var}

use chain_ledger_types::{BlockNum, IndexValue};

/// Decoded version key components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKey {
    /// Entity the version belongs to.
    pub index_value: IndexValue,
    /// Height at which the version starts.
    pub start_block_num: BlockNum,
}

/// Encodes the key of the version of `index_value` starting at `start_block_num`.
///
/// Big-endian heights keep versions of one entity in start order.
pub fn encode_version_key(index_value: &IndexValue, start_block_num: BlockNum) -> Vec<u8> {
    let mut key = version_prefix(index_value);
    key.extend_from_slice(&start_block_num.to_be_bytes());
    key
}

/// Creates the prefix shared by every version of `index_value`.
///
/// The length prefix stops one index value from being a prefix of another.
pub fn version_prefix(index_value: &IndexValue) -> Vec<u8> {
    let bytes = index_value.as_bytes();
    let mut prefix = Vec::with_capacity(4 + bytes.len() + 8);
    prefix.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    prefix.extend_from_slice(bytes);
    prefix
}

/// Inclusive bounds covering every version of `index_value`.
pub fn version_range(index_value: &IndexValue) -> (Vec<u8>, Vec<u8>) {
    (encode_version_key(index_value, 0), encode_version_key(index_value, BlockNum::MAX))
}

/// Decodes a version key into its components.
///
/// Returns None if the key is truncated or the index value is not UTF-8.
pub fn decode_version_key(key: &[u8]) -> Option<VersionKey> {
    if key.len() < 12 {
        return None;
    }
    let len = u32::from_be_bytes(key[..4].try_into().ok()?) as usize;
    if key.len() != 4 + len + 8 {
        return None;
    }
    let index = std::str::from_utf8(&key[4..4 + len]).ok()?;
    let start_block_num = BlockNum::from_be_bytes(key[4 + len..].try_into().ok()?);

    Some(VersionKey { index_value: IndexValue::from_canonical(index), start_block_num })
}

/// Encodes a height index key pointing at `version_key`.
pub fn encode_height_key(height: BlockNum, version_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + version_key.len());
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(version_key);
    key
}

/// Lowest height key at `height`. Every height key for `height` or above sorts after it.
pub fn height_lower_bound(height: BlockNum) -> [u8; 8] {
    height.to_be_bytes()
}

/// Splits a height index key into its height and version key.
pub fn decode_height_key(key: &[u8]) -> Option<(BlockNum, &[u8])> {
    if key.len() < 8 {
        return None;
    }
    let height = BlockNum::from_be_bytes(key[..8].try_into().ok()?);
    Some((height, &key[8..]))
}
