//! Centralized serialization and deserialization functions.
//!
//! Stored blocks and state records are opaque JSON documents, so the codec
//! is JSON throughout, with consistent error handling via snafu.

use serde::{Serialize, de::DeserializeOwned};
use snafu::Snafu;

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Encodes a value to JSON bytes.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|source| CodecError::Encode { source })
}

/// Decodes JSON bytes to a value.
///
/// # Errors
///
/// Returns `CodecError::Decode` if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|source| CodecError::Decode { source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{Block, StateRecord};

    #[test]
    fn test_block_uses_camel_case_layout() {
        let block = Block::new(7, "0xabc").with_field("previousBlockId", json!("0xdef"));
        let bytes = encode(&block).expect("encode block");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");

        assert_eq!(value["blockNum"], json!(7));
        assert_eq!(value["blockId"], json!("0xabc"));
        assert_eq!(value["previousBlockId"], json!("0xdef"));

        let decoded: Block = decode(&bytes).expect("decode block");
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_state_record_keeps_payload_fields_flat() {
        let payload = json!({"publicKey": "k1", "name": "alice"});
        let record = StateRecord::open(payload.as_object().cloned().unwrap(), 3);

        let bytes = encode(&record).expect("encode record");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");
        assert_eq!(value["publicKey"], json!("k1"));
        assert_eq!(value["startBlockNum"], json!(3));
        assert_eq!(value["endBlockNum"], json!(crate::OPEN_END_BLOCK));
        assert_eq!(value["latest"], json!(true));

        let decoded: StateRecord = decode(&bytes).expect("decode record");
        assert_eq!(decoded, record);
        assert!(!decoded.payload.contains_key("startBlockNum"));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<Block, _> = decode(b"not json");
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_decode_block_without_id_fails() {
        let result: Result<Block, _> = decode(br#"{"blockNum": 1}"#);
        assert!(result.is_err());
    }
}
