//! Stream metadata
//!
//! Free-form string pairs stored in the header as a MessagePack map, prefixed
//! by its byte length.

use std::collections::BTreeMap;

use rmp_serde::{from_slice, to_vec};

use super::error::{HlacError, HlacResult};

/// metadata blocks larger than this are treated as garbage
pub const MAX_METADATA_BYTES: usize = 16 * 1024 * 1024;

/// serialize metadata to MessagePack
pub fn encode_metadata(metadata: &BTreeMap<String, String>) -> HlacResult<Vec<u8>> {
    to_vec(metadata)
        .map_err(|e| HlacError::Configuration(format!("metadata not serializable: {}", e)))
}

/// parse a metadata block written by `encode_metadata`
pub fn decode_metadata(bytes: &[u8]) -> HlacResult<BTreeMap<String, String>> {
    if bytes.is_empty() {
        return Ok(BTreeMap::new());
    }
    from_slice(bytes).map_err(|e| HlacError::CorruptStream(format!("bad metadata block: {}", e)))
}
