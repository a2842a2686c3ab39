//! JSON codec shared by every backend
//!
//! A batch travels as a single JSON array of objects with no framing. Both
//! an external executable and the embedded JavaScript environment can read
//! and write that without any extra protocol.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::RecordBatch;

/// Serialize a batch to JSON bytes
pub fn encode(batch: &RecordBatch) -> Result<Vec<u8>> {
    serde_json::to_vec(batch).map_err(|e| Error::Encode {
        message: e.to_string(),
    })
}

/// Parse JSON bytes into a batch
///
/// The input must be exactly one JSON array of objects; surrounding
/// whitespace is allowed, anything else is an error.
pub fn decode(bytes: &[u8]) -> std::result::Result<RecordBatch, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Adapt an already-parsed JSON value into a batch
pub fn from_value(value: Value) -> std::result::Result<RecordBatch, serde_json::Error> {
    serde_json::from_value(value)
}
