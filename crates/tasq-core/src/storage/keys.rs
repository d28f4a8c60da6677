//! Key encoding for RocksDB column families.
//!
//! All numeric values use big-endian encoding for correct lexicographic
//! ordering. Composite keys use `:` (0x3A) as separator. Variable-length
//! strings are length-prefixed with a big-endian u16.

use chrono::{DateTime, Utc};

const SEPARATOR: u8 = b':';

/// Engine-metadata key holding the next message id counter (8-byte BE u64).
pub const STATE_NEXT_MESSAGE_ID: &[u8] = b"next_message_id";

/// Encode a u64 as 8 big-endian bytes.
fn encode_u64(val: u64) -> [u8; 8] {
    val.to_be_bytes()
}

/// Encode a variable-length string with a 2-byte big-endian length prefix.
fn encode_string(s: &str) -> Vec<u8> {
    let len = u16::try_from(s.len()).expect("key string exceeds 64 KiB");
    let mut buf = Vec::with_capacity(2 + s.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    buf
}

/// Creation timestamp as non-negative nanoseconds since the epoch, for key
/// ordering. Pre-epoch values clamp to zero.
pub fn created_ns(created_at: DateTime<Utc>) -> u64 {
    created_at
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .max(0) as u64
}

/// Build a message key: `{queue}:{created_ns}:{id}`
///
/// Key layout (binary):
/// - length-prefixed queue name
/// - separator
/// - 8-byte big-endian creation timestamp (nanos)
/// - separator
/// - 8-byte big-endian message id
///
/// Iterating a queue prefix therefore yields messages oldest-first; the id
/// suffix breaks ties between same-instant creations.
pub fn message_key(queue: &str, created_at: DateTime<Utc>, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&encode_string(queue));
    key.push(SEPARATOR);
    key.extend_from_slice(&encode_u64(created_ns(created_at)));
    key.push(SEPARATOR);
    key.extend_from_slice(&encode_u64(id));
    key
}

/// Build a prefix for iterating all messages in a queue.
pub fn message_prefix(queue: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(16);
    prefix.extend_from_slice(&encode_string(queue));
    prefix.push(SEPARATOR);
    prefix
}

/// Decode an 8-byte big-endian u64 state value (e.g. the id counter).
pub fn decode_u64_state(value: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = value.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Encode a u64 state value.
pub fn encode_u64_state(val: u64) -> Vec<u8> {
    val.to_be_bytes().to_vec()
}
