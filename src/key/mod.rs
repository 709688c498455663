//! Internal key encoding and ordering.
//!
//! Every entry the engine stores — in the memtable, in the WAL, and inside
//! SSTables — is addressed by an **internal key**: the triple
//! `(user_key, sequence, kind)`. The user key is an opaque byte string; the
//! sequence number is the global write counter at the time of the mutation;
//! the kind distinguishes live values from tombstones.
//!
//! # Wire format
//!
//! ```text
//! [user_key bytes][kind (1 B)][sequence (8 B, big-endian)]
//! ```
//!
//! The sequence is big-endian so that the tail of the encoding is
//! byte-comparable, but ordering is defined by [`compare`], not by raw
//! memcmp: user keys ascend in unsigned lexicographic order, and for equal
//! user keys the **higher** sequence sorts first (newest version wins a
//! forward scan). The kind byte never participates in ordering.
//!
//! # Invariants
//!
//! - Equal internal keys have byte-identical encodings.
//! - [`compare`] is a total order consistent with [`encode`]/[`decode`].
//! - Decoding rejects buffers shorter than [`INTERNAL_KEY_SUFFIX_LEN`].


use std::cmp::Ordering;

use thiserror::Error;

/// Length of the fixed suffix appended to every user key: kind (1) + sequence (8).
pub const INTERNAL_KEY_SUFFIX_LEN: usize = 9;

/// Maximum permitted user-key length in bytes.
pub const MAX_USER_KEY_LEN: usize = 1024;

/// Sentinel sequence used to build lookup keys: sorts before every real
/// version of the same user key.
pub const LOOKUP_SEQUENCE: u64 = u64::MAX;

/// Errors produced while decoding or validating keys.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Buffer too short to contain the kind + sequence suffix.
    #[error("internal key too short: {0} bytes (need at least {INTERNAL_KEY_SUFFIX_LEN})")]
    TooShort(usize),

    /// Kind byte was neither VALUE nor DELETION.
    #[error("unknown value kind byte: 0x{0:02x}")]
    UnknownKind(u8),

    /// User key failed the facade's constraints (empty or oversized).
    #[error("invalid user key: {0}")]
    InvalidUserKey(String),
}

/// Discriminates live values from deletion markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Tombstone: the user key was deleted at this sequence.
    Deletion = 0,
    /// A live value follows.
    Value = 1,
}

impl ValueKind {
    fn from_byte(b: u8) -> Result<Self, KeyError> {
        match b {
            0 => Ok(ValueKind::Deletion),
            1 => Ok(ValueKind::Value),
            other => Err(KeyError::UnknownKind(other)),
        }
    }
}

/// Encodes `(user_key, sequence, kind)` into a fresh buffer.
pub fn encode(user_key: &[u8], sequence: u64, kind: ValueKind) -> Vec<u8> {
    let mut buf = Vec::with_capacity(user_key.len() + INTERNAL_KEY_SUFFIX_LEN);
    buf.extend_from_slice(user_key);
    buf.push(kind as u8);
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf
}

/// Builds the lookup key for a point read of `user_key`: the smallest
/// internal key ≥ it is the newest stored version of that user key.
pub fn lookup_key(user_key: &[u8]) -> Vec<u8> {
    encode(user_key, LOOKUP_SEQUENCE, ValueKind::Value)
}

/// Decodes an internal key into `(user_key, sequence, kind)`.
pub fn decode(encoded: &[u8]) -> Result<(&[u8], u64, ValueKind), KeyError> {
    if encoded.len() < INTERNAL_KEY_SUFFIX_LEN {
        return Err(KeyError::TooShort(encoded.len()));
    }
    let split = encoded.len() - INTERNAL_KEY_SUFFIX_LEN;
    let (user_key, suffix) = encoded.split_at(split);
    let kind = ValueKind::from_byte(suffix[0])?;
    let mut seq_bytes = [0u8; 8];
    seq_bytes.copy_from_slice(&suffix[1..9]);
    Ok((user_key, u64::from_be_bytes(seq_bytes), kind))
}

/// Returns the user-key prefix of an encoded internal key.
///
/// Callers must pass a well-formed internal key; short buffers yield an
/// empty slice rather than panicking.
pub fn user_key(encoded: &[u8]) -> &[u8] {
    let len = encoded.len().saturating_sub(INTERNAL_KEY_SUFFIX_LEN);
    &encoded[..len]
}

/// Returns the sequence number of an encoded internal key, or 0 for a
/// malformed buffer.
pub fn sequence(encoded: &[u8]) -> u64 {
    if encoded.len() < INTERNAL_KEY_SUFFIX_LEN {
        return 0;
    }
    let mut seq_bytes = [0u8; 8];
    seq_bytes.copy_from_slice(&encoded[encoded.len() - 8..]);
    u64::from_be_bytes(seq_bytes)
}

/// Total order over encoded internal keys.
///
/// User keys ascend by unsigned lexicographic comparison; for equal user
/// keys the higher sequence number sorts first. The kind byte is ignored.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    match user_key(a).cmp(user_key(b)) {
        Ordering::Equal => sequence(b).cmp(&sequence(a)),
        ord => ord,
    }
}

/// Validates a user key against the facade constraints: nonempty and at
/// most [`MAX_USER_KEY_LEN`] bytes.
pub fn validate_user_key(user_key: &[u8]) -> Result<(), KeyError> {
    if user_key.is_empty() {
        return Err(KeyError::InvalidUserKey("empty key".into()));
    }
    if user_key.len() > MAX_USER_KEY_LEN {
        return Err(KeyError::InvalidUserKey(format!(
            "key length {} exceeds maximum {}",
            user_key.len(),
            MAX_USER_KEY_LEN
        )));
    }
    Ok(())
}
