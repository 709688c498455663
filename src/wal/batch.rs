//! Atomic write batches and their WAL wire format.
//!
//! A [`WriteBatch`] is an ordered list of Put / Delete operations that is
//! committed as a unit. On commit the engine assigns the batch a contiguous
//! sequence range `[start, start + len)`, one sequence per operation in
//! insertion order.
//!
//! # Wire format (one WAL record payload)
//!
//! ```text
//! [start_sequence (8 B, LE)]
//! repeated:
//!   [kind (1 B)][key_len (4 B, LE)][key]
//!   if kind == VALUE: [value_len (4 B, LE)][value]
//! ```
//!
//! DELETION operations omit the value fields entirely.

use crate::key::ValueKind;

use super::WalError;

/// A single operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite `key` with `value`.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete `key` (records a tombstone).
    Delete { key: Vec<u8> },
}

impl BatchOp {
    /// The user key this operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } => key,
            BatchOp::Delete { key } => key,
        }
    }
}

/// An ordered, atomically-committed group of mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a Put operation.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Appends a Delete operation.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    /// Number of operations in the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Removes all operations.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Iterates the operations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BatchOp> {
        self.ops.iter()
    }

    /// Serializes the batch stamped with `start_sequence`.
    pub fn encode(&self, start_sequence: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.ops.len() * 16);
        buf.extend_from_slice(&start_sequence.to_le_bytes());
        for op in &self.ops {
            match op {
                BatchOp::Put { key, value } => {
                    buf.push(ValueKind::Value as u8);
                    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                    buf.extend_from_slice(key);
                    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                    buf.extend_from_slice(value);
                }
                BatchOp::Delete { key } => {
                    buf.push(ValueKind::Deletion as u8);
                    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                    buf.extend_from_slice(key);
                }
            }
        }
        buf
    }

    /// Deserializes a WAL record payload into `(start_sequence, batch)`.
    pub fn decode(payload: &[u8]) -> Result<(u64, Self), WalError> {
        let mut cursor = Cursor::new(payload);
        let start_sequence = cursor.read_u64()?;
        let mut ops = Vec::new();
        while !cursor.is_empty() {
            let kind = cursor.read_u8()?;
            let key = cursor.read_len_prefixed()?;
            match kind {
                k if k == ValueKind::Value as u8 => {
                    let value = cursor.read_len_prefixed()?;
                    ops.push(BatchOp::Put { key, value });
                }
                k if k == ValueKind::Deletion as u8 => {
                    ops.push(BatchOp::Delete { key });
                }
                other => {
                    return Err(WalError::Corruption(format!(
                        "unknown batch op kind 0x{other:02x}"
                    )));
                }
            }
        }
        Ok((start_sequence, Self { ops }))
    }

    /// Exact length of the encoded batch, used for the oversized-batch
    /// check before any state changes.
    pub fn encoded_len(&self) -> usize {
        8 + self
            .ops
            .iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => 9 + key.len() + value.len(),
                BatchOp::Delete { key } => 5 + key.len(),
            })
            .sum::<usize>()
    }
}

/// Bounds-checked byte cursor for decoding batch payloads.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WalError> {
        if self.pos + n > self.buf.len() {
            return Err(WalError::Corruption(format!(
                "batch payload truncated: need {n} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, WalError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, WalError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, WalError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    fn read_len_prefixed(&mut self) -> Result<Vec<u8>, WalError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}
