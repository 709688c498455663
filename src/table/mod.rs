//! Sorted String Table (SSTable)
//!
//! Immutable, sorted, on-disk tables — the persistent layer of the LSM
//! tree. A table is written once by a memtable flush or a compaction and
//! never modified afterwards, which makes concurrent reads lock-free.
//!
//! # On-disk layout
//!
//! ```text
//! [data block]*                prefix-compressed sorted entries (block.rs)
//! [meta block]                 serialized bloom filter (may be empty)
//! [index block]                last_key_of_data_block → block handle
//! [footer (40 B)]              meta handle | index handle | magic
//! ```
//!
//! The footer is fixed-size: `meta_offset(8) | meta_size(8) |
//! index_offset(8) | index_size(8) | magic(8)`, all little-endian, with
//! magic `0xDB4775248B80FB57`. Data blocks are concatenated in ascending
//! key order; each index entry stores the **last** key of its data block,
//! so data block *i* covers `(index_key[i-1], index_key[i]]` and block 0
//! covers everything up to and including `index_key[0]`.
//!
//! Entries map user keys to value payloads; an empty payload is the
//! engine's on-disk representation of a tombstone (user-level empty values
//! are rejected at the facade).
//!
//! # Sub-modules
//!
//! - [`block`] — prefix-compressed block builder and reader.
//! - [`builder`] — [`TableBuilder`], streaming table construction.
//! - [`reader`] — [`TableReader`], mmap-backed point lookups and scans.

pub mod block;
pub mod builder;
pub mod reader;

#[cfg(test)]
mod tests;

use std::io;

use thiserror::Error;

pub use builder::TableBuilder;
pub use reader::{TableIter, TableReader};

use crate::filter::FilterError;

/// Table footer magic number.
pub const TABLE_MAGIC: u64 = 0xDB47_7524_8B80_FB57;

/// Encoded footer size in bytes.
pub const FOOTER_SIZE: usize = 40;

/// Default data-block target size.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Target false-positive rate for per-table bloom filters.
pub const FILTER_FPR: f64 = 0.01;

/// Errors returned by table operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structurally invalid table or block contents.
    #[error("corrupt table: {0}")]
    Corruption(String),

    /// Filter block failed to decode.
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),
}

/// Location of a block inside a table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    /// Byte offset of the block.
    pub offset: u64,
    /// Byte length of the block.
    pub size: u64,
}

impl BlockHandle {
    /// Encoded handle length.
    pub const ENCODED_LEN: usize = 16;

    /// Serializes the handle as two little-endian u64s.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Deserializes a handle.
    pub fn decode(data: &[u8]) -> Result<Self, TableError> {
        if data.len() < Self::ENCODED_LEN {
            return Err(TableError::Corruption("truncated block handle".into()));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&data[..8]);
        let offset = u64::from_le_bytes(word);
        word.copy_from_slice(&data[8..16]);
        let size = u64::from_le_bytes(word);
        Ok(Self { offset, size })
    }

    /// Validates that the block lies within a file of `file_size` bytes.
    pub fn check_bounds(&self, file_size: u64) -> Result<(), TableError> {
        let end = self
            .offset
            .checked_add(self.size)
            .ok_or_else(|| TableError::Corruption("block handle overflows".into()))?;
        if end > file_size {
            return Err(TableError::Corruption(format!(
                "block handle [{}, {end}) outside file of {file_size} bytes",
                self.offset
            )));
        }
        Ok(())
    }
}

/// The fixed-size table footer.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    /// Handle of the meta (filter) block.
    pub meta: BlockHandle,
    /// Handle of the index block.
    pub index: BlockHandle,
}

impl Footer {
    /// Serializes the footer (40 bytes).
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[..16].copy_from_slice(&self.meta.encode());
        buf[16..32].copy_from_slice(&self.index.encode());
        buf[32..].copy_from_slice(&TABLE_MAGIC.to_le_bytes());
        buf
    }

    /// Deserializes and validates a footer read from the end of a table.
    pub fn decode(data: &[u8]) -> Result<Self, TableError> {
        if data.len() != FOOTER_SIZE {
            return Err(TableError::Corruption(format!(
                "footer must be {FOOTER_SIZE} bytes, got {}",
                data.len()
            )));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&data[32..40]);
        let magic = u64::from_le_bytes(word);
        if magic != TABLE_MAGIC {
            return Err(TableError::Corruption(format!(
                "bad footer magic 0x{magic:016x}"
            )));
        }
        Ok(Self {
            meta: BlockHandle::decode(&data[..16])?,
            index: BlockHandle::decode(&data[16..32])?,
        })
    }
}

/// Index-block target size for a given data-block size.
///
/// Large enough to hold every separator of a full table, bounded so a
/// misconfigured block size cannot balloon it.
pub fn index_block_target(data_block_size: usize) -> usize {
    (4 * data_block_size).clamp(64 * 1024, 2 * 1024 * 1024)
}
