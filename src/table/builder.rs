//! Streaming table construction.
//!
//! [`TableBuilder`] accepts strictly ascending `(user_key, value)` pairs
//! and writes the table layout described in the [module docs](super):
//! data blocks as they fill, then the filter meta block, the index block,
//! and the footer. An entry too large for the configured block size gets
//! a dedicated block (restart interval 1) rather than being rejected.
//!
//! An empty table is legal: it carries an empty meta block, an empty
//! index block, and a valid footer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::filter::BloomFilter;

use super::block::BlockBuilder;
use super::{index_block_target, BlockHandle, Footer, TableError, FILTER_FPR};

/// Everything the catalog needs to know about a finished table.
#[derive(Debug, Clone)]
pub struct BuiltTable {
    /// Total file size in bytes.
    pub file_size: u64,
    /// Number of entries written.
    pub num_entries: u64,
    /// Smallest user key, if any entry was written.
    pub smallest: Option<Vec<u8>>,
    /// Largest user key, if any entry was written.
    pub largest: Option<Vec<u8>>,
}

/// Writes one immutable table file.
pub struct TableBuilder {
    writer: BufWriter<File>,
    path: PathBuf,
    offset: u64,
    block_size: usize,
    data_block: BlockBuilder,
    /// `(last_key, handle)` per finished data block, in file order.
    index_entries: Vec<(Vec<u8>, BlockHandle)>,
    /// Keys accumulated for the filter, built at finish time when the
    /// exact count is known.
    filter_keys: Vec<Vec<u8>>,
    last_key: Vec<u8>,
    num_entries: u64,
    smallest: Option<Vec<u8>>,
}

impl TableBuilder {
    /// Creates the table file at `path` (failing if it already exists).
    pub fn new(path: impl AsRef<Path>, block_size: usize) -> Result<Self, TableError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            offset: 0,
            block_size,
            data_block: BlockBuilder::new(block_size),
            index_entries: Vec::new(),
            filter_keys: Vec::new(),
            last_key: Vec::new(),
            num_entries: 0,
            smallest: None,
        })
    }

    /// Appends one entry. Keys must be strictly ascending.
    pub fn add(&mut self, user_key: &[u8], value: &[u8]) -> Result<(), TableError> {
        if self.num_entries > 0 && user_key <= self.last_key.as_slice() {
            return Err(TableError::Corruption(format!(
                "table keys not strictly ascending: {:?} after {:?}",
                String::from_utf8_lossy(user_key),
                String::from_utf8_lossy(&self.last_key),
            )));
        }

        if !self.data_block.try_add(user_key, value)? {
            self.flush_data_block()?;
            if entry_overflows(self.block_size, user_key, value) {
                // Dedicated block: no prefix sharing, flushed immediately.
                let mut oversized = BlockBuilder::with_restart_interval(self.block_size, 1);
                oversized.force_add(user_key, value)?;
                let contents = oversized.finish();
                self.write_block_with_index(&contents, user_key)?;
            } else {
                // Freshly emptied block always accepts a regular entry.
                self.data_block.try_add(user_key, value)?;
            }
        }

        self.filter_keys.push(user_key.to_vec());
        if self.smallest.is_none() {
            self.smallest = Some(user_key.to_vec());
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(user_key);
        self.num_entries += 1;
        Ok(())
    }

    fn flush_data_block(&mut self) -> Result<(), TableError> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        let last_key = self.data_block.last_key().to_vec();
        let contents = self.data_block.finish();
        self.write_block_with_index(&contents, &last_key)
    }

    fn write_block_with_index(
        &mut self,
        contents: &[u8],
        last_key: &[u8],
    ) -> Result<(), TableError> {
        let handle = self.write_raw(contents)?;
        trace!(
            offset = handle.offset,
            size = handle.size,
            "data block written"
        );
        self.index_entries.push((last_key.to_vec(), handle));
        Ok(())
    }

    fn write_raw(&mut self, contents: &[u8]) -> Result<BlockHandle, TableError> {
        let handle = BlockHandle {
            offset: self.offset,
            size: contents.len() as u64,
        };
        self.writer.write_all(contents)?;
        self.offset += contents.len() as u64;
        Ok(handle)
    }

    /// Number of entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written plus the pending data block — the builder's size as
    /// seen by the compaction output-rolling check.
    pub fn estimated_size(&self) -> u64 {
        self.offset + self.data_block.size_estimate() as u64
    }

    /// Flushes everything, writes filter + index + footer, syncs, and
    /// returns the table's catalog metadata.
    pub fn finish(mut self) -> Result<BuiltTable, TableError> {
        self.flush_data_block()?;

        // Meta block: the serialized filter, empty when no keys were added.
        let meta_contents = if self.filter_keys.is_empty() {
            Vec::new()
        } else {
            let mut filter = BloomFilter::new(self.filter_keys.len(), FILTER_FPR);
            for key in &self.filter_keys {
                filter.insert(key);
            }
            filter.encode()
        };
        let meta_handle = self.write_raw(&meta_contents)?;

        // Index block: last key of each data block → its handle.
        let mut index_block =
            BlockBuilder::new(index_block_target(self.block_size));
        for (last_key, handle) in &self.index_entries {
            index_block.force_add(last_key, &handle.encode())?;
        }
        let index_contents = index_block.finish();
        let index_handle = self.write_raw(&index_contents)?;

        let footer = Footer {
            meta: meta_handle,
            index: index_handle,
        };
        self.writer.write_all(&footer.encode())?;
        self.offset += super::FOOTER_SIZE as u64;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        debug!(
            path = %self.path.display(),
            entries = self.num_entries,
            blocks = self.index_entries.len(),
            file_size = self.offset,
            "table finished"
        );

        Ok(BuiltTable {
            file_size: self.offset,
            num_entries: self.num_entries,
            smallest: self.smallest,
            largest: if self.num_entries > 0 {
                Some(self.last_key)
            } else {
                None
            },
        })
    }

    /// Abandons the build and removes the partial file. Used when a
    /// compaction fails mid-merge.
    pub fn abandon(self) -> Result<(), TableError> {
        let path = self.path.clone();
        drop(self.writer);
        std::fs::remove_file(&path)?;
        debug!(path = %path.display(), "partial table abandoned");
        Ok(())
    }
}

fn entry_overflows(block_size: usize, key: &[u8], value: &[u8]) -> bool {
    // Entry header + payload + one restart slot + restart count.
    12 + key.len() + value.len() + 8 > block_size
}
