//! Table reading: point lookups and scans over immutable table files.
//!
//! A [`TableReader`] memory-maps the file, validates the footer, and loads
//! the filter and index blocks up front. Data blocks are fetched through
//! the shared [`BlockCache`] keyed by `(file_number, offset, generation)`;
//! on a miss the block bytes are copied out of the map and inserted.
//!
//! Point lookup order: bloom filter rejection, then a binary search of the
//! index block for the data block whose range covers the target (index
//! entries hold the **last** key of their block), then a restart-array
//! binary search inside that block.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::trace;

use crate::cache::BlockCache;
use crate::filter::LoadedFilter;

use super::block::Block;
use super::{BlockHandle, Footer, TableError, FOOTER_SIZE};

/// Monotonic generation for cache keys: a re-opened table never collides
/// with stale cache entries from a previous reader of the same file.
static NEXT_CACHE_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Read-only handle to one table file.
pub struct TableReader {
    mmap: Mmap,
    path: PathBuf,
    file_number: u64,
    cache_generation: u64,
    cache: Option<Arc<dyn BlockCache>>,
    filter: LoadedFilter,
    index: Block,
    file_size: u64,
}

impl TableReader {
    /// Opens and validates the table at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        file_number: u64,
        cache: Option<Arc<dyn BlockCache>>,
    ) -> Result<Self, TableError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        if (file_size as usize) < FOOTER_SIZE {
            return Err(TableError::Corruption(format!(
                "table file of {file_size} bytes cannot hold a footer"
            )));
        }
        // Safety: tables are immutable once written; no live writer exists.
        let mmap = unsafe { Mmap::map(&file)? };

        let footer_offset = file_size as usize - FOOTER_SIZE;
        let footer = Footer::decode(&mmap[footer_offset..])?;
        footer.meta.check_bounds(footer_offset as u64)?;
        footer.index.check_bounds(footer_offset as u64)?;

        let meta_bytes =
            &mmap[footer.meta.offset as usize..(footer.meta.offset + footer.meta.size) as usize];
        let filter = LoadedFilter::from_meta_bytes(meta_bytes)?;

        let index_bytes = mmap
            [footer.index.offset as usize..(footer.index.offset + footer.index.size) as usize]
            .to_vec();
        let index = Block::decode(index_bytes)?;

        let reader = Self {
            mmap,
            path,
            file_number,
            cache_generation: NEXT_CACHE_GENERATION.fetch_add(1, Ordering::Relaxed),
            cache,
            filter,
            index,
            file_size,
        };
        trace!(
            path = %reader.path.display(),
            file_number,
            file_size,
            "table opened"
        );
        Ok(reader)
    }

    /// File number this reader serves.
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Fetches a data block, consulting the cache first.
    fn read_block(&self, handle: BlockHandle) -> Result<Block, TableError> {
        handle.check_bounds(self.file_size)?;
        let key = (self.file_number, handle.offset, self.cache_generation);

        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.get(&key) {
                return Block::decode(bytes.as_ref().clone());
            }
        }

        let bytes =
            self.mmap[handle.offset as usize..(handle.offset + handle.size) as usize].to_vec();
        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::new(bytes.clone()));
        }
        Block::decode(bytes)
    }

    /// Point lookup. `Ok(Some(payload))` returns the stored bytes — an
    /// empty payload is the tombstone representation; interpreting it is
    /// the caller's concern.
    pub fn get(&self, user_key: &[u8]) -> Result<Option<Vec<u8>>, TableError> {
        if !self.filter.may_contain(user_key) {
            return Ok(None);
        }

        // First index entry with last_key ≥ target names the only data
        // block that can contain the key.
        let mut index_iter = self.index.iter();
        if !index_iter.seek(user_key)? {
            return Ok(None);
        }
        let handle = BlockHandle::decode(index_iter.value())?;

        let block = self.read_block(handle)?;
        let mut block_iter = block.iter();
        if block_iter.seek(user_key)? && block_iter.key() == user_key {
            return Ok(Some(block_iter.value().to_vec()));
        }
        Ok(None)
    }
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("path", &self.path)
            .field("file_number", &self.file_number)
            .field("file_size", &self.file_size)
            .finish_non_exhaustive()
    }
}

/// Cursor over a whole table, chaining the index with per-block cursors.
///
/// Holds a shared handle to its reader, so it can outlive the borrow it
/// was created from (merging iterators own their sources). Each data
/// block is materialized when entered; blocks are bounded by the builder's
/// block size, so the resident footprint stays small.
pub struct TableIter {
    reader: Arc<TableReader>,
    /// `(last_key, handle)` of every data block, in file order.
    handles: Vec<(Vec<u8>, BlockHandle)>,
    next_block: usize,
    current: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl TableIter {
    /// Opens a cursor over `reader`, positioned before the first entry.
    pub fn new(reader: Arc<TableReader>) -> Result<Self, TableError> {
        let mut handles = Vec::new();
        let mut index_iter = reader.index.iter();
        while index_iter.advance()? {
            handles.push((
                index_iter.key().to_vec(),
                BlockHandle::decode(index_iter.value())?,
            ));
        }
        Ok(Self {
            reader,
            handles,
            next_block: 0,
            current: Vec::new().into_iter(),
        })
    }

    fn load_block(&mut self, block_index: usize) -> Result<(), TableError> {
        let block = self.reader.read_block(self.handles[block_index].1)?;
        let mut entries = Vec::new();
        let mut cursor = block.iter();
        while cursor.advance()? {
            entries.push((cursor.key().to_vec(), cursor.value().to_vec()));
        }
        self.current = entries.into_iter();
        self.next_block = block_index + 1;
        Ok(())
    }

    /// Repositions at the first entry with user key ≥ `target`.
    pub fn seek(&mut self, target: &[u8]) -> Result<(), TableError> {
        // First block whose last key is ≥ target can contain it.
        let block_index = self
            .handles
            .partition_point(|(last_key, _)| last_key.as_slice() < target);
        if block_index >= self.handles.len() {
            self.next_block = self.handles.len();
            self.current = Vec::new().into_iter();
            return Ok(());
        }
        self.load_block(block_index)?;
        // Drop entries before the target.
        let remaining: Vec<_> = self
            .current
            .by_ref()
            .skip_while(|(k, _)| k.as_slice() < target)
            .collect();
        self.current = remaining.into_iter();
        Ok(())
    }

    /// Rewinds to the first entry of the table.
    pub fn seek_to_first(&mut self) -> Result<(), TableError> {
        self.next_block = 0;
        self.current = Vec::new().into_iter();
        Ok(())
    }

    /// Next `(user_key, payload)` pair, or `None` at the end.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, TableError> {
        loop {
            if let Some(entry) = self.current.next() {
                return Ok(Some(entry));
            }
            if self.next_block >= self.handles.len() {
                return Ok(None);
            }
            let block_index = self.next_block;
            self.load_block(block_index)?;
        }
    }
}
