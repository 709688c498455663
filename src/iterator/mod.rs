//! K-way merging iterator with newest-wins deduplication.
//!
//! Merges any number of sorted sources — table cursors, memtable cursors —
//! into one ascending stream of `(user_key, payload)` pairs. Among sources
//! holding the same user key, the one with the highest **tag** wins and
//! the rest are skipped.
//!
//! Tags encode recency. For a merge of sibling files (an L0 compaction,
//! the newest-wins test in every LSM paper) the tag is simply the file
//! number. When sources span levels, callers band the tags by level
//! (shallower level → higher band) because a trivially-moved file keeps
//! its old number while holding newer data than a later-numbered merge
//! output below it; raw file numbers would mis-order exactly that pair.
//!
//! The iterator is forward-only and non-restartable except via
//! [`MergingIterator::seek`] / [`seek_to_first`](MergingIterator::seek_to_first).


use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::key::{self, ValueKind};
use crate::memtable::Memtable;
use crate::table::{TableError, TableIter};

/// A sorted source of `(user_key, payload)` pairs.
///
/// Implementations must yield strictly ascending, duplicate-free user
/// keys. An empty payload is a tombstone; it flows through the merge
/// unchanged.
pub trait MergeSource {
    /// Repositions before the first entry with user key ≥ `target`.
    fn seek(&mut self, target: &[u8]) -> Result<(), TableError>;

    /// Repositions before the first entry.
    fn seek_to_first(&mut self) -> Result<(), TableError>;

    /// Returns the next entry, or `None` when exhausted.
    fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, TableError>;
}

struct HeapEntry {
    key: Vec<u8>,
    payload: Vec<u8>,
    tag: u64,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.tag == other.tag
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // (key ASC, tag DESC), reversed for the max-heap so the smallest
        // key (and among equals the newest source) pops first.
        self.key
            .cmp(&other.key)
            .then_with(|| other.tag.cmp(&self.tag))
            .reverse()
    }
}

/// Heap-based merge over tagged sources.
pub struct MergingIterator {
    sources: Vec<(u64, Box<dyn MergeSource>)>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergingIterator {
    /// Builds the iterator positioned at the global first entry.
    pub fn new(sources: Vec<(u64, Box<dyn MergeSource>)>) -> Result<Self, TableError> {
        let mut merger = Self {
            sources,
            heap: BinaryHeap::new(),
        };
        merger.seek_to_first()?;
        Ok(merger)
    }

    /// Repositions every source at its first entry and rebuilds the heap.
    pub fn seek_to_first(&mut self) -> Result<(), TableError> {
        self.heap.clear();
        for index in 0..self.sources.len() {
            self.sources[index].1.seek_to_first()?;
            self.push_next(index)?;
        }
        Ok(())
    }

    /// Repositions every source at `target` and rebuilds the heap.
    pub fn seek(&mut self, target: &[u8]) -> Result<(), TableError> {
        self.heap.clear();
        for index in 0..self.sources.len() {
            self.sources[index].1.seek(target)?;
            self.push_next(index)?;
        }
        Ok(())
    }

    fn push_next(&mut self, index: usize) -> Result<(), TableError> {
        let (tag, source) = &mut self.sources[index];
        if let Some((key, payload)) = source.next()? {
            self.heap.push(HeapEntry {
                key,
                payload,
                tag: *tag,
                source: index,
            });
        }
        Ok(())
    }

    /// Pops the next merged entry: smallest user key, newest source.
    /// Older duplicates of the same user key are consumed and dropped.
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, TableError> {
        let Some(winner) = self.heap.pop() else {
            return Ok(None);
        };
        self.push_next(winner.source)?;

        // Skip every older version of this user key across the sources.
        while self
            .heap
            .peek()
            .map_or(false, |top| top.key == winner.key)
        {
            if let Some(loser) = self.heap.pop() {
                self.push_next(loser.source)?;
            }
        }

        Ok(Some((winner.key, winner.payload)))
    }
}

impl MergeSource for TableIter {
    fn seek(&mut self, target: &[u8]) -> Result<(), TableError> {
        TableIter::seek(self, target)
    }

    fn seek_to_first(&mut self) -> Result<(), TableError> {
        TableIter::seek_to_first(self)
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, TableError> {
        TableIter::next(self)
    }
}

/// Merge source over a memtable: yields each user key's newest version
/// only, with tombstones as empty payloads.
///
/// Steps the skip list one lookup at a time instead of pinning its read
/// guard, so a long-lived engine iterator never blocks the writer.
pub struct MemtableSource {
    memtable: Arc<Memtable>,
    /// Lookup key of the next entry to visit.
    next_target: Vec<u8>,
}

impl MemtableSource {
    /// A source positioned before the memtable's first entry.
    pub fn new(memtable: Arc<Memtable>) -> Self {
        Self {
            memtable,
            next_target: Vec::new(),
        }
    }

    /// Smallest internal key strictly after every version of `user_key`.
    fn successor_target(user_key: &[u8]) -> Vec<u8> {
        let mut successor = user_key.to_vec();
        successor.push(0);
        key::lookup_key(&successor)
    }
}

impl MergeSource for MemtableSource {
    fn seek(&mut self, target: &[u8]) -> Result<(), TableError> {
        self.next_target = key::lookup_key(target);
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<(), TableError> {
        self.next_target = Vec::new();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, TableError> {
        let Some((internal_key, payload)) =
            self.memtable.find_greater_or_equal(&self.next_target)
        else {
            return Ok(None);
        };
        let (user_key, _, kind) = key::decode(&internal_key).map_err(|e| {
            TableError::Corruption(format!("undecodable memtable key: {e}"))
        })?;
        let user_key = user_key.to_vec();
        self.next_target = Self::successor_target(&user_key);
        let payload = match kind {
            ValueKind::Value => payload,
            ValueKind::Deletion => Vec::new(),
        };
        Ok(Some((user_key, payload)))
    }
}

/// Builds a level-banded tag: shallower levels outrank deeper ones, file
/// numbers break ties within a band.
///
/// The band occupies the high byte, which caps file numbers at 2^56 — far
/// beyond any allocator horizon.
pub fn level_tag(max_levels: usize, level: usize, file_number: u64) -> u64 {
    let band = (max_levels - level) as u64;
    (band << 56) | (file_number & ((1 << 56) - 1))
}
