//! Versioned file catalog.
//!
//! A **version** is an immutable snapshot of which table files belong to
//! which levels. Readers clone out an `Arc<Version>` and can keep probing
//! it while the version set installs newer versions behind their back; a
//! table file is only deleted once no live version references it.
//!
//! # Level invariants
//!
//! - **L0** files may overlap in key range (each is one flushed memtable);
//!   lookups probe them newest-first.
//! - **Lk, k ≥ 1** files are pairwise disjoint and kept sorted by smallest
//!   key, so a point lookup binary-searches for its unique candidate.
//!
//! # Sub-modules
//!
//! - [`edit`] — deltas between versions, as persisted in the manifest.
//! - [`set`] — the version set: manifest, file-number allocation,
//!   `log_and_apply`, recovery, and safe file deletion.
//! - [`files`] — database file naming.
//! - [`provider`] — shared cache of open table readers.

pub mod edit;
pub mod files;
pub mod provider;
pub mod set;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::table::TableError;
use crate::wal::WalError;

use provider::TableProvider;

/// Default number of levels in the tree.
pub const DEFAULT_MAX_LEVELS: usize = 7;

/// Errors from the version / manifest subsystem.
#[derive(Debug, Error)]
pub enum VersionError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid manifest contents.
    #[error("corrupt manifest: {0}")]
    Corruption(String),

    /// Table open/read failure while serving a lookup.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// WAL layer failure during recovery plumbing.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Caller asked for a level outside the configured range.
    #[error("invalid level {0}")]
    InvalidLevel(usize),
}

/// Immutable metadata of one table file.
///
/// Everything is fixed at construction except `allowed_seeks`, an atomic
/// budget of unrewarded probes decremented by reads. A future strategy may
/// use its exhaustion as a compaction signal.
#[derive(Debug)]
pub struct FileMeta {
    /// Unique, monotonically allocated file number.
    pub number: u64,
    /// File size in bytes.
    pub size: u64,
    /// Smallest user key stored in the file.
    pub smallest: Vec<u8>,
    /// Largest user key stored in the file.
    pub largest: Vec<u8>,
    /// Remaining probe budget before the file becomes a seek-compaction
    /// candidate.
    pub allowed_seeks: AtomicI64,
}

impl FileMeta {
    /// Creates metadata for a freshly written table.
    pub fn new(number: u64, size: u64, smallest: Vec<u8>, largest: Vec<u8>) -> Self {
        // One seek per 16 KiB of file, floored so tiny files are not
        // recycled immediately.
        let allowed_seeks = ((size / (16 * 1024)) as i64).max(100);
        Self {
            number,
            size,
            smallest,
            largest,
            allowed_seeks: AtomicI64::new(allowed_seeks),
        }
    }

    /// True when the file's key range contains `user_key`.
    pub fn contains(&self, user_key: &[u8]) -> bool {
        self.smallest.as_slice() <= user_key && user_key <= self.largest.as_slice()
    }

    /// True when the file's range intersects `[begin, end]`.
    pub fn overlaps(&self, begin: &[u8], end: &[u8]) -> bool {
        self.smallest.as_slice() <= end && begin <= self.largest.as_slice()
    }

    fn charge_seek(&self) {
        self.allowed_seeks.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Clone for FileMeta {
    fn clone(&self) -> Self {
        Self {
            number: self.number,
            size: self.size,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
            allowed_seeks: AtomicI64::new(self.allowed_seeks.load(Ordering::Relaxed)),
        }
    }
}

impl PartialEq for FileMeta {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}
impl Eq for FileMeta {}

/// Outcome of a point lookup against a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionGet {
    /// Newest stored record is a live value.
    Found(Vec<u8>),
    /// Newest stored record is a tombstone.
    Tombstone,
    /// No level stores the key.
    NotFound,
}

/// Immutable snapshot of the leveled file layout.
#[derive(Debug)]
pub struct Version {
    /// `levels[k]` is the ordered file list of level k.
    levels: Vec<Vec<Arc<FileMeta>>>,
    /// Snapshot identity, for logs and diagnostics.
    id: u64,
}

impl Version {
    /// An empty version with `max_levels` levels.
    pub fn empty(max_levels: usize, id: u64) -> Self {
        Self {
            levels: vec![Vec::new(); max_levels],
            id,
        }
    }

    /// Snapshot identity.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Files of one level, in level order.
    pub fn files(&self, level: usize) -> &[Arc<FileMeta>] {
        &self.levels[level]
    }

    /// Total bytes stored in one level.
    pub fn level_size(&self, level: usize) -> u64 {
        self.levels[level].iter().map(|f| f.size).sum()
    }

    /// Adds a file during version building. L0 appends; deeper levels
    /// insert at the position keyed by smallest key (files are disjoint by
    /// precondition).
    pub fn add_file(&mut self, level: usize, file: Arc<FileMeta>) {
        if level == 0 {
            self.levels[0].push(file);
        } else {
            let at = self.levels[level]
                .partition_point(|f| f.smallest.as_slice() < file.smallest.as_slice());
            self.levels[level].insert(at, file);
        }
    }

    /// Point lookup across all levels, newest layer first.
    pub fn get(
        &self,
        user_key: &[u8],
        provider: &TableProvider,
    ) -> Result<VersionGet, VersionError> {
        // L0 may overlap: probe every containing file, newest (highest
        // file number) first.
        let mut l0: Vec<&Arc<FileMeta>> = self.levels[0]
            .iter()
            .filter(|f| f.contains(user_key))
            .collect();
        l0.sort_by(|a, b| b.number.cmp(&a.number));
        for file in l0 {
            match self.probe_file(file, user_key, provider)? {
                VersionGet::NotFound => file.charge_seek(),
                hit => return Ok(hit),
            }
        }

        // Deeper levels are disjoint: at most one candidate per level.
        for level in 1..self.levels.len() {
            let files = &self.levels[level];
            let idx = files.partition_point(|f| f.largest.as_slice() < user_key);
            if idx >= files.len() || !files[idx].contains(user_key) {
                continue;
            }
            match self.probe_file(&files[idx], user_key, provider)? {
                VersionGet::NotFound => files[idx].charge_seek(),
                hit => return Ok(hit),
            }
        }

        Ok(VersionGet::NotFound)
    }

    fn probe_file(
        &self,
        file: &Arc<FileMeta>,
        user_key: &[u8],
        provider: &TableProvider,
    ) -> Result<VersionGet, VersionError> {
        let table = provider.table(file.number, file.size)?;
        trace!(
            version = self.id,
            file = file.number,
            "probing table for point lookup"
        );
        match table.get(user_key)? {
            Some(payload) if payload.is_empty() => Ok(VersionGet::Tombstone),
            Some(payload) => Ok(VersionGet::Found(payload)),
            None => Ok(VersionGet::NotFound),
        }
    }

    /// Files of `level` whose ranges intersect `[begin, end]`.
    pub fn overlapping_files(
        &self,
        level: usize,
        begin: &[u8],
        end: &[u8],
    ) -> Vec<Arc<FileMeta>> {
        self.levels[level]
            .iter()
            .filter(|f| f.overlaps(begin, end))
            .cloned()
            .collect()
    }

    /// Every file number referenced by this version.
    pub fn file_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.levels
            .iter()
            .flat_map(|files| files.iter().map(|f| f.number))
    }

    /// Debug/test helper: asserts the level invariants hold.
    #[cfg(test)]
    pub fn check_invariants(&self) {
        for (level, files) in self.levels.iter().enumerate().skip(1) {
            for pair in files.windows(2) {
                assert!(
                    pair[0].smallest <= pair[1].smallest,
                    "level {level} files not sorted by smallest key"
                );
                assert!(
                    pair[0].largest < pair[1].smallest,
                    "level {level} files overlap"
                );
            }
        }
    }
}
