//! The version set: catalog authority for the whole engine.
//!
//! Owns the current [`Version`], the monotonic file-number allocator, the
//! last assigned sequence number, and the manifest. All mutation funnels
//! through [`VersionSet::log_and_apply`], which persists a
//! [`VersionEdit`] to the manifest (fsynced) *before* publishing the new
//! version, so the on-disk catalog is never behind the in-memory one.
//!
//! ## Recovery
//!
//! On open the newest `MANIFEST-NNNNNN` is replayed edit by edit. If the
//! manifest is unreadable or structurally corrupt, recovery falls back to
//! a directory scan: the next file number becomes one past the largest
//! numeric file name present, the sequence counter resets, and a fresh
//! manifest is seeded from an empty version (table files already on disk
//! are then re-discovered only through WAL replay and future flushes —
//! the scan never guesses level assignments).
//!
//! ## Safe deletion
//!
//! A table file is deleted only when (a) an installed edit removed it,
//! (b) it is not reintroduced by the same edit (trivial moves), and
//! (c) no live version still references it. Versions are tracked through
//! `Weak` handles, so a reader holding an `Arc<Version>` keeps every file
//! of that snapshot alive. A pending-deletion set prevents double deletes.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use super::edit::VersionEdit;
use super::files::{self, FileKind};
use super::provider::TableProvider;
use super::{Version, VersionError};

/// Comparator identity recorded in every manifest.
pub const COMPARATOR_NAME: &str = "stratumdb.bytewise";

/// Shared catalog handle.
pub struct VersionSet {
    dir: PathBuf,
    max_levels: usize,
    provider: Arc<TableProvider>,
    inner: Mutex<Inner>,
}

struct Inner {
    current: Arc<Version>,
    /// Every published version still possibly referenced by a reader.
    versions: Vec<Weak<Version>>,
    next_file_number: u64,
    last_sequence: u64,
    /// WAL file number the durable state covers; older logs are garbage.
    log_number: u64,
    manifest: ManifestWriter,
    manifest_number: u64,
    /// File numbers whose deletion has already been attempted.
    pending_deletions: HashSet<u64>,
    next_version_id: u64,
}

impl VersionSet {
    /// Opens the catalog in `dir`, recovering from the newest manifest or
    /// starting fresh (with directory-scan fallback on corruption).
    pub fn open(
        dir: impl AsRef<Path>,
        max_levels: usize,
        provider: Arc<TableProvider>,
    ) -> Result<Self, VersionError> {
        let dir = dir.as_ref().to_path_buf();

        let newest = newest_manifest(&dir)?;
        let max_manifest_number = newest.as_ref().map_or(0, |(n, _)| *n);
        let recovered = match newest {
            Some((number, path)) => match replay_manifest(&path, max_levels) {
                Ok(state) => {
                    info!(
                        manifest = number,
                        files = state.version.file_numbers().count(),
                        last_sequence = state.last_sequence,
                        "manifest recovered"
                    );
                    Some(state)
                }
                Err(e) => {
                    warn!(
                        manifest = number,
                        error = %e,
                        "manifest corrupt, falling back to directory scan"
                    );
                    None
                }
            },
            None => None,
        };

        let mut state = match recovered {
            Some(state) => state,
            None => fallback_state(&dir, max_levels)?,
        };

        // Seed a fresh manifest so subsequent edits land in a file whose
        // prefix is a complete snapshot. It must outnumber every existing
        // manifest (including a corrupt one) so the next open picks it.
        let manifest_number = state.next_file_number.max(max_manifest_number + 1);
        state.next_file_number = manifest_number + 1;
        let manifest_path = files::manifest_file_path(&dir, manifest_number);
        let mut manifest = ManifestWriter::create(&manifest_path)?;

        let mut snapshot = VersionEdit::new();
        snapshot.comparator_name = Some(COMPARATOR_NAME.to_string());
        snapshot.log_number = Some(state.log_number);
        snapshot.next_file_number = Some(state.next_file_number);
        snapshot.last_sequence = Some(state.last_sequence);
        for (level, files) in state.version.levels.iter().enumerate() {
            for file in files {
                snapshot.added.push((level, Arc::clone(file)));
            }
        }
        manifest.append(&snapshot)?;
        manifest.sync()?;

        let current = Arc::new(state.version);
        let inner = Inner {
            versions: vec![Arc::downgrade(&current)],
            current,
            next_file_number: state.next_file_number,
            last_sequence: state.last_sequence,
            log_number: state.log_number,
            manifest,
            manifest_number,
            pending_deletions: HashSet::new(),
            next_version_id: 1,
        };

        Ok(Self {
            dir,
            max_levels,
            provider,
            inner: Mutex::new(inner),
        })
    }

    /// Database directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Configured number of levels.
    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// The provider used to open this catalog's table files.
    pub fn provider(&self) -> &Arc<TableProvider> {
        &self.provider
    }

    /// Snapshot of the current version. The returned `Arc` keeps every
    /// file of the snapshot alive until dropped.
    pub fn current(&self) -> Arc<Version> {
        let inner = self.lock();
        Arc::clone(&inner.current)
    }

    /// Allocates one fresh file number.
    pub fn new_file_number(&self) -> u64 {
        let mut inner = self.lock();
        let n = inner.next_file_number;
        inner.next_file_number += 1;
        n
    }

    /// Bumps the allocator past an externally observed file number.
    pub fn mark_file_number_used(&self, number: u64) {
        let mut inner = self.lock();
        if inner.next_file_number <= number {
            inner.next_file_number = number + 1;
        }
    }

    /// Last sequence number assigned.
    pub fn last_sequence(&self) -> u64 {
        self.lock().last_sequence
    }

    /// Reserves `count` consecutive sequence numbers, returning the first.
    pub fn allocate_sequences(&self, count: u64) -> u64 {
        let mut inner = self.lock();
        let start = inner.last_sequence + 1;
        inner.last_sequence += count;
        start
    }

    /// Forces the sequence counter to at least `sequence` (WAL recovery).
    pub fn ensure_sequence(&self, sequence: u64) {
        let mut inner = self.lock();
        if inner.last_sequence < sequence {
            inner.last_sequence = sequence;
        }
    }

    /// WAL file number the durable state covers.
    pub fn log_number(&self) -> u64 {
        self.lock().log_number
    }

    /// Persists `edit` and publishes the resulting version.
    ///
    /// The only entry point that changes the current version. Ordering:
    /// build → manifest append + fsync → publish → delete newly obsolete
    /// files that no live version references.
    pub fn log_and_apply(&self, mut edit: VersionEdit) -> Result<Arc<Version>, VersionError> {
        let mut inner = self.lock();

        for (level, _) in edit.added.iter() {
            if *level >= self.max_levels {
                return Err(VersionError::InvalidLevel(*level));
            }
        }

        // Stamp catalog counters so any manifest prefix is self-contained.
        if edit.comparator_name.is_none() {
            edit.comparator_name = Some(COMPARATOR_NAME.to_string());
        }
        edit.next_file_number = Some(inner.next_file_number);
        edit.last_sequence = Some(inner.last_sequence);
        let new_log_number = edit.log_number;
        if edit.log_number.is_none() {
            edit.log_number = Some(inner.log_number);
        }

        // Build the successor version: removals first, then additions.
        let mut version = Version::empty(self.max_levels, inner.next_version_id);
        let removed: HashSet<(usize, u64)> = edit.deleted.iter().copied().collect();
        for (level, files) in inner.current.levels.iter().enumerate() {
            for file in files {
                if !removed.contains(&(level, file.number)) {
                    version.add_file(level, Arc::clone(file));
                }
            }
        }
        for (level, meta) in &edit.added {
            version.add_file(*level, Arc::clone(meta));
        }

        // Persist before publishing.
        inner.manifest.append(&edit)?;
        inner.manifest.sync()?;

        if let Some(n) = new_log_number {
            inner.log_number = inner.log_number.max(n);
        }
        inner.next_version_id += 1;

        let version = Arc::new(version);
        inner.versions.push(Arc::downgrade(&version));
        inner.current = Arc::clone(&version);
        debug!(
            version = version.id(),
            added = edit.added.len(),
            deleted = edit.deleted.len(),
            "version installed"
        );

        // Trivial-move exclusion: a file both removed and re-added in the
        // same edit must survive.
        let reintroduced: HashSet<u64> = edit.added.iter().map(|(_, m)| m.number).collect();
        let candidates: Vec<u64> = edit
            .deleted
            .iter()
            .map(|(_, n)| *n)
            .filter(|n| !reintroduced.contains(n))
            .collect();
        self.delete_unreferenced(&mut inner, candidates);

        Ok(version)
    }

    /// Every file number referenced by any still-live version.
    pub fn live_file_numbers(&self) -> HashSet<u64> {
        let mut inner = self.lock();
        Self::live_files_locked(&mut inner)
    }

    fn live_files_locked(inner: &mut Inner) -> HashSet<u64> {
        inner.versions.retain(|weak| weak.strong_count() > 0);
        let mut live = HashSet::new();
        for weak in &inner.versions {
            if let Some(version) = weak.upgrade() {
                live.extend(version.file_numbers());
            }
        }
        live.extend(inner.current.file_numbers());
        live
    }

    fn delete_unreferenced(&self, inner: &mut Inner, candidates: Vec<u64>) {
        if candidates.is_empty() {
            return;
        }
        let live = Self::live_files_locked(inner);
        for number in candidates {
            if live.contains(&number) || inner.pending_deletions.contains(&number) {
                continue;
            }
            let path = files::table_file_path(&self.dir, number);
            match fs::remove_file(&path) {
                Ok(()) => {
                    inner.pending_deletions.insert(number);
                    self.provider.evict(number);
                    debug!(file = number, "obsolete table deleted");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    inner.pending_deletions.insert(number);
                }
                Err(e) => {
                    warn!(file = number, error = %e, "failed to delete obsolete table");
                }
            }
        }
    }

    /// Sweeps the directory for files no live version (or the WAL horizon,
    /// or the active manifest) needs, and deletes them.
    pub fn remove_obsolete_files(&self) -> Result<(), VersionError> {
        let mut inner = self.lock();
        let live = Self::live_files_locked(&mut inner);

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let keep = match files::parse_file_name(name) {
                Some(FileKind::Table(n)) => live.contains(&n),
                Some(FileKind::Log(n)) => n >= inner.log_number,
                Some(FileKind::Manifest(n)) => n == inner.manifest_number,
                // Not one of ours; leave it alone.
                None => true,
            };
            if keep {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    if let Some(FileKind::Table(n)) = files::parse_file_name(name) {
                        inner.pending_deletions.insert(n);
                        self.provider.evict(n);
                    }
                    debug!(file = name, "obsolete file removed");
                }
                Err(e) => warn!(file = name, error = %e, "failed to remove obsolete file"),
            }
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ------------------------------------------------------------------------------------------------
// Manifest I/O
// ------------------------------------------------------------------------------------------------

struct ManifestWriter {
    file: File,
    path: PathBuf,
}

impl ManifestWriter {
    fn create(path: &Path) -> Result<Self, VersionError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        info!(path = %path.display(), "manifest created");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Appends one record: `len (4 LE) | tagged fields | 0x00`.
    fn append(&mut self, edit: &VersionEdit) -> Result<(), VersionError> {
        let payload = edit.encode();
        self.file
            .write_all(&(payload.len() as u32).to_le_bytes())?;
        self.file.write_all(&payload)?;
        self.file.write_all(&[0u8])?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), VersionError> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl Drop for ManifestWriter {
    fn drop(&mut self) {
        if let Err(e) = self.file.sync_all() {
            warn!(path = %self.path.display(), error = %e, "manifest sync failed on drop");
        }
    }
}

/// Parses every record of a manifest file, strictly.
pub(crate) fn read_manifest(path: &Path) -> Result<Vec<VersionEdit>, VersionError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let mut edits = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if pos + 4 > bytes.len() {
            return Err(VersionError::Corruption(
                "manifest ends inside a record length".into(),
            ));
        }
        let len = u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        pos += 4;
        if pos + len + 1 > bytes.len() {
            return Err(VersionError::Corruption(
                "manifest ends inside a record".into(),
            ));
        }
        let edit = VersionEdit::decode(&bytes[pos..pos + len])?;
        pos += len;
        if bytes[pos] != 0 {
            return Err(VersionError::Corruption(format!(
                "missing record terminator at offset {pos}"
            )));
        }
        pos += 1;
        edits.push(edit);
    }
    Ok(edits)
}

// ------------------------------------------------------------------------------------------------
// Recovery
// ------------------------------------------------------------------------------------------------

struct RecoveredState {
    version: Version,
    next_file_number: u64,
    last_sequence: u64,
    log_number: u64,
}

/// Finds the `MANIFEST-NNNNNN` with the largest number.
fn newest_manifest(dir: &Path) -> Result<Option<(u64, PathBuf)>, VersionError> {
    let mut newest: Option<(u64, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(FileKind::Manifest(number)) = files::parse_file_name(name) {
            if newest.as_ref().map_or(true, |(n, _)| *n < number) {
                newest = Some((number, entry.path()));
            }
        }
    }
    Ok(newest)
}

/// Replays a manifest into the catalog state it describes.
fn replay_manifest(path: &Path, max_levels: usize) -> Result<RecoveredState, VersionError> {
    let edits = read_manifest(path)?;
    if edits.is_empty() {
        return Err(VersionError::Corruption("manifest holds no records".into()));
    }

    let mut levels: Vec<Vec<Arc<super::FileMeta>>> = vec![Vec::new(); max_levels];
    let mut next_file_number = 1u64;
    let mut last_sequence = 0u64;
    let mut log_number = 0u64;

    for edit in edits {
        if let Some(name) = &edit.comparator_name {
            if name != COMPARATOR_NAME {
                return Err(VersionError::Corruption(format!(
                    "comparator mismatch: manifest says {name:?}"
                )));
            }
        }
        for (level, number) in &edit.deleted {
            if *level >= max_levels {
                return Err(VersionError::InvalidLevel(*level));
            }
            levels[*level].retain(|f| f.number != *number);
        }
        for (level, meta) in &edit.added {
            if *level >= max_levels {
                return Err(VersionError::InvalidLevel(*level));
            }
            levels[*level].push(Arc::clone(meta));
        }
        if let Some(n) = edit.next_file_number {
            next_file_number = next_file_number.max(n);
        }
        if let Some(n) = edit.last_sequence {
            last_sequence = last_sequence.max(n);
        }
        if let Some(n) = edit.log_number {
            log_number = log_number.max(n);
        }
    }

    let mut version = Version::empty(max_levels, 0);
    for (level, files) in levels.into_iter().enumerate() {
        for file in files {
            next_file_number = next_file_number.max(file.number + 1);
            version.add_file(level, file);
        }
    }

    Ok(RecoveredState {
        version,
        next_file_number,
        last_sequence,
        log_number,
    })
}

/// Directory-scan fallback: largest numeric file name + 1, empty version.
fn fallback_state(dir: &Path, max_levels: usize) -> Result<RecoveredState, VersionError> {
    let mut max_number = 0u64;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        match files::parse_file_name(name) {
            Some(FileKind::Table(n) | FileKind::Log(n)) => max_number = max_number.max(n),
            _ => {}
        }
    }
    info!(
        dir = %dir.display(),
        next_file_number = max_number + 1,
        "starting catalog from directory scan"
    );
    Ok(RecoveredState {
        version: Version::empty(max_levels, 0),
        next_file_number: max_number + 1,
        last_sequence: 0,
        log_number: 0,
    })
}
