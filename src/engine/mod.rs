//! # Storage engine facade
//!
//! [`Db`] is the public face of the engine: open, read, write, iterate,
//! flush, compact, close. Everything below it — WAL, memtables, tables,
//! versions, compaction — is orchestrated from here.
//!
//! ## Write path
//!
//! A write is serialized on a per-engine write mutex: the batch is
//! assigned a contiguous sequence range, appended to the WAL (flushed,
//! and fsynced when [`Options::sync_wal`] is set), then applied to the
//! active memtable operation by operation. When the memtable exceeds
//! [`Options::memtable_size`], the engine **switches**: any previous
//! immutable memtable is flushed synchronously, a fresh WAL is opened,
//! the active memtable becomes immutable, and a background flush is
//! scheduled.
//!
//! ## Read path
//!
//! `get` probes active memtable → immutable memtable → the current
//! version (L0 newest-first, then one candidate per deeper level). The
//! version is pinned by an `Arc` for the duration of the probe.
//!
//! ## Background work
//!
//! One worker thread consumes flush/compaction jobs from a bounded
//! queue. Each maintenance pass flushes the immutable memtable if one
//! exists, then runs compaction rounds until the strategy is satisfied.
//! `close` stops the worker cooperatively with a five-second deadline.
//!
//! ## Durability
//!
//! An acknowledged write is durable once its WAL record is fsynced (the
//! default) or once the next explicit [`Db::flush`] completes. Crash
//! recovery replays every log at or above the manifest's log number, so
//! the reopened engine sees exactly the acknowledged writes.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{BlockCache, ShardedBlockCache};
use crate::compaction::leveled::LeveledStrategy;
use crate::compaction::worker::BackgroundWorker;
use crate::compaction::{execute_task, CompactionError, CompactionStrategy, CompactionTask};
use crate::iterator::{level_tag, MemtableSource, MergeSource, MergingIterator};
use crate::key::{self, KeyError, ValueKind};
use crate::memtable::{Memtable, MemtableGet};
use crate::table::{TableBuilder, TableError, TableIter};
use crate::version::edit::VersionEdit;
use crate::version::provider::TableProvider;
use crate::version::set::VersionSet;
use crate::version::{files, FileMeta, Version, VersionError, VersionGet, DEFAULT_MAX_LEVELS};
use crate::wal::{self, BatchOp, WalError, WalWriter, WriteBatch, MAX_RECORD_SIZE};

/// How long `close` waits for the background worker.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Pending-job capacity of the background queue.
const BACKGROUND_QUEUE_DEPTH: usize = 8;

/// Errors surfaced by the engine facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WAL failure.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    /// Table failure.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// Catalog / manifest failure.
    #[error("version error: {0}")]
    Version(#[from] VersionError),

    /// Compaction failure.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Rejected input; no state was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine is closed (or was never fully opened).
    #[error("engine is closed")]
    Closed,
}

impl From<KeyError> for EngineError {
    fn from(e: KeyError) -> Self {
        EngineError::InvalidArgument(e.to_string())
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the database directory when it does not exist.
    pub create_if_missing: bool,
    /// Number of levels in the tree.
    pub max_levels: usize,
    /// Memtable size (bytes) that triggers a switch.
    pub memtable_size: usize,
    /// Block-cache capacity in bytes; 0 disables the cache.
    pub cache_size: usize,
    /// Target data-block size inside tables.
    pub block_size: usize,
    /// Fsync the WAL on every write (durability over latency).
    pub sync_wal: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_levels: DEFAULT_MAX_LEVELS,
            memtable_size: 4 * 1024 * 1024,
            cache_size: 8 * 1024 * 1024,
            block_size: crate::table::DEFAULT_BLOCK_SIZE,
            sync_wal: true,
        }
    }
}

/// Point-in-time engine statistics.
#[derive(Debug, Clone)]
pub struct DbStats {
    /// Approximate bytes in the active memtable.
    pub memtable_bytes: usize,
    /// Whether an immutable memtable is awaiting flush.
    pub immutable_pending: bool,
    /// File count per level.
    pub level_files: Vec<usize>,
    /// Byte total per level.
    pub level_bytes: Vec<u64>,
}

/// State owned by the serialized write path and shared with readers.
struct WriteState {
    wal: WalWriter,
    wal_number: u64,
    active: Arc<Memtable>,
    immutable: Option<Arc<Memtable>>,
}

struct DbShared {
    options: Options,
    dir: PathBuf,
    version_set: VersionSet,
    strategy: Arc<dyn CompactionStrategy>,
    /// Serializes writers across WAL append + memtable apply + switch.
    write_mutex: Mutex<()>,
    /// Guards reader-visible handles; held only briefly.
    state: Mutex<WriteState>,
    /// Serializes flushes (background vs. synchronous).
    flush_lock: Mutex<()>,
    /// Serializes compaction pick + execute + install.
    compaction_lock: Mutex<()>,
    closed: AtomicBool,
}

/// An embedded ordered key-value store.
pub struct Db {
    shared: Arc<DbShared>,
    worker: Mutex<Option<BackgroundWorker>>,
}

impl Db {
    /// Opens (or creates) a database rooted at `path`.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self, EngineError> {
        let dir = path.as_ref().to_path_buf();
        if options.max_levels < 2 {
            return Err(EngineError::InvalidArgument(
                "max_levels must be at least 2".into(),
            ));
        }
        if !dir.exists() {
            if !options.create_if_missing {
                return Err(EngineError::InvalidArgument(format!(
                    "database directory {} does not exist",
                    dir.display()
                )));
            }
            fs::create_dir_all(&dir)?;
        }

        let cache: Option<Arc<dyn BlockCache>> = if options.cache_size > 0 {
            Some(Arc::new(ShardedBlockCache::new(options.cache_size)))
        } else {
            None
        };
        let provider = Arc::new(TableProvider::new(&dir, cache));
        let version_set = VersionSet::open(&dir, options.max_levels, provider)?;

        // Replay every log at or above the durable horizon, oldest first.
        let active = Arc::new(Memtable::new());
        let mut log_numbers: Vec<u64> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(files::FileKind::Log(n)) = files::parse_file_name(name) {
                    if n >= version_set.log_number() {
                        log_numbers.push(n);
                    }
                    version_set.mark_file_number_used(n);
                } else if let Some(files::FileKind::Table(n)) = files::parse_file_name(name) {
                    version_set.mark_file_number_used(n);
                }
            }
        }
        log_numbers.sort_unstable();
        let mut max_sequence = version_set.last_sequence();
        for number in &log_numbers {
            let log_path = files::log_file_path(&dir, *number);
            let (batches, stats) = wal::recover(&log_path)?;
            if stats.records_skipped > 0 {
                warn!(
                    log = number,
                    skipped = stats.records_skipped,
                    "corrupt records skipped during WAL recovery"
                );
            }
            for (start_sequence, batch) in batches {
                apply_batch(&active, &batch, start_sequence);
                max_sequence = max_sequence.max(start_sequence + batch.len() as u64 - 1);
            }
        }
        version_set.ensure_sequence(max_sequence);

        // Recovered entries stay durable through the old logs until the
        // next flush advances the log number; new writes get a fresh WAL.
        let wal_number = version_set.new_file_number();
        let wal = WalWriter::create(files::log_file_path(&dir, wal_number))?;

        let shared = Arc::new(DbShared {
            options,
            dir,
            version_set,
            strategy: Arc::new(LeveledStrategy::new()),
            write_mutex: Mutex::new(()),
            state: Mutex::new(WriteState {
                wal,
                wal_number,
                active,
                immutable: None,
            }),
            flush_lock: Mutex::new(()),
            compaction_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        });

        // Drop anything the recovered catalog does not reference.
        shared.version_set.remove_obsolete_files()?;

        let worker = BackgroundWorker::spawn(BACKGROUND_QUEUE_DEPTH)?;
        let db = Self {
            shared,
            worker: Mutex::new(Some(worker)),
        };
        db.schedule_maintenance();

        info!(
            dir = %db.shared.dir.display(),
            recovered_logs = log_numbers.len(),
            last_sequence = db.shared.version_set.last_sequence(),
            "database opened"
        );
        Ok(db)
    }

    /// Stores `value` under `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Deletes `key`.
    pub fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    /// Commits `batch` atomically.
    pub fn write(&self, batch: WriteBatch) -> Result<(), EngineError> {
        self.check_open()?;
        validate_batch(&batch)?;
        if batch.is_empty() {
            return Ok(());
        }

        let shared = &self.shared;
        let _writer = lock(&shared.write_mutex);

        let start_sequence = shared.version_set.allocate_sequences(batch.len() as u64);

        let needs_switch = {
            let mut state = lock(&shared.state);
            state.wal.append(&batch, start_sequence)?;
            state.wal.flush()?;
            if shared.options.sync_wal {
                state.wal.sync()?;
            }
            apply_batch(&state.active, &batch, start_sequence);
            state.active.exceeds(shared.options.memtable_size)
        };

        if needs_switch {
            self.switch_memtable()?;
        }
        Ok(())
    }

    /// Looks up `key`, returning the newest visible value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.check_open()?;
        key::validate_user_key(key)?;

        let (active, immutable) = {
            let state = lock(&self.shared.state);
            (state.active.clone(), state.immutable.clone())
        };

        match active.get(key) {
            MemtableGet::Value(v) => return Ok(Some(v)),
            MemtableGet::Tombstone => return Ok(None),
            MemtableGet::Missing => {}
        }
        if let Some(immutable) = immutable {
            match immutable.get(key) {
                MemtableGet::Value(v) => return Ok(Some(v)),
                MemtableGet::Tombstone => return Ok(None),
                MemtableGet::Missing => {}
            }
        }

        let version = self.shared.version_set.current();
        match version.get(key, self.shared.version_set.provider())? {
            VersionGet::Found(v) => Ok(Some(v)),
            VersionGet::Tombstone | VersionGet::NotFound => Ok(None),
        }
    }

    /// Opens a merged iterator over the whole store. The iterator pins
    /// the current version (and both memtables) until dropped.
    pub fn iter(&self) -> Result<DbIterator, EngineError> {
        self.check_open()?;

        let (active, immutable) = {
            let state = lock(&self.shared.state);
            (state.active.clone(), state.immutable.clone())
        };
        let version = self.shared.version_set.current();
        let provider = self.shared.version_set.provider();
        let max_levels = self.shared.options.max_levels;

        let mut sources: Vec<(u64, Box<dyn MergeSource>)> = Vec::new();
        sources.push((u64::MAX, Box::new(MemtableSource::new(active))));
        if let Some(immutable) = immutable {
            sources.push((u64::MAX - 1, Box::new(MemtableSource::new(immutable))));
        }
        for level in 0..version.num_levels() {
            for file in version.files(level) {
                let reader = provider.table(file.number, file.size)?;
                sources.push((
                    level_tag(max_levels, level, file.number),
                    Box::new(TableIter::new(reader)?),
                ));
            }
        }

        Ok(DbIterator {
            merger: MergingIterator::new(sources)?,
            _version: version,
        })
    }

    /// Forces the active memtable to disk: switch, then flush.
    pub fn flush(&self) -> Result<(), EngineError> {
        self.check_open()?;
        let _writer = lock(&self.shared.write_mutex);
        let active_empty = lock(&self.shared.state).active.is_empty();
        if !active_empty {
            self.switch_memtable()?;
        }
        flush_immutable(&self.shared)?;
        Ok(())
    }

    /// Synchronously compacts every file overlapping `[begin, end]`, level
    /// by level, pushing the data one level down each round.
    pub fn compact_range(&self, begin: &[u8], end: &[u8]) -> Result<(), EngineError> {
        self.check_open()?;
        if begin > end {
            return Err(EngineError::InvalidArgument(
                "compact_range bounds are reversed".into(),
            ));
        }

        let shared = &self.shared;
        let _compaction = lock(&shared.compaction_lock);
        for level in 0..shared.options.max_levels - 1 {
            let version = shared.version_set.current();
            let mut inputs = version.overlapping_files(level, begin, end);
            if inputs.is_empty() {
                continue;
            }
            // L0 files overlap each other; pulling one down while an
            // older sibling still covers its keys would invert read
            // precedence. Expand to the transitive overlap closure.
            if level == 0 {
                loop {
                    let lo = inputs.iter().map(|f| f.smallest.clone()).min();
                    let hi = inputs.iter().map(|f| f.largest.clone()).max();
                    let (Some(lo), Some(hi)) = (lo, hi) else { break };
                    let expanded = version.overlapping_files(0, &lo, &hi);
                    if expanded.len() == inputs.len() {
                        break;
                    }
                    inputs = expanded;
                }
            }
            let smallest = inputs
                .iter()
                .map(|f| f.smallest.clone())
                .min()
                .unwrap_or_default();
            let largest = inputs
                .iter()
                .map(|f| f.largest.clone())
                .max()
                .unwrap_or_default();
            let overlaps = version.overlapping_files(level + 1, &smallest, &largest);
            let task = CompactionTask {
                level,
                inputs,
                overlaps,
                output_level: level + 1,
                version,
            };
            execute_task(&task, &shared.version_set, shared.options.block_size)?;
            shared.version_set.remove_obsolete_files()?;
        }
        Ok(())
    }

    /// Runs one compaction round on the calling thread if the strategy
    /// wants one. Returns whether a task ran.
    pub fn compact_now(&self) -> Result<bool, EngineError> {
        self.check_open()?;
        Ok(run_one_compaction(&self.shared)?)
    }

    /// Pauses background job consumption.
    pub fn pause_background_work(&self) {
        if let Some(worker) = lock(&self.worker).as_ref() {
            worker.pause();
        }
    }

    /// Resumes background job consumption.
    pub fn resume_background_work(&self) {
        if let Some(worker) = lock(&self.worker).as_ref() {
            worker.resume();
        }
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> Result<DbStats, EngineError> {
        self.check_open()?;
        let (memtable_bytes, immutable_pending) = {
            let state = lock(&self.shared.state);
            (state.active.approximate_size(), state.immutable.is_some())
        };
        let version = self.shared.version_set.current();
        let level_files = (0..version.num_levels())
            .map(|l| version.files(l).len())
            .collect();
        let level_bytes = (0..version.num_levels())
            .map(|l| version.level_size(l))
            .collect();
        Ok(DbStats {
            memtable_bytes,
            immutable_pending,
            level_files,
            level_bytes,
        })
    }

    /// Gracefully shuts the engine down: stop the worker, flush the
    /// immutable memtable, sync the WAL. Further calls return
    /// [`EngineError::Closed`].
    pub fn close(&self) -> Result<(), EngineError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }

        if let Some(mut worker) = lock(&self.worker).take() {
            worker.shutdown(SHUTDOWN_DEADLINE);
        }

        flush_immutable(&self.shared)?;
        {
            let mut state = lock(&self.shared.state);
            state.wal.sync()?;
        }
        self.shared.version_set.remove_obsolete_files()?;
        info!(dir = %self.shared.dir.display(), "database closed");
        Ok(())
    }

    /// Recursively deletes the database at `path`.
    ///
    /// Refuses to touch a directory that contains no recognizable
    /// database files (a safety net against deleting the wrong path).
    pub fn destroy(path: impl AsRef<Path>) -> Result<(), EngineError> {
        let dir = path.as_ref();
        if !dir.exists() {
            return Ok(());
        }
        let mut recognized = false;
        let mut any = false;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            any = true;
            if let Some(name) = entry.file_name().to_str() {
                if files::parse_file_name(name).is_some() {
                    recognized = true;
                }
            }
        }
        if any && !recognized {
            return Err(EngineError::InvalidArgument(format!(
                "{} does not look like a database directory",
                dir.display()
            )));
        }
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn check_open(&self) -> Result<(), EngineError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    /// Seals the active memtable and opens a fresh WAL. Caller must hold
    /// the write mutex.
    fn switch_memtable(&self) -> Result<(), EngineError> {
        let shared = &self.shared;

        // A leftover immutable memtable is flushed synchronously first.
        flush_immutable(shared)?;

        let new_number = shared.version_set.new_file_number();
        let new_wal = WalWriter::create(files::log_file_path(&shared.dir, new_number))?;

        {
            let mut state = lock(&shared.state);
            let old_active = std::mem::replace(&mut state.active, Arc::new(Memtable::new()));
            state.immutable = Some(old_active);
            // The old writer syncs on drop; the file stays on disk until
            // the flush advances the log number.
            state.wal = new_wal;
            state.wal_number = new_number;
        }
        debug!(wal = new_number, "memtable switched");

        self.schedule_maintenance();
        Ok(())
    }

    /// Queues a background maintenance pass (flush + compaction rounds).
    /// A full queue is fine — an equivalent pass is already pending.
    fn schedule_maintenance(&self) {
        if let Some(worker) = lock(&self.worker).as_ref() {
            let shared = Arc::clone(&self.shared);
            let _ = worker.submit(Box::new(move || background_maintenance(&shared)));
        }
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if !self.shared.closed.load(Ordering::SeqCst) {
            if let Err(e) = self.close() {
                warn!(error = %e, "close failed during drop");
            }
        }
    }
}

/// Iterator over the merged, tombstone-filtered contents of the store.
pub struct DbIterator {
    merger: MergingIterator,
    /// Pins the version (and through it every table file) while open.
    _version: Arc<Version>,
}

impl DbIterator {
    /// Repositions at the first key ≥ `target`.
    pub fn seek(&mut self, target: &[u8]) -> Result<(), EngineError> {
        self.merger.seek(target)?;
        Ok(())
    }

    /// Repositions at the first key in the store.
    pub fn seek_to_first(&mut self) -> Result<(), EngineError> {
        self.merger.seek_to_first()?;
        Ok(())
    }

    /// Next live `(key, value)` pair; tombstones are skipped.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, EngineError> {
        while let Some((key, payload)) = self.merger.next()? {
            if payload.is_empty() {
                continue; // tombstone
            }
            return Ok(Some((key, payload)));
        }
        Ok(None)
    }
}

// ------------------------------------------------------------------------------------------------
// Free helpers (shared with background jobs)
// ------------------------------------------------------------------------------------------------

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn validate_batch(batch: &WriteBatch) -> Result<(), EngineError> {
    if batch.encoded_len() > MAX_RECORD_SIZE {
        return Err(EngineError::InvalidArgument(format!(
            "batch of {} bytes exceeds the {MAX_RECORD_SIZE}-byte record limit",
            batch.encoded_len()
        )));
    }
    for op in batch.iter() {
        key::validate_user_key(op.key())?;
        if let BatchOp::Put { value, .. } = op {
            if value.is_empty() {
                return Err(EngineError::InvalidArgument(
                    "empty values are reserved for tombstones".into(),
                ));
            }
        }
    }
    Ok(())
}

fn apply_batch(memtable: &Memtable, batch: &WriteBatch, start_sequence: u64) {
    for (offset, op) in batch.iter().enumerate() {
        let sequence = start_sequence + offset as u64;
        match op {
            BatchOp::Put { key, value } => {
                memtable.put(key, value, sequence, ValueKind::Value);
            }
            BatchOp::Delete { key } => {
                memtable.put(key, &[], sequence, ValueKind::Deletion);
            }
        }
    }
}

/// Flushes the immutable memtable (if any) to a new L0 table and advances
/// the durable log horizon. Serialized by the flush lock.
fn flush_immutable(shared: &DbShared) -> Result<bool, EngineError> {
    let _flush = lock(&shared.flush_lock);

    let (memtable, active_wal_number) = {
        let state = lock(&shared.state);
        let Some(immutable) = state.immutable.clone() else {
            return Ok(false);
        };
        (immutable, state.wal_number)
    };

    let mut edit = VersionEdit::new();
    if let Some(meta) = build_l0_table(shared, &memtable)? {
        edit.add_file(0, Arc::new(meta));
    }
    // Everything up to the active WAL is now reflected in tables.
    edit.log_number = Some(active_wal_number);
    shared.version_set.log_and_apply(edit)?;

    {
        let mut state = lock(&shared.state);
        state.immutable = None;
    }
    // Old WALs (and any other unreferenced files) are now garbage.
    shared.version_set.remove_obsolete_files()?;
    Ok(true)
}

/// Writes the newest version of every user key in `memtable` to a fresh
/// table. Tombstones are written as empty payloads so they keep shadowing
/// older levels. Returns `None` when the memtable held nothing.
fn build_l0_table(
    shared: &DbShared,
    memtable: &Memtable,
) -> Result<Option<FileMeta>, EngineError> {
    if memtable.is_empty() {
        return Ok(None);
    }

    let number = shared.version_set.new_file_number();
    let path = files::table_file_path(&shared.dir, number);
    let mut builder = TableBuilder::new(&path, shared.options.block_size)?;

    let mut last_user_key: Option<Vec<u8>> = None;
    for (internal_key, payload) in memtable.iter() {
        let user_key = key::user_key(&internal_key);
        if last_user_key.as_deref() == Some(user_key) {
            continue; // older version of the same key
        }
        last_user_key = Some(user_key.to_vec());
        builder.add(user_key, &payload)?;
    }

    let built = builder.finish()?;
    let (Some(smallest), Some(largest)) = (built.smallest, built.largest) else {
        return Ok(None);
    };
    info!(
        file = number,
        entries = built.num_entries,
        bytes = built.file_size,
        "memtable flushed to L0"
    );
    Ok(Some(FileMeta::new(
        number,
        built.file_size,
        smallest,
        largest,
    )))
}

/// One background pass: flush if needed, then compact until satisfied.
fn background_maintenance(shared: &Arc<DbShared>) {
    if shared.closed.load(Ordering::SeqCst) {
        return;
    }
    if let Err(e) = flush_immutable(shared) {
        warn!(error = %e, "background flush failed");
        return;
    }
    loop {
        if shared.closed.load(Ordering::SeqCst) {
            return;
        }
        match run_one_compaction(shared) {
            Ok(true) => continue,
            Ok(false) => return,
            Err(e) => {
                warn!(error = %e, "background compaction failed");
                return;
            }
        }
    }
}

/// Picks and executes one compaction task. Returns false when the
/// strategy has nothing to do.
fn run_one_compaction(shared: &DbShared) -> Result<bool, CompactionError> {
    let _compaction = lock(&shared.compaction_lock);
    let version = shared.version_set.current();
    if !shared.strategy.need_compaction(&version) {
        return Ok(false);
    }
    let Some(task) = shared.strategy.pick_compaction(version) else {
        return Ok(false);
    };
    execute_task(&task, &shared.version_set, shared.options.block_size)?;
    if let Err(e) = shared.version_set.remove_obsolete_files() {
        warn!(error = %e, "obsolete-file sweep failed after compaction");
    }
    Ok(true)
}
