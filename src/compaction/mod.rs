//! Leveled compaction.
//!
//! Compaction keeps the tree shallow: L0 accumulates whole memtable
//! flushes (overlapping ranges), deeper levels hold disjoint sorted runs
//! with exponentially growing byte budgets. When a level overflows, its
//! files are merged into the next level.
//!
//! ## Pieces
//!
//! - [`CompactionStrategy`] — decides *when* and *what*: one leveled
//!   implementation ships ([`leveled::LeveledStrategy`]).
//! - [`execute_task`] — does the work: either a **trivial move** (single
//!   input, nothing overlapping below — just a catalog edit) or a **merge**
//!   through the [merging iterator](crate::iterator), rolling output
//!   tables at [`MAX_OUTPUT_FILE_SIZE`].
//! - [`worker`] — the single background thread that runs flush and
//!   compaction jobs off a bounded queue.
//!
//! ## Tombstones
//!
//! A merge keeps only the newest version of each user key. A tombstone
//! (empty payload) is dropped when no level below the output can still
//! hold an older version of its key — always true at the bottom level.
//! Dropping it earlier would resurrect whatever the tombstone shadows.
//!
//! ## Failure
//!
//! If the merge fails mid-way, finished and partial outputs are removed
//! from disk, the inputs stay referenced by the current version, and no
//! edit is installed: the catalog is exactly as before.

pub mod leveled;
pub mod worker;


use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::iterator::{level_tag, MergeSource, MergingIterator};
use crate::table::{TableBuilder, TableError, TableIter};
use crate::version::edit::VersionEdit;
use crate::version::set::VersionSet;
use crate::version::{files, FileMeta, Version, VersionError};

/// L0 file count that triggers compaction.
pub const L0_COMPACTION_TRIGGER: usize = 4;

/// Merge outputs roll over to a new table past this size.
pub const MAX_OUTPUT_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Byte budget for level `level` (≥ 1): 10 MiB at L1, ×10 per level.
pub fn max_bytes_for_level(level: usize) -> u64 {
    let mut budget = 10 * 1024 * 1024u64;
    for _ in 1..level {
        budget = budget.saturating_mul(10);
    }
    budget
}

/// Errors from compaction execution.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Table build/read failure.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// Catalog failure while installing the result.
    #[error("version error: {0}")]
    Version(#[from] VersionError),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A unit of compaction work picked by a strategy.
pub struct CompactionTask {
    /// Level the inputs were taken from.
    pub level: usize,
    /// Input files at `level`.
    pub inputs: Vec<Arc<FileMeta>>,
    /// Overlapping files at `level + 1`, merged alongside the inputs.
    pub overlaps: Vec<Arc<FileMeta>>,
    /// Level the outputs land in (`level + 1`; L0 compacts into L1).
    pub output_level: usize,
    /// The version the task was picked from; also used to decide
    /// tombstone droppability against deeper levels.
    pub version: Arc<Version>,
}

impl CompactionTask {
    /// True when the task can be satisfied by a catalog-only level change.
    pub fn is_trivial_move(&self) -> bool {
        self.inputs.len() == 1 && self.overlaps.is_empty()
    }
}

/// Decides when compaction is needed and what to compact.
///
/// One concrete leveled implementation exists; the seam is a trait so a
/// different shape (tiered, FIFO) can slot in without touching the
/// executor.
pub trait CompactionStrategy: Send + Sync {
    /// True when `version` warrants background compaction.
    fn need_compaction(&self, version: &Version) -> bool;

    /// Picks the most urgent task, or `None` when nothing qualifies.
    fn pick_compaction(&self, version: Arc<Version>) -> Option<CompactionTask>;
}

/// Executes `task` and installs the resulting edit.
///
/// Returns the number of output files (0 for a trivial move).
pub fn execute_task(
    task: &CompactionTask,
    version_set: &VersionSet,
    block_size: usize,
) -> Result<usize, CompactionError> {
    if task.is_trivial_move() {
        let file = &task.inputs[0];
        let mut edit = VersionEdit::new();
        edit.delete_file(task.level, file.number);
        edit.add_file(task.output_level, Arc::clone(file));
        info!(
            file = file.number,
            from = task.level,
            to = task.output_level,
            "trivial move"
        );
        version_set.log_and_apply(edit)?;
        return Ok(0);
    }

    let outputs = merge_inputs(task, version_set, block_size)?;

    let mut edit = VersionEdit::new();
    for file in &task.inputs {
        edit.delete_file(task.level, file.number);
    }
    for file in &task.overlaps {
        edit.delete_file(task.output_level, file.number);
    }
    let output_count = outputs.len();
    for meta in outputs {
        edit.add_file(task.output_level, Arc::new(meta));
    }
    info!(
        level = task.level,
        inputs = task.inputs.len(),
        overlaps = task.overlaps.len(),
        outputs = output_count,
        "compaction installed"
    );
    version_set.log_and_apply(edit)?;
    Ok(output_count)
}

/// Runs the merge, returning metadata of the written outputs. On error
/// every output written so far is deleted.
fn merge_inputs(
    task: &CompactionTask,
    version_set: &VersionSet,
    block_size: usize,
) -> Result<Vec<FileMeta>, CompactionError> {
    let max_levels = version_set.max_levels();
    let provider = version_set.provider();

    let mut sources: Vec<(u64, Box<dyn MergeSource>)> = Vec::new();
    for file in &task.inputs {
        let reader = provider.table(file.number, file.size)?;
        sources.push((
            level_tag(max_levels, task.level, file.number),
            Box::new(TableIter::new(reader)?),
        ));
    }
    for file in &task.overlaps {
        let reader = provider.table(file.number, file.size)?;
        sources.push((
            level_tag(max_levels, task.output_level, file.number),
            Box::new(TableIter::new(reader)?),
        ));
    }

    let mut state = MergeState {
        version_set,
        block_size,
        outputs: Vec::new(),
        builder: None,
        current_number: 0,
    };

    match state.run(MergingIterator::new(sources)?, task) {
        Ok(()) => Ok(state.outputs),
        Err(e) => {
            state.discard();
            Err(e)
        }
    }
}

struct MergeState<'a> {
    version_set: &'a VersionSet,
    block_size: usize,
    outputs: Vec<FileMeta>,
    builder: Option<TableBuilder>,
    current_number: u64,
}

impl MergeState<'_> {
    fn run(
        &mut self,
        mut merger: MergingIterator,
        task: &CompactionTask,
    ) -> Result<(), CompactionError> {
        while let Some((user_key, payload)) = merger.next()? {
            if payload.is_empty() && tombstone_droppable(task, &user_key) {
                debug!(key = ?String::from_utf8_lossy(&user_key), "tombstone dropped");
                continue;
            }

            if self.builder.is_none() {
                let number = self.version_set.new_file_number();
                let path = files::table_file_path(self.version_set.dir(), number);
                self.builder = Some(TableBuilder::new(path, self.block_size)?);
                self.current_number = number;
            }
            if let Some(builder) = self.builder.as_mut() {
                builder.add(&user_key, &payload)?;
                if builder.estimated_size() >= MAX_OUTPUT_FILE_SIZE {
                    self.roll_output()?;
                }
            }
        }
        self.roll_output()
    }

    fn roll_output(&mut self) -> Result<(), CompactionError> {
        let Some(builder) = self.builder.take() else {
            return Ok(());
        };
        let number = self.current_number;
        let built = builder.finish()?;
        match (built.smallest, built.largest) {
            (Some(smallest), Some(largest)) => {
                self.outputs
                    .push(FileMeta::new(number, built.file_size, smallest, largest));
            }
            _ => {
                // Nothing survived into this output; drop the empty file.
                let path = files::table_file_path(self.version_set.dir(), number);
                let _ = std::fs::remove_file(path);
            }
        }
        Ok(())
    }

    /// Removes every output written so far; the inputs are untouched and
    /// the current version is unchanged.
    fn discard(&mut self) {
        if let Some(builder) = self.builder.take() {
            if let Err(e) = builder.abandon() {
                warn!(error = %e, "failed to remove partial compaction output");
            }
        }
        for meta in self.outputs.drain(..) {
            let path = files::table_file_path(self.version_set.dir(), meta.number);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(file = meta.number, error = %e, "failed to remove compaction output");
            }
        }
    }
}

/// A tombstone can be dropped when no level deeper than the output can
/// still hold an older version of its key.
fn tombstone_droppable(task: &CompactionTask, user_key: &[u8]) -> bool {
    for level in (task.output_level + 1)..task.version.num_levels() {
        if task
            .version
            .files(level)
            .iter()
            .any(|f| f.contains(user_key))
        {
            return false;
        }
    }
    true
}
