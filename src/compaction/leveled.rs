//! The leveled compaction strategy.
//!
//! Triggers:
//!
//! - **L0 file count** — four or more files (each an entire memtable
//!   flush, so lookups touch them all).
//! - **Level byte budget** — any deeper level past `10 MiB × 10^(k-1)`.
//!
//! L0 always wins the priority race; otherwise the most-overflowed level
//! is compacted. For L0 every file participates (they overlap freely);
//! for deeper levels one file is chosen, rotating through the level via a
//! per-level pointer so repeated compactions sweep the whole key space.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::version::{FileMeta, Version};

use super::{max_bytes_for_level, CompactionStrategy, CompactionTask, L0_COMPACTION_TRIGGER};

/// Classic leveled compaction picking.
#[derive(Default)]
pub struct LeveledStrategy {
    /// Largest key compacted per level; the next pick starts after it.
    compact_pointer: Mutex<HashMap<usize, Vec<u8>>>,
}

impl LeveledStrategy {
    /// A strategy with fresh rotation state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overflow ratio of the worst non-L0 level, with the level index.
    fn worst_level(version: &Version) -> (usize, f64) {
        let mut worst = (0usize, 0.0f64);
        for level in 1..version.num_levels().saturating_sub(1) {
            let ratio = version.level_size(level) as f64 / max_bytes_for_level(level) as f64;
            if ratio > worst.1 {
                worst = (level, ratio);
            }
        }
        worst
    }
}

impl CompactionStrategy for LeveledStrategy {
    fn need_compaction(&self, version: &Version) -> bool {
        if version.files(0).len() >= L0_COMPACTION_TRIGGER {
            return true;
        }
        Self::worst_level(version).1 > 1.0
    }

    fn pick_compaction(&self, version: Arc<Version>) -> Option<CompactionTask> {
        // L0 first: take every file (they may all overlap).
        if version.files(0).len() >= L0_COMPACTION_TRIGGER {
            let inputs: Vec<Arc<FileMeta>> = version.files(0).to_vec();
            let (smallest, largest) = key_range(&inputs)?;
            let overlaps = version.overlapping_files(1, &smallest, &largest);
            debug!(
                inputs = inputs.len(),
                overlaps = overlaps.len(),
                "picked L0 compaction"
            );
            return Some(CompactionTask {
                level: 0,
                inputs,
                overlaps,
                output_level: 1,
                version,
            });
        }

        let (level, ratio) = Self::worst_level(&version);
        if ratio <= 1.0 {
            return None;
        }

        // Rotate through the level: first file past the pointer, wrapping.
        let files = version.files(level);
        let mut pointers = self.compact_pointer.lock().unwrap_or_else(|e| e.into_inner());
        let pointer = pointers.get(&level).cloned().unwrap_or_default();
        let file = files
            .iter()
            .find(|f| f.largest.as_slice() > pointer.as_slice())
            .or_else(|| files.first())?;
        pointers.insert(level, file.largest.clone());

        let overlaps = version.overlapping_files(level + 1, &file.smallest, &file.largest);
        debug!(
            level,
            file = file.number,
            overlaps = overlaps.len(),
            ratio,
            "picked level compaction"
        );
        Some(CompactionTask {
            level,
            inputs: vec![Arc::clone(file)],
            overlaps,
            output_level: level + 1,
            version: Arc::clone(&version),
        })
    }
}

fn key_range(files: &[Arc<FileMeta>]) -> Option<(Vec<u8>, Vec<u8>)> {
    let smallest = files.iter().map(|f| &f.smallest).min()?.clone();
    let largest = files.iter().map(|f| &f.largest).max()?.clone();
    Some((smallest, largest))
}
