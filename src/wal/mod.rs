//! Write-Ahead Log
//!
//! Durability layer for the write path: every batch is appended to the
//! active log file *before* it is applied to the memtable, so that an
//! acknowledged write survives a crash.
//!
//! ## Design Overview
//!
//! The WAL is two layers:
//!
//! - [`framing`] — a generic 32 KiB block-framed record log with per-record
//!   CRC32 protection and fragmentation (FULL/FIRST/MIDDLE/LAST).
//! - this module — batch semantics on top: each framed record is one
//!   serialized [`WriteBatch`] stamped with its start sequence number.
//!
//! ## Recovery
//!
//! [`recover`] replays a log file and yields every decodable batch together
//! with its start sequence. Corrupt records are skipped with a warning and
//! counted; recovery never fails on a bad record, only on I/O errors while
//! opening the file. Logs written by an older engine variant stamped the
//! start sequence as a `0`/`u64::MAX` sentinel — these are tolerated by
//! recomputing sequence numbers from the batch positions.
//!
//! # Guarantees
//!
//! - **Durability:** `sync` forces the log to stable storage; `flush`
//!   pushes it to the OS.
//! - **Prefix recovery:** a torn tail loses at most the records after the
//!   last fully-synced one; everything before is replayed intact.

pub mod batch;
pub mod framing;

#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use batch::{BatchOp, WriteBatch};
pub use framing::{LogReader, LogWriter, MAX_RECORD_SIZE};

use framing::FramingError;

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing-level failure (checksum, structure, oversized record).
    #[error("log framing error: {0}")]
    Framing(#[from] FramingError),

    /// A record decoded structurally wrong (bad kind byte, truncated field).
    #[error("corrupt WAL record: {0}")]
    Corruption(String),

    /// Batch would not fit in a single log record.
    #[error("batch of {0} bytes exceeds maximum record size {MAX_RECORD_SIZE}")]
    BatchTooLarge(usize),
}

/// Appends serialized batches to a single log file.
#[derive(Debug)]
pub struct WalWriter {
    log: LogWriter,
    path: PathBuf,
}

impl WalWriter {
    /// Creates (truncating) the log file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        info!(path = %path.display(), "WAL created");
        Ok(Self {
            log: LogWriter::new(file),
            path,
        })
    }

    /// Reopens an existing log file for continued appending (used when the
    /// previous process exited without switching memtables).
    pub fn reopen(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().append(true).open(&path)?;
        let len = file.metadata()?.len();
        debug!(path = %path.display(), len, "WAL reopened for append");
        Ok(Self {
            log: LogWriter::with_len(file, len),
            path,
        })
    }

    /// Appends one batch stamped with `start_sequence`.
    pub fn append(&mut self, batch: &WriteBatch, start_sequence: u64) -> Result<(), WalError> {
        let payload = batch.encode(start_sequence);
        if payload.len() > MAX_RECORD_SIZE {
            return Err(WalError::BatchTooLarge(payload.len()));
        }
        self.log.append(&payload)?;
        Ok(())
    }

    /// Pushes buffered bytes to the OS.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.log.flush()?;
        Ok(())
    }

    /// Forces the log to stable storage.
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.log.sync()?;
        Ok(())
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.log.sync() {
            warn!(path = %self.path.display(), error = %e, "WAL sync failed on drop");
        }
    }
}

/// Counters reported by [`recover`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Batches successfully decoded.
    pub records_recovered: usize,
    /// Records skipped due to corruption.
    pub records_skipped: usize,
}

/// Replays the log at `path`, returning every recoverable batch with its
/// start sequence, in log order.
///
/// Corrupt records are skipped (with a warning) rather than aborting
/// recovery; the returned [`RecoveryStats`] reports both counts. Sentinel
/// start sequences (`0` / `u64::MAX`) written by a legacy engine variant
/// are replaced by positionally recomputed sequences.
pub fn recover(
    path: impl AsRef<Path>,
) -> Result<(Vec<(u64, WriteBatch)>, RecoveryStats), WalError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = LogReader::new(file);

    let mut batches: Vec<(u64, WriteBatch)> = Vec::new();
    let mut stats = RecoveryStats::default();
    // Next sequence to assign when a legacy sentinel is encountered.
    let mut next_positional: u64 = 1;

    for record in reader {
        let payload = match record {
            Ok(payload) => payload,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping corrupt WAL record");
                stats.records_skipped += 1;
                continue;
            }
        };
        match WriteBatch::decode(&payload) {
            Ok((start_sequence, batch)) => {
                let start_sequence = if start_sequence == 0 || start_sequence == u64::MAX {
                    debug!(
                        path = %path.display(),
                        assigned = next_positional,
                        "legacy sequence sentinel in WAL record, recomputing by position"
                    );
                    next_positional
                } else {
                    start_sequence
                };
                next_positional = start_sequence + batch.len() as u64;
                stats.records_recovered += 1;
                batches.push((start_sequence, batch));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping undecodable WAL record");
                stats.records_skipped += 1;
            }
        }
    }

    info!(
        path = %path.display(),
        recovered = stats.records_recovered,
        skipped = stats.records_skipped,
        "WAL recovery finished"
    );
    Ok((batches, stats))
}
