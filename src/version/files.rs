//! Database file naming.
//!
//! Every file in the database directory is named by its allocated file
//! number: `NNNNNN.sst` for tables, `NNNNNN.log` for write-ahead logs, and
//! `MANIFEST-NNNNNN` for manifests.

use std::path::{Path, PathBuf};

/// Kind of a database file, parsed from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `NNNNNN.sst`
    Table(u64),
    /// `NNNNNN.log`
    Log(u64),
    /// `MANIFEST-NNNNNN`
    Manifest(u64),
}

/// Path of table file `number` under `dir`.
pub fn table_file_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{number:06}.sst"))
}

/// Path of WAL file `number` under `dir`.
pub fn log_file_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{number:06}.log"))
}

/// Path of manifest file `number` under `dir`.
pub fn manifest_file_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("MANIFEST-{number:06}"))
}

/// Parses a file name back into its kind, if it is one of ours.
pub fn parse_file_name(name: &str) -> Option<FileKind> {
    if let Some(rest) = name.strip_prefix("MANIFEST-") {
        return rest.parse().ok().map(FileKind::Manifest);
    }
    if let Some(stem) = name.strip_suffix(".sst") {
        return stem.parse().ok().map(FileKind::Table);
    }
    if let Some(stem) = name.strip_suffix(".log") {
        return stem.parse().ok().map(FileKind::Log);
    }
    None
}
