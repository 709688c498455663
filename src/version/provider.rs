//! Shared cache of open table readers.
//!
//! Versions hold file *metadata* only; the bytes live in table files that
//! many versions may reference at once. The provider hands out shared
//! [`TableReader`] handles keyed by file number, opening each file at most
//! once, and evicts handles when the underlying file is deleted.
//!
//! This is the "non-owning back reference" the version layer uses for
//! file-name construction: it knows the database directory and the block
//! cache, nothing else.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::cache::BlockCache;
use crate::table::{TableError, TableReader};

use super::files;

/// Opens and caches [`TableReader`]s by file number.
pub struct TableProvider {
    dir: PathBuf,
    cache: Option<Arc<dyn BlockCache>>,
    open: Mutex<HashMap<u64, Arc<TableReader>>>,
}

impl TableProvider {
    /// A provider rooted at the database directory.
    pub fn new(dir: impl Into<PathBuf>, cache: Option<Arc<dyn BlockCache>>) -> Self {
        Self {
            dir: dir.into(),
            cache,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Database directory this provider serves.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of table file `number`.
    pub fn table_path(&self, number: u64) -> PathBuf {
        files::table_file_path(&self.dir, number)
    }

    /// Returns the shared reader for `number`, opening the file on first
    /// use. `expected_size` guards against serving a partially written
    /// file.
    pub fn table(&self, number: u64, expected_size: u64) -> Result<Arc<TableReader>, TableError> {
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(reader) = open.get(&number) {
            return Ok(Arc::clone(reader));
        }
        let reader = Arc::new(TableReader::open(
            self.table_path(number),
            number,
            self.cache.clone(),
        )?);
        if reader.file_size() != expected_size {
            return Err(TableError::Corruption(format!(
                "table {number:06} is {} bytes, catalog says {expected_size}",
                reader.file_size()
            )));
        }
        open.insert(number, Arc::clone(&reader));
        Ok(reader)
    }

    /// Drops the cached reader for a deleted file.
    pub fn evict(&self, number: u64) {
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        if open.remove(&number).is_some() {
            debug!(file = number, "table reader evicted");
        }
    }
}
