//! Version edits — the deltas persisted in the manifest.
//!
//! The manifest is an append-only sequence of records, each one encoding a
//! [`VersionEdit`]:
//!
//! ```text
//! [record_length (4 B, LE)][tagged fields (record_length B)][0x00]
//! ```
//!
//! Fields carry a one-byte tag; tag 0 terminates the record:
//!
//! | tag | field            | payload                                              |
//! |-----|------------------|------------------------------------------------------|
//! | 1   | comparator_name  | `len (4 LE)` + bytes                                 |
//! | 2   | log_number       | u64 LE                                               |
//! | 3   | next_file_number | u64 LE                                               |
//! | 4   | last_sequence    | u64 LE                                               |
//! | 5   | new_file         | `level (4)` `number (8)` `size (8)` `smallest_len (4)` smallest `largest_len (4)` largest |
//! | 6   | deleted_file     | `level (4)` `number (8)`                             |
//!
//! Replaying every record in order reconstructs the current version.

use std::sync::Arc;

use super::{FileMeta, VersionError};

const TAG_TERMINATOR: u8 = 0;
const TAG_COMPARATOR: u8 = 1;
const TAG_LOG_NUMBER: u8 = 2;
const TAG_NEXT_FILE_NUMBER: u8 = 3;
const TAG_LAST_SEQUENCE: u8 = 4;
const TAG_NEW_FILE: u8 = 5;
const TAG_DELETED_FILE: u8 = 6;

/// A delta between two versions plus catalog counter updates.
#[derive(Debug, Default, Clone)]
pub struct VersionEdit {
    /// Name of the key comparator (sanity-checked on recovery).
    pub comparator_name: Option<String>,
    /// WAL file number the memtable state is durable up to.
    pub log_number: Option<u64>,
    /// High-water mark for the file-number allocator.
    pub next_file_number: Option<u64>,
    /// Last sequence number assigned at the time of the edit.
    pub last_sequence: Option<u64>,
    /// Files added, as `(level, meta)`.
    pub added: Vec<(usize, Arc<FileMeta>)>,
    /// Files removed, as `(level, file_number)`.
    pub deleted: Vec<(usize, u64)>,
}

impl VersionEdit {
    /// An empty edit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a file addition.
    pub fn add_file(&mut self, level: usize, meta: Arc<FileMeta>) -> &mut Self {
        self.added.push((level, meta));
        self
    }

    /// Records a file removal.
    pub fn delete_file(&mut self, level: usize, number: u64) -> &mut Self {
        self.deleted.push((level, number));
        self
    }

    /// Serializes the tagged fields (without the length prefix or
    /// terminator; the manifest writer adds both).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(name) = &self.comparator_name {
            buf.push(TAG_COMPARATOR);
            buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
        }
        if let Some(n) = self.log_number {
            buf.push(TAG_LOG_NUMBER);
            buf.extend_from_slice(&n.to_le_bytes());
        }
        if let Some(n) = self.next_file_number {
            buf.push(TAG_NEXT_FILE_NUMBER);
            buf.extend_from_slice(&n.to_le_bytes());
        }
        if let Some(n) = self.last_sequence {
            buf.push(TAG_LAST_SEQUENCE);
            buf.extend_from_slice(&n.to_le_bytes());
        }
        for (level, number) in &self.deleted {
            buf.push(TAG_DELETED_FILE);
            buf.extend_from_slice(&(*level as u32).to_le_bytes());
            buf.extend_from_slice(&number.to_le_bytes());
        }
        for (level, meta) in &self.added {
            buf.push(TAG_NEW_FILE);
            buf.extend_from_slice(&(*level as u32).to_le_bytes());
            buf.extend_from_slice(&meta.number.to_le_bytes());
            buf.extend_from_slice(&meta.size.to_le_bytes());
            buf.extend_from_slice(&(meta.smallest.len() as u32).to_le_bytes());
            buf.extend_from_slice(&meta.smallest);
            buf.extend_from_slice(&(meta.largest.len() as u32).to_le_bytes());
            buf.extend_from_slice(&meta.largest);
        }
        buf
    }

    /// Deserializes the tagged fields of one record.
    pub fn decode(data: &[u8]) -> Result<Self, VersionError> {
        let mut edit = VersionEdit::new();
        let mut cursor = Cursor { buf: data, pos: 0 };

        while !cursor.done() {
            match cursor.u8()? {
                TAG_TERMINATOR => break,
                TAG_COMPARATOR => {
                    let bytes = cursor.len_prefixed()?;
                    let name = String::from_utf8(bytes).map_err(|_| {
                        VersionError::Corruption("comparator name is not UTF-8".into())
                    })?;
                    edit.comparator_name = Some(name);
                }
                TAG_LOG_NUMBER => edit.log_number = Some(cursor.u64()?),
                TAG_NEXT_FILE_NUMBER => edit.next_file_number = Some(cursor.u64()?),
                TAG_LAST_SEQUENCE => edit.last_sequence = Some(cursor.u64()?),
                TAG_NEW_FILE => {
                    let level = cursor.u32()? as usize;
                    let number = cursor.u64()?;
                    let size = cursor.u64()?;
                    let smallest = cursor.len_prefixed()?;
                    let largest = cursor.len_prefixed()?;
                    edit.added
                        .push((level, Arc::new(FileMeta::new(number, size, smallest, largest))));
                }
                TAG_DELETED_FILE => {
                    let level = cursor.u32()? as usize;
                    let number = cursor.u64()?;
                    edit.deleted.push((level, number));
                }
                other => {
                    return Err(VersionError::Corruption(format!(
                        "unknown manifest field tag {other}"
                    )));
                }
            }
        }
        Ok(edit)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&[u8], VersionError> {
        if self.pos + n > self.buf.len() {
            return Err(VersionError::Corruption(format!(
                "manifest record truncated at offset {}",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, VersionError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, VersionError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, VersionError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn len_prefixed(&mut self) -> Result<Vec<u8>, VersionError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}
