//! Block-framed record log.
//!
//! A log file is a sequence of 32 KiB blocks. Each block holds one or more
//! physical records:
//!
//! ```text
//! [crc32 (4 B, LE)][length (2 B, LE)][type (1 B)][payload (`length` B)]
//! ```
//!
//! The CRC covers `type || payload`. A logical record that does not fit in
//! the remainder of a block is fragmented into FIRST/MIDDLE/LAST physical
//! records; records otherwise never cross block boundaries. When fewer than
//! 7 bytes (one header) remain in a block, the trailer is zero-filled and
//! the next record starts at the next block boundary.
//!
//! The reader is a lazy, finite iterator of reassembled payloads. A failed
//! checksum, an unknown type byte, or an out-of-sequence fragment (LAST
//! without FIRST, FIRST without LAST) is reported as one corrupt record;
//! the reader then resynchronizes at the next block and continues. It is
//! non-restartable except via [`LogReader::reset`].

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

use crc32fast::Hasher as Crc32;
use thiserror::Error;
use tracing::trace;

/// Size of one log block.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Size of a physical record header: crc (4) + length (2) + type (1).
pub const HEADER_SIZE: usize = 7;

/// Largest payload a single logical record may carry. Bounded well below
/// `u16::MAX × blocks` so a corrupt length field cannot demand absurd
/// allocations from the reader.
pub const MAX_RECORD_SIZE: usize = 1 << 20;

/// Errors surfaced by the framing layer.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A physical record failed its CRC or structural checks; the reader
    /// has skipped ahead and may yield further records.
    #[error("corrupt log record: {0}")]
    Corruption(String),

    /// Payload handed to the writer exceeds [`MAX_RECORD_SIZE`].
    #[error("record of {0} bytes exceeds maximum {MAX_RECORD_SIZE}")]
    RecordTooLarge(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordType {
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl RecordType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }
}

fn record_crc(ty: u8, payload: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(&[ty]);
    hasher.update(payload);
    hasher.finalize()
}

// ------------------------------------------------------------------------------------------------
// LogWriter
// ------------------------------------------------------------------------------------------------

/// Appends framed records to a log file.
#[derive(Debug)]
pub struct LogWriter {
    writer: BufWriter<File>,
    /// Byte offset within the current 32 KiB block.
    block_offset: usize,
}

impl LogWriter {
    /// Wraps a freshly created (or truncated) log file.
    pub fn new(file: File) -> Self {
        Self {
            writer: BufWriter::new(file),
            block_offset: 0,
        }
    }

    /// Wraps an existing log file for continued appending. `len` is the
    /// current file length, used to recover the intra-block offset.
    pub fn with_len(file: File, len: u64) -> Self {
        Self {
            writer: BufWriter::new(file),
            block_offset: (len % BLOCK_SIZE as u64) as usize,
        }
    }

    /// Appends one logical record, fragmenting across blocks as needed.
    pub fn append(&mut self, payload: &[u8]) -> Result<(), FramingError> {
        if payload.len() > MAX_RECORD_SIZE {
            return Err(FramingError::RecordTooLarge(payload.len()));
        }

        let mut remaining = payload;
        let mut first_fragment = true;
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // Zero-fill the trailer; the record starts in a fresh block.
                const ZEROES: [u8; HEADER_SIZE] = [0; HEADER_SIZE];
                self.writer.write_all(&ZEROES[..leftover])?;
                self.block_offset = 0;
            }

            let available = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_len = remaining.len().min(available);
            let (fragment, rest) = remaining.split_at(fragment_len);

            let ty = match (first_fragment, rest.is_empty()) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, false) => RecordType::Middle,
                (false, true) => RecordType::Last,
            };
            self.emit(ty, fragment)?;

            remaining = rest;
            first_fragment = false;
            if remaining.is_empty() {
                break;
            }
        }
        Ok(())
    }

    fn emit(&mut self, ty: RecordType, payload: &[u8]) -> Result<(), FramingError> {
        let crc = record_crc(ty as u8, payload);
        self.writer.write_all(&crc.to_le_bytes())?;
        self.writer.write_all(&(payload.len() as u16).to_le_bytes())?;
        self.writer.write_all(&[ty as u8])?;
        self.writer.write_all(payload)?;
        self.block_offset += HEADER_SIZE + payload.len();
        trace!(ty = ty as u8, len = payload.len(), "log fragment emitted");
        Ok(())
    }

    /// Pushes buffered bytes to the operating system.
    pub fn flush(&mut self) -> Result<(), FramingError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and forces the file to stable storage.
    pub fn sync(&mut self) -> Result<(), FramingError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// LogReader
// ------------------------------------------------------------------------------------------------

/// Reads framed records back, verifying checksums and reassembling
/// fragmented records.
#[derive(Debug)]
pub struct LogReader {
    file: File,
    block: Vec<u8>,
    block_len: usize,
    pos: usize,
    eof: bool,
}

impl LogReader {
    /// Starts reading from the beginning of `file`.
    pub fn new(file: File) -> Self {
        Self {
            file,
            block: vec![0; BLOCK_SIZE],
            block_len: 0,
            pos: 0,
            eof: false,
        }
    }

    /// Rewinds to the start of the log; the iterator becomes fresh.
    pub fn reset(&mut self) -> Result<(), FramingError> {
        self.file.seek(SeekFrom::Start(0))?;
        self.block_len = 0;
        self.pos = 0;
        self.eof = false;
        Ok(())
    }

    /// Reads the next physical record, refilling the block buffer as needed.
    /// `Ok(None)` signals clean end of file.
    fn next_physical(&mut self) -> Result<Option<(RecordType, Vec<u8>)>, FramingError> {
        loop {
            if self.block_len - self.pos < HEADER_SIZE {
                // Trailer (zero-filled or partial): load the next block.
                if self.eof {
                    return Ok(None);
                }
                self.block_len = 0;
                self.pos = 0;
                while self.block_len < BLOCK_SIZE {
                    let n = self.file.read(&mut self.block[self.block_len..])?;
                    if n == 0 {
                        self.eof = true;
                        break;
                    }
                    self.block_len += n;
                }
                if self.block_len == 0 {
                    return Ok(None);
                }
                if self.block_len < HEADER_SIZE {
                    // Torn write at the tail of the file.
                    return Err(FramingError::Corruption(
                        "truncated record header at end of log".into(),
                    ));
                }
                continue;
            }

            let header = &self.block[self.pos..self.pos + HEADER_SIZE];
            let stored_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let length = u16::from_le_bytes([header[4], header[5]]) as usize;
            let ty_byte = header[6];

            if ty_byte == 0 && length == 0 && stored_crc == 0 {
                // Zero padding: skip to the next block.
                self.pos = self.block_len;
                continue;
            }

            if self.pos + HEADER_SIZE + length > self.block_len {
                self.pos = self.block_len;
                return Err(FramingError::Corruption(format!(
                    "fragment length {length} overruns block"
                )));
            }

            let payload_start = self.pos + HEADER_SIZE;
            let payload = &self.block[payload_start..payload_start + length];

            let Some(ty) = RecordType::from_byte(ty_byte) else {
                self.pos = self.block_len;
                return Err(FramingError::Corruption(format!(
                    "unknown record type 0x{ty_byte:02x}"
                )));
            };

            if record_crc(ty_byte, payload) != stored_crc {
                self.pos = self.block_len;
                return Err(FramingError::Corruption("checksum mismatch".into()));
            }

            let payload = payload.to_vec();
            self.pos = payload_start + length;
            return Ok(Some((ty, payload)));
        }
    }
}

impl Iterator for LogReader {
    type Item = Result<Vec<u8>, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut partial: Option<Vec<u8>> = None;
        loop {
            let (ty, fragment) = match self.next_physical() {
                Ok(Some(rec)) => rec,
                Ok(None) => {
                    return partial.map(|_| {
                        Err(FramingError::Corruption(
                            "log ended inside a fragmented record".into(),
                        ))
                    });
                }
                Err(e) => return Some(Err(e)),
            };

            match (ty, &mut partial) {
                (RecordType::Full, None) => return Some(Ok(fragment)),
                (RecordType::First, None) => partial = Some(fragment),
                (RecordType::Middle, Some(buf)) => {
                    buf.extend_from_slice(&fragment);
                    if buf.len() > MAX_RECORD_SIZE {
                        return Some(Err(FramingError::Corruption(
                            "fragmented record exceeds maximum size".into(),
                        )));
                    }
                }
                (RecordType::Last, Some(buf)) => {
                    buf.extend_from_slice(&fragment);
                    return Some(Ok(partial.take().unwrap_or_default()));
                }
                // Fragment sequencing violations.
                (RecordType::Middle | RecordType::Last, None) => {
                    return Some(Err(FramingError::Corruption(
                        "continuation fragment without a FIRST".into(),
                    )));
                }
                (RecordType::Full | RecordType::First, Some(_)) => {
                    return Some(Err(FramingError::Corruption(
                        "new record started inside a fragmented record".into(),
                    )));
                }
            }
        }
    }
}
