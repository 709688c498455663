//! Prefix-compressed sorted block.
//!
//! Blocks are the unit of storage inside a table file. Entries are sorted
//! and strictly ascending; each key is stored as the length of the prefix
//! it shares with the previous key plus the differing suffix. Every
//! `RESTART_INTERVAL` entries the prefix resets, and the offset of that
//! entry is recorded in a restart array, which makes binary search
//! possible over compressed data.
//!
//! # Wire format (all integers little-endian u32)
//!
//! ```text
//! entry*:   [shared][non_shared][value_len][key_suffix][value]
//! trailer:  [restart_offset × num_restarts][num_restarts]
//! ```

use super::TableError;

/// Number of entries between restart points.
pub const RESTART_INTERVAL: usize = 16;

// ------------------------------------------------------------------------------------------------
// BlockBuilder
// ------------------------------------------------------------------------------------------------

/// Builds one sorted block.
pub struct BlockBuilder {
    buf: Vec<u8>,
    restarts: Vec<u32>,
    last_key: Vec<u8>,
    entries_since_restart: usize,
    restart_interval: usize,
    target_size: usize,
    num_entries: usize,
}

impl BlockBuilder {
    /// A builder targeting `target_size` bytes with the default restart
    /// interval.
    pub fn new(target_size: usize) -> Self {
        Self::with_restart_interval(target_size, RESTART_INTERVAL)
    }

    /// A builder with an explicit restart interval. Interval 1 is used for
    /// dedicated oversized-entry blocks, where prefix compression buys
    /// nothing.
    pub fn with_restart_interval(target_size: usize, restart_interval: usize) -> Self {
        Self {
            buf: Vec::new(),
            restarts: Vec::new(),
            last_key: Vec::new(),
            entries_since_restart: 0,
            restart_interval: restart_interval.max(1),
            target_size,
            num_entries: 0,
        }
    }

    /// Appends `(key, value)` if it fits.
    ///
    /// Returns `Ok(false)` — without modifying the block — when the entry
    /// would push a non-empty block past its target size. An entry added
    /// to an empty block always succeeds regardless of size. Keys must
    /// arrive in strictly ascending order.
    pub fn try_add(&mut self, key: &[u8], value: &[u8]) -> Result<bool, TableError> {
        if self.num_entries > 0 && key <= self.last_key.as_slice() {
            return Err(TableError::Corruption(format!(
                "keys not strictly ascending: {:?} after {:?}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(&self.last_key),
            )));
        }

        let projected = self.buf.len()
            + 12
            + key.len()
            + value.len()
            + (self.restarts.len() + 2) * 4;
        if self.num_entries > 0 && projected > self.target_size {
            return Ok(false);
        }

        let shared = if self.entries_since_restart == 0 {
            self.restarts.push(self.buf.len() as u32);
            0
        } else {
            shared_prefix_len(&self.last_key, key)
        };
        let non_shared = key.len() - shared;

        self.buf.extend_from_slice(&(shared as u32).to_le_bytes());
        self.buf.extend_from_slice(&(non_shared as u32).to_le_bytes());
        self.buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(&key[shared..]);
        self.buf.extend_from_slice(value);

        self.entries_since_restart += 1;
        if self.entries_since_restart >= self.restart_interval {
            self.entries_since_restart = 0;
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        Ok(true)
    }

    /// Appends `(key, value)` regardless of the size target. Used for the
    /// dedicated oversized-entry blocks and for index blocks, which cannot
    /// be rolled over.
    pub fn force_add(&mut self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        let saved = self.target_size;
        self.target_size = usize::MAX;
        let added = self.try_add(key, value);
        self.target_size = saved;
        added.map(|_| ())
    }

    /// Number of entries added so far.
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// True when nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Current encoded size including the trailer.
    pub fn size_estimate(&self) -> usize {
        self.buf.len() + self.restarts.len() * 4 + 4
    }

    /// Key of the most recently added entry.
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Serializes the block and resets the builder for reuse.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = std::mem::take(&mut self.buf);
        for restart in &self.restarts {
            out.extend_from_slice(&restart.to_le_bytes());
        }
        out.extend_from_slice(&(self.restarts.len() as u32).to_le_bytes());

        self.restarts.clear();
        self.last_key.clear();
        self.entries_since_restart = 0;
        self.num_entries = 0;
        out
    }
}

fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

// ------------------------------------------------------------------------------------------------
// Block (reader)
// ------------------------------------------------------------------------------------------------

/// A parsed, immutable block.
pub struct Block {
    data: Vec<u8>,
    /// Byte length of the entry region (trailer excluded).
    data_end: usize,
    restarts: Vec<u32>,
}

impl Block {
    /// Parses block bytes, validating the restart trailer.
    pub fn decode(data: Vec<u8>) -> Result<Self, TableError> {
        if data.len() < 4 {
            return Err(TableError::Corruption("block shorter than trailer".into()));
        }
        let n = data.len();
        let num_restarts =
            u32::from_le_bytes([data[n - 4], data[n - 3], data[n - 2], data[n - 1]]) as usize;

        let trailer_len = 4 + num_restarts * 4;
        if trailer_len > n {
            return Err(TableError::Corruption(format!(
                "restart count {num_restarts} overruns block of {n} bytes"
            )));
        }
        let data_end = n - trailer_len;

        let mut restarts = Vec::with_capacity(num_restarts);
        for i in 0..num_restarts {
            let off = data_end + i * 4;
            let restart =
                u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]);
            if restart as usize >= data_end && !(restart == 0 && data_end == 0) {
                return Err(TableError::Corruption(format!(
                    "restart offset {restart} outside entry region of {data_end} bytes"
                )));
            }
            restarts.push(restart);
        }

        Ok(Self {
            data,
            data_end,
            restarts,
        })
    }

    /// Cursor positioned before the first entry.
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            block: self,
            offset: 0,
            key: Vec::new(),
            value_range: 0..0,
            exhausted: self.data_end == 0,
        }
    }

    /// Decodes the entry header at `offset`.
    /// Returns `(shared, non_shared, value_len, payload_offset)`.
    fn entry_header(&self, offset: usize) -> Result<(usize, usize, usize, usize), TableError> {
        if offset + 12 > self.data_end {
            return Err(TableError::Corruption(
                "entry header overruns block data".into(),
            ));
        }
        let word = |at: usize| {
            u32::from_le_bytes([
                self.data[at],
                self.data[at + 1],
                self.data[at + 2],
                self.data[at + 3],
            ]) as usize
        };
        let shared = word(offset);
        let non_shared = word(offset + 4);
        let value_len = word(offset + 8);
        let payload = offset + 12;
        if payload + non_shared + value_len > self.data_end {
            return Err(TableError::Corruption(
                "entry payload overruns block data".into(),
            ));
        }
        Ok((shared, non_shared, value_len, payload))
    }

    /// Key at a restart point (entries there always have `shared == 0`).
    fn restart_key(&self, restart_index: usize) -> Result<&[u8], TableError> {
        let offset = self.restarts[restart_index] as usize;
        let (shared, non_shared, _, payload) = self.entry_header(offset)?;
        if shared != 0 {
            return Err(TableError::Corruption(
                "restart entry has nonzero shared prefix".into(),
            ));
        }
        Ok(&self.data[payload..payload + non_shared])
    }
}

/// Cursor over a [`Block`], yielding entries in ascending key order.
pub struct BlockIter<'a> {
    block: &'a Block,
    /// Offset of the next entry to decode.
    offset: usize,
    /// Reconstructed key of the current entry.
    key: Vec<u8>,
    /// Location of the current entry's value in the block data.
    value_range: std::ops::Range<usize>,
    exhausted: bool,
}

impl<'a> BlockIter<'a> {
    /// True while the cursor points at an entry (after a successful
    /// [`advance`](Self::advance) or [`seek`](Self::seek)).
    pub fn valid(&self) -> bool {
        !self.key.is_empty() || !self.value_range.is_empty()
    }

    /// Key of the current entry.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Value of the current entry.
    pub fn value(&self) -> &'a [u8] {
        &self.block.data[self.value_range.clone()]
    }

    /// Steps to the next entry. Returns `Ok(false)` at the end of the
    /// block; a corrupt entry poisons the cursor with an error.
    pub fn advance(&mut self) -> Result<bool, TableError> {
        if self.exhausted || self.offset >= self.block.data_end {
            self.exhausted = true;
            self.key.clear();
            self.value_range = 0..0;
            return Ok(false);
        }
        let (shared, non_shared, value_len, payload) = self.block.entry_header(self.offset)?;
        if shared > self.key.len() {
            return Err(TableError::Corruption(
                "shared prefix longer than previous key".into(),
            ));
        }
        self.key.truncate(shared);
        self.key
            .extend_from_slice(&self.block.data[payload..payload + non_shared]);
        self.value_range = payload + non_shared..payload + non_shared + value_len;
        self.offset = payload + non_shared + value_len;
        Ok(true)
    }

    /// Positions the cursor at the first entry with key ≥ `target`.
    /// Returns `Ok(false)` when every key is smaller.
    pub fn seek(&mut self, target: &[u8]) -> Result<bool, TableError> {
        // Binary search over restart points: find the last restart whose
        // key is < target, then scan linearly from there.
        let (mut lo, mut hi) = (0usize, self.block.restarts.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.block.restart_key(mid)? < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let start_restart = lo.saturating_sub(1);

        self.offset = self
            .block
            .restarts
            .get(start_restart)
            .copied()
            .unwrap_or(0) as usize;
        self.key.clear();
        self.value_range = 0..0;
        self.exhausted = self.block.data_end == 0;

        while self.advance()? {
            if self.key.as_slice() >= target {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Rewinds to the first entry.
    pub fn seek_to_first(&mut self) -> Result<bool, TableError> {
        self.offset = 0;
        self.key.clear();
        self.value_range = 0..0;
        self.exhausted = self.block.data_end == 0;
        self.advance()
    }
}
