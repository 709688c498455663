//! Bloom filter for negative point-lookup rejection.
//!
//! Each table carries one filter over its user keys in the meta block.
//! The filter is sized from the expected key count and a target
//! false-positive rate using the standard optimal formulas:
//!
//! ```text
//! bits   = ceil(-n · ln(p) / ln(2)²)
//! hashes = round(bits / n · ln(2))        (clamped to [1, 30])
//! ```
//!
//! Probes use 32-bit MurmurHash3 with one independent seed per probe.
//!
//! # Wire format (all fields little-endian u32)
//!
//! ```text
//! [version][bit_size][hash_count][element_count][seed × hash_count][bit bytes]
//! ```
//!
//! A table whose meta block is empty has no filter; readers substitute
//! [`LoadedFilter::MatchAll`] so every lookup proceeds to the index.


use thiserror::Error;

/// Current filter wire-format version.
const FILTER_VERSION: u32 = 1;

/// Base constant the per-probe seeds are derived from.
const SEED_BASE: u32 = 0xbc9f_1d34;

/// Probe-seed stride (golden-ratio constant).
const SEED_STRIDE: u32 = 0x9e37_79b9;

/// Errors produced while decoding a serialized filter.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Structurally invalid filter bytes.
    #[error("corrupt filter block: {0}")]
    Corruption(String),

    /// Version field is newer than this implementation understands.
    #[error("unsupported filter version {0}")]
    UnsupportedVersion(u32),
}

/// A serializable bloom filter over user keys.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bit_size: u32,
    seeds: Vec<u32>,
    element_count: u32,
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Sizes a filter for `expected_count` keys at `target_fpr`.
    pub fn new(expected_count: usize, target_fpr: f64) -> Self {
        let n = expected_count.max(1) as f64;
        let p = target_fpr.clamp(1e-9, 0.5);

        let ln2 = std::f64::consts::LN_2;
        let bit_size = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(8.0) as u32;
        let hash_count = (((bit_size as f64 / n) * ln2).round() as u32).clamp(1, 30);

        let seeds = (0..hash_count)
            .map(|i| SEED_BASE ^ i.wrapping_mul(SEED_STRIDE))
            .collect();

        Self {
            bit_size,
            seeds,
            element_count: 0,
            bits: vec![0u8; (bit_size as usize).div_ceil(8)],
        }
    }

    /// Adds a key to the filter.
    pub fn insert(&mut self, key: &[u8]) {
        for i in 0..self.seeds.len() {
            let bit = (murmur3_32(key, self.seeds[i]) % self.bit_size) as usize;
            self.bits[bit / 8] |= 1 << (bit % 8);
        }
        self.element_count = self.element_count.saturating_add(1);
    }

    /// True if the key *may* have been inserted; false means definitely not.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.seeds.iter().all(|&seed| {
            let bit = (murmur3_32(key, seed) % self.bit_size) as usize;
            self.bits[bit / 8] & (1 << (bit % 8)) != 0
        })
    }

    /// Number of keys inserted so far.
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Serializes the filter.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(16 + self.seeds.len() * 4 + self.bits.len());
        buf.extend_from_slice(&FILTER_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.bit_size.to_le_bytes());
        buf.extend_from_slice(&(self.seeds.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.element_count.to_le_bytes());
        for seed in &self.seeds {
            buf.extend_from_slice(&seed.to_le_bytes());
        }
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Deserializes a filter produced by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> Result<Self, FilterError> {
        let read_u32 = |offset: usize| -> Result<u32, FilterError> {
            data.get(offset..offset + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or_else(|| FilterError::Corruption("truncated header".into()))
        };

        let version = read_u32(0)?;
        if version != FILTER_VERSION {
            return Err(FilterError::UnsupportedVersion(version));
        }
        let bit_size = read_u32(4)?;
        let hash_count = read_u32(8)?;
        let element_count = read_u32(12)?;

        if bit_size == 0 || hash_count == 0 || hash_count > 30 {
            return Err(FilterError::Corruption(format!(
                "implausible geometry: {bit_size} bits, {hash_count} hashes"
            )));
        }

        let mut seeds = Vec::with_capacity(hash_count as usize);
        for i in 0..hash_count as usize {
            seeds.push(read_u32(16 + i * 4)?);
        }

        let bits_offset = 16 + hash_count as usize * 4;
        let expected_bytes = (bit_size as usize).div_ceil(8);
        let bits = data
            .get(bits_offset..bits_offset + expected_bytes)
            .ok_or_else(|| FilterError::Corruption("truncated bit array".into()))?
            .to_vec();

        Ok(Self {
            bit_size,
            seeds,
            element_count,
            bits,
        })
    }
}

/// Filter as loaded from a table's meta block.
#[derive(Debug, Clone)]
pub enum LoadedFilter {
    /// A real bloom filter.
    Bloom(BloomFilter),
    /// No filter stored; every key may be present.
    MatchAll,
}

impl LoadedFilter {
    /// Interprets meta-block bytes: empty means "no filter".
    pub fn from_meta_bytes(data: &[u8]) -> Result<Self, FilterError> {
        if data.is_empty() {
            Ok(LoadedFilter::MatchAll)
        } else {
            Ok(LoadedFilter::Bloom(BloomFilter::decode(data)?))
        }
    }

    /// True if the key may be present in the table.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        match self {
            LoadedFilter::Bloom(filter) => filter.may_contain(key),
            LoadedFilter::MatchAll => true,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// MurmurHash3, 32-bit variant
// ------------------------------------------------------------------------------------------------

/// Seeded 32-bit MurmurHash3 over `data`.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k: u32 = 0;
        for (i, &byte) in tail.iter().enumerate() {
            k |= (byte as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
