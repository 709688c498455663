//! # StratumDB
//!
//! An embeddable, persistent key-value store built on a **leveled
//! Log-Structured Merge tree**. Keys and values are opaque byte strings;
//! keys are ordered by unsigned lexicographic comparison.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                           Db                               │
//! │                                                            │
//! │   write ──► WAL ──► active memtable ──► immutable memtable │
//! │                        (skip list)          │ flush        │
//! │                                             ▼              │
//! │   L0  ████ ████ ████          (overlapping flushes)        │
//! │   L1  ██████ ██████ ██████    (disjoint, 10 MiB)           │
//! │   L2  ████████████ ████████   (disjoint, 100 MiB)          │
//! │   ...            │ leveled compaction                      │
//! │                                                            │
//! │   manifest: versioned catalog of every table file          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | The [`Db`] facade — open, read, write, iterate, flush, compact |
//! | [`memtable`] | In-memory write buffer over the [`skiplist`] |
//! | [`wal`] | Block-framed, CRC-protected write-ahead log and [`WriteBatch`] |
//! | [`table`] | Immutable sorted tables: prefix-compressed blocks, bloom filter, index |
//! | [`version`] | Versioned file catalog, manifest persistence, safe deletion |
//! | [`compaction`] | Leveled compaction strategy, executor, background worker |
//! | [`iterator`] | K-way merging iterator with newest-wins deduplication |
//! | [`filter`] | MurmurHash3 bloom filter |
//! | [`cache`] | Pluggable block cache |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use stratumdb::{Db, Options, WriteBatch};
//!
//! let db = Db::open("/tmp/my-db", Options::default())?;
//!
//! db.put(b"hello", b"world")?;
//! assert_eq!(db.get(b"hello")?, Some(b"world".to_vec()));
//!
//! let mut batch = WriteBatch::new();
//! batch.put(b"a", b"1");
//! batch.delete(b"hello");
//! db.write(batch)?;
//!
//! let mut iter = db.iter()?;
//! while let Some((key, value)) = iter.next()? {
//!     println!("{key:?} = {value:?}");
//! }
//!
//! db.close()?;
//! # Ok::<(), stratumdb::EngineError>(())
//! ```
//!
//! ## Guarantees
//!
//! - **Durability** — every write is in the WAL (fsynced by default)
//!   before it is acknowledged.
//! - **Atomic batches** — after recovery, a batch is visible in full or
//!   not at all.
//! - **Crash safety** — tables enter the catalog through an fsynced
//!   manifest edit before their WAL is deleted; a crash at any point
//!   recovers to the last acknowledged state.

pub mod cache;
pub mod compaction;
pub mod engine;
pub mod filter;
pub mod iterator;
pub mod key;
pub mod memtable;
pub mod skiplist;
pub mod table;
pub mod version;
pub mod wal;

pub use engine::{Db, DbIterator, DbStats, EngineError, Options};
pub use wal::{BatchOp, WriteBatch};
