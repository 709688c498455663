mod tests_basic;
mod tests_compaction;
mod tests_recovery;

use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::engine::{Db, Options};

pub(crate) fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .try_init();
}

/// Options tuned for tests: tiny memtable, background work disabled by
/// the caller where determinism matters.
pub(crate) fn small_options() -> Options {
    Options {
        memtable_size: 1024,
        ..Options::default()
    }
}

pub(crate) fn open_db(dir: &TempDir, options: Options) -> Db {
    Db::open(dir.path(), options).unwrap()
}
