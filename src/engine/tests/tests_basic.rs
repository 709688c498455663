use tempfile::TempDir;

use super::{init_tracing, open_db};
use crate::engine::{Db, EngineError, Options};
use crate::wal::WriteBatch;

#[test]
fn put_get_delete_round_trip() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, Options::default());

    db.put(b"k", b"v").unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));

    db.delete(b"k").unwrap();
    assert_eq!(db.get(b"k").unwrap(), None);

    db.close().unwrap();
}

#[test]
fn overwrites_return_newest_value() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, Options::default());

    for i in 0..10 {
        db.put(b"counter", format!("{i}").as_bytes()).unwrap();
    }
    assert_eq!(db.get(b"counter").unwrap(), Some(b"9".to_vec()));
}

#[test]
fn batch_applies_in_order() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, Options::default());

    let mut batch = WriteBatch::new();
    batch.put(b"a", b"1");
    batch.put(b"b", b"2");
    batch.delete(b"a");
    batch.put(b"b", b"3");
    db.write(batch).unwrap();

    // Later ops in the same batch win: "a" deleted after its put,
    // "b" overwritten.
    assert_eq!(db.get(b"a").unwrap(), None);
    assert_eq!(db.get(b"b").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn invalid_arguments_are_rejected_without_state_change() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, Options::default());

    // Empty key.
    assert!(matches!(
        db.put(b"", b"v"),
        Err(EngineError::InvalidArgument(_))
    ));
    // Oversized key.
    let huge_key = vec![0u8; 1025];
    assert!(matches!(
        db.put(&huge_key, b"v"),
        Err(EngineError::InvalidArgument(_))
    ));
    // Empty value (reserved for tombstones).
    assert!(matches!(
        db.put(b"k", b""),
        Err(EngineError::InvalidArgument(_))
    ));
    // Oversized batch.
    let mut batch = WriteBatch::new();
    batch.put(b"k", vec![0u8; 2 * 1024 * 1024]);
    assert!(matches!(
        db.write(batch),
        Err(EngineError::InvalidArgument(_))
    ));

    // A bad op anywhere in a batch rejects the whole batch.
    let mut batch = WriteBatch::new();
    batch.put(b"good", b"v");
    batch.put(b"", b"v");
    assert!(db.write(batch).is_err());
    assert_eq!(db.get(b"good").unwrap(), None);
}

#[test]
fn empty_batch_is_a_no_op() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, Options::default());
    db.write(WriteBatch::new()).unwrap();
}

#[test]
fn use_after_close_is_rejected() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, Options::default());
    db.put(b"k", b"v").unwrap();
    db.close().unwrap();

    assert!(matches!(db.get(b"k"), Err(EngineError::Closed)));
    assert!(matches!(db.put(b"k", b"v"), Err(EngineError::Closed)));
    assert!(matches!(db.flush(), Err(EngineError::Closed)));
    // Double close too.
    assert!(matches!(db.close(), Err(EngineError::Closed)));
}

#[test]
fn open_without_create_if_missing_fails_on_fresh_path() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope");
    let options = Options {
        create_if_missing: false,
        ..Options::default()
    };
    assert!(matches!(
        Db::open(&missing, options),
        Err(EngineError::InvalidArgument(_))
    ));
}

#[test]
fn iterator_merges_all_layers_and_skips_tombstones() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, Options::default());
    db.pause_background_work();

    db.put(b"a", b"1").unwrap();
    db.put(b"b", b"2").unwrap();
    db.flush().unwrap(); // "a", "b" now in a table
    db.put(b"b", b"2-new").unwrap(); // memtable shadows the table
    db.put(b"c", b"3").unwrap();
    db.delete(b"a").unwrap(); // tombstone in the memtable

    let mut iter = db.iter().unwrap();
    let mut seen = Vec::new();
    while let Some((k, v)) = iter.next().unwrap() {
        seen.push((k, v));
    }
    assert_eq!(
        seen,
        vec![
            (b"b".to_vec(), b"2-new".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );

    // Seek repositions.
    iter.seek(b"c").unwrap();
    assert_eq!(iter.next().unwrap().unwrap().0, b"c");
    iter.seek_to_first().unwrap();
    assert_eq!(iter.next().unwrap().unwrap().0, b"b");
}

#[test]
fn sequence_numbers_increase_across_batches() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, Options::default());

    let before = db_last_sequence(&db);
    db.put(b"a", b"1").unwrap();
    let after_one = db_last_sequence(&db);
    assert!(after_one > before);

    let mut batch = WriteBatch::new();
    batch.put(b"b", b"2");
    batch.put(b"c", b"3");
    batch.put(b"d", b"4");
    db.write(batch).unwrap();
    assert_eq!(db_last_sequence(&db), after_one + 3);
}

fn db_last_sequence(db: &Db) -> u64 {
    // Test module sits inside `engine`, so private fields are reachable.
    db.shared.version_set.last_sequence()
}
