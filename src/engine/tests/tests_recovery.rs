use tempfile::TempDir;

use super::{init_tracing, open_db, small_options};
use crate::engine::Options;
use crate::wal::WriteBatch;

#[test]
fn reopen_recovers_unflushed_writes() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    {
        let db = open_db(&tmp, Options::default());
        for i in 0..30 {
            db.put(
                format!("key_{i}").as_bytes(),
                format!("value_{i}").as_bytes(),
            )
            .unwrap();
        }
        db.close().unwrap(); // close flushes nothing from the active memtable
    }

    let db = open_db(&tmp, Options::default());
    for i in 0..30 {
        assert_eq!(
            db.get(format!("key_{i}").as_bytes()).unwrap(),
            Some(format!("value_{i}").into_bytes()),
            "key_{i} lost across reopen"
        );
    }
}

#[test]
fn crash_without_close_recovers_synced_writes() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    {
        let db = open_db(&tmp, Options::default());
        db.put(b"persist", b"me").unwrap();
        db.delete(b"persist-not").unwrap();
        // Simulate a crash: no close, no drop-time cleanup.
        std::mem::forget(db);
    }

    let db = open_db(&tmp, Options::default());
    assert_eq!(db.get(b"persist").unwrap(), Some(b"me".to_vec()));
    assert_eq!(db.get(b"persist-not").unwrap(), None);
}

#[test]
fn batches_recover_atomically() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    {
        let db = open_db(&tmp, Options::default());
        let mut batch = WriteBatch::new();
        batch.put(b"b1", b"1");
        batch.put(b"b2", b"2");
        batch.put(b"b3", b"3");
        db.write(batch).unwrap();
        std::mem::forget(db);
    }

    let db = open_db(&tmp, Options::default());
    // All three, or (had the record been torn) none, never a subset.
    let visible: Vec<bool> = [b"b1", b"b2", b"b3"]
        .iter()
        .map(|k| db.get(*k).unwrap().is_some())
        .collect();
    assert!(
        visible.iter().all(|v| *v) || visible.iter().all(|v| !*v),
        "partial batch visible after recovery: {visible:?}"
    );
    assert!(visible[0], "fsynced batch should have survived");
}

#[test]
fn sequences_continue_after_recovery() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    {
        let db = open_db(&tmp, Options::default());
        for i in 0..10 {
            db.put(format!("k{i}").as_bytes(), b"v").unwrap();
        }
        db.close().unwrap();
    }

    let db = open_db(&tmp, Options::default());
    let recovered = db.shared.version_set.last_sequence();
    assert!(recovered >= 10, "sequence counter regressed: {recovered}");

    // New writes must advance past every recovered sequence.
    db.put(b"new", b"write").unwrap();
    assert!(db.shared.version_set.last_sequence() > recovered);
    // And newest-wins still holds for a key written in both lives.
    db.put(b"k3", b"second-life").unwrap();
    assert_eq!(db.get(b"k3").unwrap(), Some(b"second-life".to_vec()));
}

#[test]
fn recovery_replays_flushed_and_unflushed_state_together() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    {
        let db = open_db(&tmp, small_options());
        db.pause_background_work();
        for i in 0..50 {
            db.put(format!("flushed-{i:03}").as_bytes(), b"on-disk").unwrap();
        }
        db.flush().unwrap();
        for i in 0..10 {
            db.put(format!("pending-{i:03}").as_bytes(), b"in-wal").unwrap();
        }
        std::mem::forget(db);
    }

    let db = open_db(&tmp, small_options());
    for i in 0..50 {
        assert_eq!(
            db.get(format!("flushed-{i:03}").as_bytes()).unwrap(),
            Some(b"on-disk".to_vec())
        );
    }
    for i in 0..10 {
        assert_eq!(
            db.get(format!("pending-{i:03}").as_bytes()).unwrap(),
            Some(b"in-wal".to_vec())
        );
    }
}

#[test]
fn destroy_removes_database_but_not_foreign_dirs() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db_dir = tmp.path().join("db");
    {
        let db = crate::engine::Db::open(&db_dir, Options::default()).unwrap();
        db.put(b"k", b"v").unwrap();
        db.close().unwrap();
    }
    crate::engine::Db::destroy(&db_dir).unwrap();
    assert!(!db_dir.exists());
    // Destroying a nonexistent path is fine.
    crate::engine::Db::destroy(&db_dir).unwrap();

    // A directory full of unrelated files is refused.
    let foreign = tmp.path().join("foreign");
    std::fs::create_dir(&foreign).unwrap();
    std::fs::write(foreign.join("precious.txt"), b"do not delete").unwrap();
    assert!(crate::engine::Db::destroy(&foreign).is_err());
    assert!(foreign.join("precious.txt").exists());
}
