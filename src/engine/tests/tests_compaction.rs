use tempfile::TempDir;

use super::{init_tracing, open_db, small_options};

/// Writes `count` keys with the given prefix and flushes them into one
/// L0 table.
fn flush_keyed(db: &crate::engine::Db, lo: u8, hi: u8, marker: &[u8]) {
    for k in lo..=hi {
        db.put(&[b'k', k], marker).unwrap();
    }
    db.flush().unwrap();
}

#[test]
fn l0_compacts_into_l1_preserving_every_key() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, small_options());
    db.pause_background_work();

    // Five overlapping L0 flushes.
    for round in 0..5u8 {
        flush_keyed(&db, 10, 60, &[b'r', round]);
    }
    assert_eq!(db.stats().unwrap().level_files[0], 5);

    // One synchronous round merges them all into L1.
    assert!(db.compact_now().unwrap());
    let stats = db.stats().unwrap();
    assert_eq!(stats.level_files[0], 0, "L0 not emptied");
    assert!(stats.level_files[1] >= 1, "no L1 output");

    // Every key readable, newest round wins.
    for k in 10..=60u8 {
        assert_eq!(db.get(&[b'k', k]).unwrap(), Some(vec![b'r', 4]));
    }
}

#[test]
fn compact_range_pushes_data_down_and_drops_tombstones() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, small_options());
    db.pause_background_work();

    db.put(b"keep", b"value").unwrap();
    db.put(b"gone", b"value").unwrap();
    db.flush().unwrap();
    db.delete(b"gone").unwrap();
    db.flush().unwrap();

    db.compact_range(b"a", b"z").unwrap();

    assert_eq!(db.get(b"keep").unwrap(), Some(b"value".to_vec()));
    assert_eq!(db.get(b"gone").unwrap(), None);

    // Nothing left in L0; no table should still carry the tombstone
    // once everything sits at one level.
    let stats = db.stats().unwrap();
    assert_eq!(stats.level_files[0], 0);
    assert!(stats.level_files.iter().skip(1).sum::<usize>() >= 1);
}

#[test]
fn compaction_result_survives_reopen() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    {
        let db = open_db(&tmp, small_options());
        db.pause_background_work();
        for round in 0..5u8 {
            flush_keyed(&db, 0, 40, &[round]);
        }
        assert!(db.compact_now().unwrap());
        db.close().unwrap();
    }

    let db = open_db(&tmp, small_options());
    let stats = db.stats().unwrap();
    assert_eq!(stats.level_files[0], 0);
    assert!(stats.level_files[1] >= 1);
    for k in 0..=40u8 {
        assert_eq!(db.get(&[b'k', k]).unwrap(), Some(vec![4]));
    }
}

#[test]
fn background_worker_compacts_without_being_asked() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp, small_options());

    // Enough data to switch the memtable several times; the background
    // worker flushes and compacts on its own.
    for i in 0..400 {
        db.put(
            format!("key-{i:06}").as_bytes(),
            format!("value-{i:06}").as_bytes(),
        )
        .unwrap();
    }

    // Wait for the queue to drain.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    loop {
        let stats = db.stats().unwrap();
        let settled = !stats.immutable_pending && stats.level_files[0] < 4;
        if settled || std::time::Instant::now() > deadline {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    for i in 0..400 {
        assert_eq!(
            db.get(format!("key-{i:06}").as_bytes()).unwrap(),
            Some(format!("value-{i:06}").into_bytes()),
            "key-{i:06} lost during background maintenance"
        );
    }
    db.close().unwrap();
}

#[test]
fn reads_concurrent_with_compaction_never_miss() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let db = std::sync::Arc::new(open_db(&tmp, small_options()));
    db.pause_background_work();
    for round in 0..5u8 {
        flush_keyed(&db, 0, 50, &[round]);
    }

    let reader = {
        let db = std::sync::Arc::clone(&db);
        std::thread::spawn(move || {
            for _ in 0..50 {
                for k in (0..=50u8).step_by(7) {
                    assert_eq!(db.get(&[b'k', k]).unwrap(), Some(vec![4]));
                }
            }
        })
    };

    while db.compact_now().unwrap() {}
    reader.join().unwrap();
}
