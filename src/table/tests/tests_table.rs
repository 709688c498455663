use std::sync::Arc;

use tempfile::TempDir;

use crate::cache::{BlockCache, ShardedBlockCache};
use crate::table::{TableBuilder, TableIter, TableReader, DEFAULT_BLOCK_SIZE};

fn build_table(
    dir: &TempDir,
    name: &str,
    entries: &[(Vec<u8>, Vec<u8>)],
) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut builder = TableBuilder::new(&path, DEFAULT_BLOCK_SIZE).unwrap();
    for (k, v) in entries {
        builder.add(k, v).unwrap();
    }
    let built = builder.finish().unwrap();
    assert_eq!(built.num_entries, entries.len() as u64);
    path
}

fn keyed_entries(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| {
            (
                format!("key-{i:06}").into_bytes(),
                format!("value-{i:06}").into_bytes(),
            )
        })
        .collect()
}

#[test]
fn get_returns_every_inserted_key() {
    let tmp = TempDir::new().unwrap();
    let entries = keyed_entries(2000); // spans many data blocks
    let path = build_table(&tmp, "000001.sst", &entries);

    let reader = TableReader::open(&path, 1, None).unwrap();
    for (k, v) in &entries {
        assert_eq!(reader.get(k).unwrap().as_ref(), Some(v), "key {k:?}");
    }
}

#[test]
fn get_misses_absent_keys() {
    let tmp = TempDir::new().unwrap();
    let entries = keyed_entries(500);
    let path = build_table(&tmp, "000002.sst", &entries);

    let reader = TableReader::open(&path, 2, None).unwrap();
    assert_eq!(reader.get(b"absent").unwrap(), None);
    assert_eq!(reader.get(b"key-999999").unwrap(), None);
    // Keys falling between stored keys.
    assert_eq!(reader.get(b"key-000000x").unwrap(), None);
}

#[test]
fn index_boundary_cases() {
    // Small blocks force multiple data blocks so we can hit the
    // first/last/middle block boundaries of the index contract.
    let tmp = TempDir::new().unwrap();
    let entries = keyed_entries(300);
    let path = tmp.path().join("000003.sst");
    let mut builder = TableBuilder::new(&path, 256).unwrap();
    for (k, v) in &entries {
        builder.add(k, v).unwrap();
    }
    builder.finish().unwrap();

    let reader = TableReader::open(&path, 3, None).unwrap();
    // Very first and very last keys of the table.
    assert!(reader.get(&entries[0].0).unwrap().is_some());
    assert!(reader.get(&entries[299].0).unwrap().is_some());
    // Every key: this sweeps the last key of each block (index entry)
    // and the first key of the following block.
    for (k, v) in &entries {
        assert_eq!(reader.get(k).unwrap().as_ref(), Some(v));
    }
}

#[test]
fn iterator_yields_full_sorted_contents() {
    let tmp = TempDir::new().unwrap();
    let entries = keyed_entries(1000);
    let path = build_table(&tmp, "000004.sst", &entries);

    let reader = Arc::new(TableReader::open(&path, 4, None).unwrap());
    let mut iter = TableIter::new(reader).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = iter.next().unwrap() {
        seen.push(entry);
    }
    assert_eq!(seen, entries);
}

#[test]
fn iterator_seek_positions_mid_table() {
    let tmp = TempDir::new().unwrap();
    let entries = keyed_entries(1000);
    let path = build_table(&tmp, "000005.sst", &entries);

    let reader = Arc::new(TableReader::open(&path, 5, None).unwrap());
    let mut iter = TableIter::new(reader).unwrap();
    iter.seek(b"key-000500").unwrap();
    let (k, _) = iter.next().unwrap().unwrap();
    assert_eq!(k, b"key-000500");

    // Seek between keys lands on the successor.
    iter.seek(b"key-000500a").unwrap();
    let (k, _) = iter.next().unwrap().unwrap();
    assert_eq!(k, b"key-000501");

    // Seek past the end exhausts the cursor.
    iter.seek(b"zzz").unwrap();
    assert!(iter.next().unwrap().is_none());
}

#[test]
fn empty_table_is_valid() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("000006.sst");
    let builder = TableBuilder::new(&path, DEFAULT_BLOCK_SIZE).unwrap();
    let built = builder.finish().unwrap();
    assert_eq!(built.num_entries, 0);
    assert!(built.smallest.is_none());

    let reader = Arc::new(TableReader::open(&path, 6, None).unwrap());
    assert_eq!(reader.get(b"anything").unwrap(), None);
    let mut iter = TableIter::new(reader).unwrap();
    assert!(iter.next().unwrap().is_none());
}

#[test]
fn oversized_entry_gets_dedicated_block() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("000007.sst");
    let mut builder = TableBuilder::new(&path, 512).unwrap();
    let huge = vec![0x5au8; 8 * 1024];
    builder.add(b"aaa", b"small").unwrap();
    builder.add(b"big", &huge).unwrap();
    builder.add(b"ccc", b"after").unwrap();
    builder.finish().unwrap();

    let reader = TableReader::open(&path, 7, None).unwrap();
    assert_eq!(reader.get(b"big").unwrap(), Some(huge));
    assert_eq!(reader.get(b"aaa").unwrap(), Some(b"small".to_vec()));
    assert_eq!(reader.get(b"ccc").unwrap(), Some(b"after".to_vec()));
}

#[test]
fn empty_payload_round_trips() {
    // Empty payloads are the tombstone representation; the table layer
    // must preserve them byte-for-byte.
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("000008.sst");
    let mut builder = TableBuilder::new(&path, DEFAULT_BLOCK_SIZE).unwrap();
    builder.add(b"dead", b"").unwrap();
    builder.add(b"live", b"value").unwrap();
    builder.finish().unwrap();

    let reader = TableReader::open(&path, 8, None).unwrap();
    assert_eq!(reader.get(b"dead").unwrap(), Some(Vec::new()));
    assert_eq!(reader.get(b"live").unwrap(), Some(b"value".to_vec()));
}

#[test]
fn corrupt_footer_magic_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let entries = keyed_entries(10);
    let path = build_table(&tmp, "000009.sst", &entries);

    let mut bytes = std::fs::read(&path).unwrap();
    let n = bytes.len();
    bytes[n - 1] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    assert!(TableReader::open(&path, 9, None).is_err());
}

#[test]
fn truncated_file_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("000010.sst");
    std::fs::write(&path, b"tiny").unwrap();
    assert!(TableReader::open(&path, 10, None).is_err());
}

#[test]
fn reads_are_served_through_the_cache() {
    let tmp = TempDir::new().unwrap();
    let entries = keyed_entries(2000);
    let path = build_table(&tmp, "000011.sst", &entries);

    let cache: Arc<dyn BlockCache> = Arc::new(ShardedBlockCache::new(4 << 20));
    let reader = TableReader::open(&path, 11, Some(Arc::clone(&cache))).unwrap();

    // Two passes: the second is served from cache and must agree.
    for _ in 0..2 {
        for (k, v) in entries.iter().step_by(37) {
            assert_eq!(reader.get(k).unwrap().as_ref(), Some(v));
        }
    }
}
