use std::sync::Arc;

use tempfile::TempDir;

use crate::table::{TableBuilder, DEFAULT_BLOCK_SIZE};
use crate::version::files::table_file_path;
use crate::version::provider::TableProvider;
use crate::version::{FileMeta, Version, VersionGet};

fn meta(number: u64, smallest: &[u8], largest: &[u8]) -> Arc<FileMeta> {
    Arc::new(FileMeta::new(
        number,
        1024,
        smallest.to_vec(),
        largest.to_vec(),
    ))
}

fn build_table(dir: &TempDir, number: u64, entries: &[(&[u8], &[u8])]) -> Arc<FileMeta> {
    let path = table_file_path(dir.path(), number);
    let mut builder = TableBuilder::new(&path, DEFAULT_BLOCK_SIZE).unwrap();
    for (k, v) in entries {
        builder.add(k, v).unwrap();
    }
    let built = builder.finish().unwrap();
    Arc::new(FileMeta::new(
        number,
        built.file_size,
        built.smallest.unwrap(),
        built.largest.unwrap(),
    ))
}

#[test]
fn add_file_keeps_deep_levels_sorted() {
    let mut version = Version::empty(7, 1);
    version.add_file(2, meta(10, b"mmm", b"ppp"));
    version.add_file(2, meta(11, b"aaa", b"ccc"));
    version.add_file(2, meta(12, b"ttt", b"zzz"));
    version.add_file(2, meta(13, b"ddd", b"lll"));

    let smallest: Vec<&[u8]> = version
        .files(2)
        .iter()
        .map(|f| f.smallest.as_slice())
        .collect();
    assert_eq!(smallest, vec![b"aaa" as &[u8], b"ddd", b"mmm", b"ttt"]);
    version.check_invariants();
}

#[test]
fn l0_files_may_overlap_and_append() {
    let mut version = Version::empty(7, 1);
    version.add_file(0, meta(1, b"a", b"m"));
    version.add_file(0, meta(2, b"g", b"z"));
    assert_eq!(version.files(0).len(), 2);
    // Append order preserved; probe order is derived from file numbers.
    assert_eq!(version.files(0)[0].number, 1);
    version.check_invariants();
}

#[test]
fn get_prefers_newest_l0_file() {
    let tmp = TempDir::new().unwrap();
    let provider = TableProvider::new(tmp.path(), None);

    // Overlapping L0 files: file 2 is newer and must win for "h".
    let old = build_table(&tmp, 1, &[(b"a", b"old-a"), (b"h", b"old-h")]);
    let new = build_table(&tmp, 2, &[(b"g", b"new-g"), (b"h", b"new-h")]);

    let mut version = Version::empty(7, 1);
    version.add_file(0, old);
    version.add_file(0, new);

    assert_eq!(
        version.get(b"h", &provider).unwrap(),
        VersionGet::Found(b"new-h".to_vec())
    );
    assert_eq!(
        version.get(b"a", &provider).unwrap(),
        VersionGet::Found(b"old-a".to_vec())
    );
    assert_eq!(version.get(b"q", &provider).unwrap(), VersionGet::NotFound);
}

#[test]
fn get_binary_searches_deeper_levels() {
    let tmp = TempDir::new().unwrap();
    let provider = TableProvider::new(tmp.path(), None);

    let f1 = build_table(&tmp, 1, &[(b"a", b"1"), (b"c", b"3")]);
    let f2 = build_table(&tmp, 2, &[(b"f", b"6"), (b"h", b"8")]);
    let f3 = build_table(&tmp, 3, &[(b"m", b"13"), (b"p", b"16")]);

    let mut version = Version::empty(7, 1);
    version.add_file(1, f2);
    version.add_file(1, f1);
    version.add_file(1, f3);
    version.check_invariants();

    assert_eq!(
        version.get(b"f", &provider).unwrap(),
        VersionGet::Found(b"6".to_vec())
    );
    assert_eq!(
        version.get(b"p", &provider).unwrap(),
        VersionGet::Found(b"16".to_vec())
    );
    // Between files.
    assert_eq!(version.get(b"e", &provider).unwrap(), VersionGet::NotFound);
    // Before the first and past the last file.
    assert_eq!(version.get(b"A", &provider).unwrap(), VersionGet::NotFound);
    assert_eq!(version.get(b"z", &provider).unwrap(), VersionGet::NotFound);
}

#[test]
fn tombstone_payload_reports_deleted() {
    let tmp = TempDir::new().unwrap();
    let provider = TableProvider::new(tmp.path(), None);

    let file = build_table(&tmp, 1, &[(b"dead", b""), (b"live", b"v")]);
    let mut version = Version::empty(7, 1);
    version.add_file(0, file);

    assert_eq!(
        version.get(b"dead", &provider).unwrap(),
        VersionGet::Tombstone
    );
    assert_eq!(
        version.get(b"live", &provider).unwrap(),
        VersionGet::Found(b"v".to_vec())
    );
}

#[test]
fn overlapping_files_selects_by_range() {
    let mut version = Version::empty(7, 1);
    version.add_file(1, meta(1, b"a", b"c"));
    version.add_file(1, meta(2, b"f", b"h"));
    version.add_file(1, meta(3, b"m", b"p"));

    let hits = version.overlapping_files(1, b"g", b"n");
    let numbers: Vec<u64> = hits.iter().map(|f| f.number).collect();
    assert_eq!(numbers, vec![2, 3]);

    assert!(version.overlapping_files(1, b"d", b"e").is_empty());
}
