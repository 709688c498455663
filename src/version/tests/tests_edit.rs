use std::sync::Arc;

use crate::version::edit::VersionEdit;
use crate::version::{FileMeta, VersionError};

#[test]
fn full_edit_round_trips() {
    let mut edit = VersionEdit::new();
    edit.comparator_name = Some("stratumdb.bytewise".to_string());
    edit.log_number = Some(7);
    edit.next_file_number = Some(42);
    edit.last_sequence = Some(9001);
    edit.add_file(
        0,
        Arc::new(FileMeta::new(12, 4096, b"aaa".to_vec(), b"mmm".to_vec())),
    );
    edit.add_file(
        3,
        Arc::new(FileMeta::new(13, 8192, b"nnn".to_vec(), b"zzz".to_vec())),
    );
    edit.delete_file(1, 5);

    let decoded = VersionEdit::decode(&edit.encode()).unwrap();
    assert_eq!(decoded.comparator_name.as_deref(), Some("stratumdb.bytewise"));
    assert_eq!(decoded.log_number, Some(7));
    assert_eq!(decoded.next_file_number, Some(42));
    assert_eq!(decoded.last_sequence, Some(9001));
    assert_eq!(decoded.deleted, vec![(1, 5)]);
    assert_eq!(decoded.added.len(), 2);
    let (level, meta) = &decoded.added[0];
    assert_eq!(*level, 0);
    assert_eq!(meta.number, 12);
    assert_eq!(meta.size, 4096);
    assert_eq!(meta.smallest, b"aaa");
    assert_eq!(meta.largest, b"mmm");
}

#[test]
fn empty_edit_round_trips() {
    let edit = VersionEdit::new();
    let decoded = VersionEdit::decode(&edit.encode()).unwrap();
    assert!(decoded.comparator_name.is_none());
    assert!(decoded.added.is_empty());
    assert!(decoded.deleted.is_empty());
}

#[test]
fn unknown_tag_is_corruption() {
    let err = VersionEdit::decode(&[0x77]).unwrap_err();
    assert!(matches!(err, VersionError::Corruption(_)));
}

#[test]
fn truncated_field_is_corruption() {
    let mut edit = VersionEdit::new();
    edit.last_sequence = Some(1234);
    let mut bytes = edit.encode();
    bytes.truncate(bytes.len() - 2);
    assert!(matches!(
        VersionEdit::decode(&bytes),
        Err(VersionError::Corruption(_))
    ));
}

#[test]
fn terminator_tag_stops_decoding() {
    let mut edit = VersionEdit::new();
    edit.log_number = Some(3);
    let mut bytes = edit.encode();
    bytes.push(0); // explicit terminator
    bytes.extend_from_slice(&[0x77, 0x88]); // garbage past the terminator
    let decoded = VersionEdit::decode(&bytes).unwrap();
    assert_eq!(decoded.log_number, Some(3));
}
