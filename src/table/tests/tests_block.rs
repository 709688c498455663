use crate::table::block::{Block, BlockBuilder};

fn build(entries: &[(&[u8], &[u8])], target: usize) -> Vec<u8> {
    let mut builder = BlockBuilder::new(target);
    for (k, v) in entries {
        assert!(builder.try_add(k, v).unwrap());
    }
    builder.finish()
}

fn collect(block: &Block) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut iter = block.iter();
    while iter.advance().unwrap() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
    }
    out
}

#[test]
fn build_then_read_identical_sequence() {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..100)
        .map(|i| {
            (
                format!("key-{i:04}").into_bytes(),
                format!("value-{i}").into_bytes(),
            )
        })
        .collect();
    let refs: Vec<(&[u8], &[u8])> = entries
        .iter()
        .map(|(k, v)| (k.as_slice(), v.as_slice()))
        .collect();

    let bytes = build(&refs, 1 << 20);
    let block = Block::decode(bytes).unwrap();
    assert_eq!(collect(&block), entries);
}

#[test]
fn prefix_compression_round_trips_shared_prefixes() {
    // Long shared prefixes exercise the shared/non_shared split.
    let entries: Vec<(&[u8], &[u8])> = vec![
        (b"application/one", b"1"),
        (b"application/two", b"2"),
        (b"application/two-more", b"3"),
        (b"zeta", b"4"),
    ];
    let bytes = build(&entries, 1 << 20);
    let block = Block::decode(bytes).unwrap();
    let decoded = collect(&block);
    assert_eq!(decoded.len(), 4);
    assert_eq!(decoded[2].0, b"application/two-more");
}

#[test]
fn rejects_out_of_order_and_duplicate_keys() {
    let mut builder = BlockBuilder::new(1 << 20);
    assert!(builder.try_add(b"bbb", b"1").unwrap());
    assert!(builder.try_add(b"abc", b"2").is_err());
    assert!(builder.try_add(b"bbb", b"3").is_err());
}

#[test]
fn try_add_refuses_when_full_but_never_when_empty() {
    let mut builder = BlockBuilder::new(64);
    // Oversized entry into an empty block is force-admitted.
    assert!(builder.try_add(b"first", &[0u8; 200]).unwrap());
    // Now the block is over target, so the next entry is refused.
    assert!(!builder.try_add(b"second", b"x").unwrap());
    assert_eq!(builder.num_entries(), 1);
}

#[test]
fn seek_finds_first_key_greater_or_equal() {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..200)
        .map(|i| (format!("k{:04}", i * 2).into_bytes(), vec![i as u8]))
        .collect();
    let refs: Vec<(&[u8], &[u8])> = entries
        .iter()
        .map(|(k, v)| (k.as_slice(), v.as_slice()))
        .collect();
    let block = Block::decode(build(&refs, 1 << 20)).unwrap();

    let mut iter = block.iter();
    // Exact hit.
    assert!(iter.seek(b"k0100").unwrap());
    assert_eq!(iter.key(), b"k0100");
    // Between keys: lands on the next one.
    assert!(iter.seek(b"k0101").unwrap());
    assert_eq!(iter.key(), b"k0102");
    // Before the first key.
    assert!(iter.seek(b"a").unwrap());
    assert_eq!(iter.key(), b"k0000");
    // Past the last key.
    assert!(!iter.seek(b"z").unwrap());
}

#[test]
fn empty_block_round_trips() {
    let mut builder = BlockBuilder::new(4096);
    let bytes = builder.finish();
    let block = Block::decode(bytes).unwrap();
    assert!(collect(&block).is_empty());
    let mut iter = block.iter();
    assert!(!iter.seek(b"anything").unwrap());
}

#[test]
fn corrupt_restart_count_is_rejected() {
    let bytes = build(&[(b"a", b"1"), (b"b", b"2")], 4096);
    let n = bytes.len();
    let mut corrupted = bytes.clone();
    // Claim far more restarts than the block can hold.
    corrupted[n - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(Block::decode(corrupted).is_err());

    // Truncated below the trailer.
    assert!(Block::decode(vec![1, 2]).is_err());
}

#[test]
fn corrupt_entry_length_invalidates_cursor() {
    let mut bytes = build(&[(b"aaaa", b"1111"), (b"bbbb", b"2222")], 4096);
    // Inflate the first entry's value_len field (bytes 8..12).
    bytes[8..12].copy_from_slice(&0xffff_u32.to_le_bytes());
    // Restart offsets still parse, so decoding may succeed; iteration
    // must fail instead of reading out of bounds.
    if let Ok(block) = Block::decode(bytes) {
        let mut iter = block.iter();
        assert!(iter.advance().is_err());
    }
}
