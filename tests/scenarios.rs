//! Boundary scenarios, parameterised with `rstest` where a scenario has a
//! natural in-memory vs. file-backed variant.

use std::io::Write;

use blesscol::{Buffer, DataObject};
use rstest::rstest;
use tempfile::NamedTempFile;

enum Source {
    Memory(Vec<u8>),
    File(NamedTempFile),
}

impl Source {
    fn data_object(&self) -> DataObject {
        match self {
            Source::Memory(bytes) => DataObject::memory(bytes.clone(), None),
            Source::File(tmp) => DataObject::file(tmp.reopen().unwrap(), None).unwrap(),
        }
    }
}

fn memory_source(bytes: Vec<u8>) -> Source {
    Source::Memory(bytes)
}

fn file_source(bytes: Vec<u8>) -> Source {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(&bytes).unwrap();
    tmp.flush().unwrap();
    Source::File(tmp)
}

fn read_all(buf: &Buffer) -> Vec<u8> {
    let size = buf.get_size() as usize;
    let mut out = vec![0u8; size];
    if size > 0 {
        buf.read(0, &mut out, 0, size).unwrap();
    }
    out
}

#[test]
fn empty_buffer_accepts_zero_length_operations() {
    let mut buf = Buffer::new();
    assert_eq!(buf.get_size(), 0);

    let src = DataObject::memory(Vec::new(), None);
    buf.insert(0, &src, 0, 0).unwrap();
    buf.delete(0, 0).unwrap();

    let mut dst = [];
    buf.read(0, &mut dst, 0, 0).unwrap();
}

#[rstest]
#[case::memory_source(memory_source as fn(Vec<u8>) -> Source)]
#[case::file_source(file_source as fn(Vec<u8>) -> Source)]
fn delete_and_reinsert_tail_holes_reconstructs_the_original(#[case] make: fn(Vec<u8>) -> Source) {
    const SIZE: usize = 1 << 20;
    let original: Vec<u8> = (0..SIZE).map(|i| ((i + 32) % 128) as u8).collect();
    let source = make(original.clone());
    let dobj = source.data_object();

    let mut buf = Buffer::new();
    buf.append(&dobj, 0, SIZE as u64).unwrap();

    // Holes at n-20, n-60, n-100, ... from the tail.
    let mut holes = Vec::new();
    let mut k = 20u64;
    while k <= SIZE as u64 {
        holes.push(SIZE as u64 - k);
        k += 40;
    }

    for &at in &holes {
        buf.delete(at, 20).unwrap();
    }
    for &at in holes.iter().rev() {
        buf.insert(at, &dobj, at, 20).unwrap();
    }

    assert_eq!(buf.get_size(), SIZE as u64);
    assert_eq!(read_all(&buf), original);
}

#[test]
fn twenty_thousand_small_inserts_land_at_the_expected_offsets() {
    let mut buf = Buffer::new();
    let triples: Vec<[u8; 3]> = (0..20_000u32)
        .map(|i| [(i % 251) as u8, ((i * 7) % 251) as u8, ((i * 13) % 251) as u8])
        .collect();

    for (i, triple) in triples.iter().enumerate() {
        let src = DataObject::memory(triple.to_vec(), None);
        if i < 5 {
            buf.append(&src, 0, 3).unwrap();
        } else {
            buf.insert(i as u64 - 4, &src, 0, 3).unwrap();
        }
    }

    assert_eq!(buf.get_size(), 60_000);

    // The first appended triple is never displaced to the left (every
    // subsequent insert lands at offset >= 1), so its first byte survives
    // at the very front of the buffer throughout.
    let mut first_byte = [0u8; 1];
    buf.read(0, &mut first_byte, 0, 1).unwrap();
    assert_eq!(first_byte, [triples[0][0]]);

    // Reading back the whole 60,000-byte buffer must succeed without
    // panicking across this many splits and cache-relocations.
    assert_eq!(read_all(&buf).len(), 60_000);
}

#[test]
fn save_into_self_after_deleting_a_prefix_keeps_only_the_tail() {
    let original: Vec<u8> = (0..100u16).map(|i| i as u8).collect();
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(&original).unwrap();
    tmp.flush().unwrap();

    let dobj = DataObject::file(tmp.reopen().unwrap(), None).unwrap();
    let mut buf = Buffer::new();
    buf.append(&dobj, 0, 100).unwrap();
    buf.delete(0, 50).unwrap();
    assert_eq!(buf.get_size(), 50);

    buf.save(tmp.reopen().unwrap(), None).unwrap();

    let saved = std::fs::read(tmp.path()).unwrap();
    assert_eq!(saved, original[50..100]);
    assert_eq!(buf.get_size(), 50);
}

#[test]
fn multi_action_undoes_the_whole_group_in_a_single_call() {
    let mut buf = Buffer::new();
    let a = DataObject::memory(b"A".to_vec(), None);
    let b = DataObject::memory(b"B".to_vec(), None);

    buf.append(&a, 0, 1).unwrap();
    let before = read_all(&buf);

    buf.begin_multi();
    buf.append(&b, 0, 1).unwrap();
    buf.insert(0, &b, 0, 1).unwrap();
    buf.delete(1, 1).unwrap();
    buf.end_multi().unwrap();

    assert_ne!(read_all(&buf), before);
    buf.undo().unwrap();
    assert_eq!(read_all(&buf), before);
}

#[test]
fn save_into_self_private_copies_the_undo_log_before_overwriting() {
    let original: Vec<u8> = (0..100u16).map(|i| i as u8).collect();
    let tmp = NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), &original).unwrap();

    let dobj = DataObject::file(tmp.reopen().unwrap(), None).unwrap();
    let mut buf = Buffer::new();
    buf.append(&dobj, 0, 100).unwrap();
    buf.delete(10, 5).unwrap(); // undo log now holds original[10..15)

    buf.save(tmp.reopen().unwrap(), None).unwrap();
    // The file on disk is now exactly the post-delete 95 bytes; bytes
    // [10, 15) of the original don't exist there anymore. Undo can only
    // recover them correctly from a private copy taken before the
    // overwrite.
    buf.undo().unwrap();
    assert_eq!(buf.get_size(), 100);
    assert_eq!(read_all(&buf), original);
}
