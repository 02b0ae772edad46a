mod object_info;
mod storage_info;
mod strings;

use super::*;

// --- mod.rs tests ---

#[test]
fn test_reader_tracks_position() {
    let mut reader = WireReader::new(&[1, 2, 3, 4], Endian::Little);

    assert_eq!(reader.remaining(), 4);
    assert_eq!(reader.consumed(), 0);
    assert!(!reader.is_empty());

    reader.u16("first").unwrap();
    assert_eq!(reader.remaining(), 2);
    assert_eq!(reader.consumed(), 2);

    reader.u16("second").unwrap();
    assert!(reader.is_empty());
    assert!(reader.rest().is_empty());
}

#[test]
fn test_reader_error_names_field() {
    let mut reader = WireReader::new(&[0xAA], Endian::Little);

    let err = reader.u32("transaction id").unwrap_err();
    match err {
        CodecError::Truncated {
            what,
            needed,
            remaining,
        } => {
            assert_eq!(what, "transaction id");
            assert_eq!(needed, 4);
            assert_eq!(remaining, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_writer_starts_empty() {
    let writer = WireWriter::new(Endian::Little);
    assert!(writer.is_empty());
    assert_eq!(writer.len(), 0);
    assert!(writer.into_bytes().is_empty());
}
