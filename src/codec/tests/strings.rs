use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::CodecError;

#[test]
fn test_empty_string_is_single_zero_byte() {
    let mut writer = WireWriter::new(Endian::Little);
    writer.string("").unwrap();
    assert_eq!(writer.into_bytes(), [0]);

    let mut reader = WireReader::new(&[0], Endian::Little);
    assert_eq!(reader.string().unwrap(), "");
    assert!(reader.is_empty());
}

#[test]
fn test_string_roundtrip() {
    let mut writer = WireWriter::new(Endian::Little);
    writer.string("DSC_0001.JPG").unwrap();
    let bytes = writer.into_bytes();

    // Length byte counts code units including the terminator.
    assert_eq!(bytes[0], 13);
    assert_eq!(bytes.len(), 1 + 13 * 2);
    // Terminator is on the wire.
    assert_eq!(&bytes[bytes.len() - 2..], &[0, 0]);

    let mut reader = WireReader::new(&bytes, Endian::Little);
    assert_eq!(reader.string().unwrap(), "DSC_0001.JPG");
}

#[test]
fn test_string_roundtrip_big_endian() {
    let mut writer = WireWriter::new(Endian::Big);
    writer.string("Ab").unwrap();
    let bytes = writer.into_bytes();
    assert_eq!(bytes, [3, 0x00, 0x41, 0x00, 0x62, 0x00, 0x00]);

    let mut reader = WireReader::new(&bytes, Endian::Big);
    assert_eq!(reader.string().unwrap(), "Ab");
}

#[test]
fn test_string_non_ascii_roundtrip() {
    let original = "Ångström 写真";
    let mut writer = WireWriter::new(Endian::Little);
    writer.string(original).unwrap();
    let bytes = writer.into_bytes();

    let mut reader = WireReader::new(&bytes, Endian::Little);
    assert_eq!(reader.string().unwrap(), original);
}

#[test]
fn test_decode_strips_trailing_zeros() {
    // Some firmware pads with several terminators.
    let bytes = [4, b'H', 0, b'i', 0, 0, 0, 0, 0];
    let mut reader = WireReader::new(&bytes, Endian::Little);
    assert_eq!(reader.string().unwrap(), "Hi");
}

#[test]
fn test_decode_without_terminator() {
    // Length 2, two real units, no terminator. Off-spec but seen in
    // the wild; accept it.
    let bytes = [2, b'O', 0, b'K', 0];
    let mut reader = WireReader::new(&bytes, Endian::Little);
    assert_eq!(reader.string().unwrap(), "OK");
}

#[test]
fn test_invalid_utf16_transliterated() {
    // Lone high surrogate followed by an ASCII unit.
    let bytes = [3, 0x00, 0xD8, b'A', 0x00, 0, 0];
    let mut reader = WireReader::new(&bytes, Endian::Little);
    assert_eq!(reader.string().unwrap(), "?A");
}

#[test]
fn test_string_body_truncated() {
    // Length byte promises 5 units but only one follows.
    let bytes = [5, b'x', 0];
    let mut reader = WireReader::new(&bytes, Endian::Little);
    assert!(matches!(
        reader.string(),
        Err(CodecError::Truncated { .. })
    ));
}

#[test]
fn test_string_max_length_encodes() {
    // 254 characters plus the terminator fills the length byte exactly.
    let s = "x".repeat(254);
    let mut writer = WireWriter::new(Endian::Little);
    writer.string(&s).unwrap();
    let bytes = writer.into_bytes();
    assert_eq!(bytes[0], 255);

    let mut reader = WireReader::new(&bytes, Endian::Little);
    assert_eq!(reader.string().unwrap(), s);
}

#[test]
fn test_string_too_long_rejected() {
    let s = "x".repeat(255);
    let mut writer = WireWriter::new(Endian::Little);
    assert!(matches!(
        writer.string(&s),
        Err(CodecError::StringTooLong { chars: 255 })
    ));
}

#[test]
fn test_missing_length_byte() {
    let mut reader = WireReader::new(&[], Endian::Little);
    assert!(reader.string().is_err());
}
