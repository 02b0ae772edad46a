use crate::codec::{Endian, ObjectInfo};
use crate::proto::{ObjectFormatCode, ObjectHandle, StorageId, association, protection};
use crate::types::PtpDateTime;

fn sample() -> ObjectInfo {
    ObjectInfo {
        storage_id: StorageId(0x0001_0001),
        object_format: ObjectFormatCode::EXIF_JPEG,
        protection_status: protection::NONE,
        object_compressed_size: 4_718_592,
        thumb_format: ObjectFormatCode::EXIF_JPEG,
        thumb_compressed_size: 12_000,
        thumb_pix_width: 160,
        thumb_pix_height: 120,
        image_pix_width: 6048,
        image_pix_height: 4024,
        image_bit_depth: 24,
        parent_object: ObjectHandle(0x0000_0010),
        association_type: 0,
        association_desc: 0,
        sequence_number: 0,
        filename: "DSC_0042.JPG".to_string(),
        capture_date: PtpDateTime::parse("20250812T142530"),
        modification_date: PtpDateTime::parse("20250812T142530"),
        keywords: String::new(),
    }
}

#[test]
fn test_roundtrip() {
    let info = sample();
    for endian in [Endian::Little, Endian::Big] {
        let bytes = info.to_bytes(endian).unwrap();
        assert_eq!(ObjectInfo::decode(&bytes, endian), info);
    }
}

#[test]
fn test_roundtrip_without_dates() {
    let mut info = sample();
    info.capture_date = None;
    info.modification_date = None;

    let bytes = info.to_bytes(Endian::Little).unwrap();
    let decoded = ObjectInfo::decode(&bytes, Endian::Little);
    assert_eq!(decoded.capture_date, None);
    assert_eq!(decoded, info);
}

#[test]
fn test_garbage_date_becomes_none() {
    let mut info = sample();
    info.capture_date = None;
    let mut bytes = info.to_bytes(Endian::Little).unwrap();

    // Overwrite the empty capture date string with a bogus one. The
    // empty string is a single zero byte directly after the filename.
    let date_pos = 52 + 1 + 13 * 2;
    assert_eq!(bytes[date_pos], 0);
    bytes[date_pos] = 3;
    let mut patched = bytes[..=date_pos].to_vec();
    patched.extend_from_slice(&[b'x', 0, b'y', 0, 0, 0]);
    patched.extend_from_slice(&bytes[date_pos + 1..]);

    let decoded = ObjectInfo::decode(&patched, Endian::Little);
    assert_eq!(decoded.capture_date, None);
    assert_eq!(decoded.modification_date, info.modification_date);
}

#[test]
fn test_truncated_keeps_fixed_fields() {
    let info = sample();
    let bytes = info.to_bytes(Endian::Little).unwrap();

    // Cut before the filename string. The fixed section is 52 bytes.
    let decoded = ObjectInfo::decode(&bytes[..52], Endian::Little);
    assert_eq!(decoded.storage_id, info.storage_id);
    assert_eq!(decoded.object_compressed_size, info.object_compressed_size);
    assert_eq!(decoded.sequence_number, 0);
    assert!(decoded.filename.is_empty());
    assert_eq!(decoded.capture_date, None);
}

#[test]
fn test_decode_empty() {
    let info = ObjectInfo::decode(&[], Endian::Little);
    assert_eq!(info, ObjectInfo::default());
}

#[test]
fn test_association_helpers() {
    let mut info = sample();
    assert!(!info.is_association());
    info.object_format = ObjectFormatCode::ASSOCIATION;
    info.association_type = association::GENERIC_FOLDER;
    assert!(info.is_association());

    assert!(!info.is_protected());
    info.protection_status = protection::READ_ONLY;
    assert!(info.is_protected());
}
