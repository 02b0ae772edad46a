use crate::codec::{Endian, StorageInfo};
use crate::proto::storage;

fn sample() -> StorageInfo {
    StorageInfo {
        storage_type: storage::TYPE_REMOVABLE_RAM,
        filesystem_type: storage::FS_DCF,
        access_capability: storage::ACCESS_READ_WRITE,
        max_capacity: 128 * 1024 * 1024 * 1024,
        free_space_bytes: 93_458_211_840,
        free_space_images: 2_481,
        description: String::new(),
        volume_label: "NIKON Z 6".to_string(),
    }
}

#[test]
fn test_roundtrip() {
    let info = sample();
    for endian in [Endian::Little, Endian::Big] {
        let bytes = info.to_bytes(endian).unwrap();
        assert_eq!(StorageInfo::decode(&bytes, endian), info);
    }
}

#[test]
fn test_truncated_keeps_capacities() {
    let info = sample();
    let bytes = info.to_bytes(Endian::Little).unwrap();

    // Fixed section is 2+2+2+8+8+4 bytes; cut before the strings.
    let decoded = StorageInfo::decode(&bytes[..26], Endian::Little);
    assert_eq!(decoded.max_capacity, info.max_capacity);
    assert_eq!(decoded.free_space_images, 2_481);
    assert!(decoded.volume_label.is_empty());
}

#[test]
fn test_access_helpers() {
    let mut info = sample();
    assert!(info.is_writable());
    assert!(info.is_removable());

    info.access_capability = storage::ACCESS_READ_ONLY;
    info.storage_type = storage::TYPE_FIXED_RAM;
    assert!(!info.is_writable());
    assert!(!info.is_removable());
}
