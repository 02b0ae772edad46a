//! Test doubles for driving the engine without hardware.
//!
//! Three levels, from dumbest to smartest:
//!
//! - [`FakePipe`] replays a fixed script of endpoint reads and records
//!   writes, for exercising the USB framing layer edge by edge.
//! - [`VirtualCamera`] is a stateful fake device behind the
//!   [`UsbPipe`](crate::transport::UsbPipe) trait: it parses command
//!   containers, keeps real session/object/property state and answers
//!   like firmware would.
//! - [`MockDevice`] serves the same fake device over PTP/IP on a real
//!   TCP listener.

pub mod fake_pipe;
pub mod mock_device;
pub mod virtual_device;


pub use fake_pipe::FakePipe;
pub use mock_device::{MockDevice, MockDeviceConfig};
pub use virtual_device::{CommandReply, StoredObject, VirtualCamera, VirtualDevice};

use crate::codec::{DeviceInfo, Endian, ObjectInfo, StorageInfo, WireWriter};
use crate::proto::{
    ContainerKind, DevicePropCode, EventCode, ObjectFormatCode, ObjectHandle, OpCode, ResponseCode,
    StorageId, VendorExtensionId, storage,
};
use crate::types::PtpDateTime;

/// Packs one bulk container: header plus raw payload.
#[must_use]
pub fn bulk_container(
    endian: Endian,
    kind: ContainerKind,
    code: u16,
    transaction_id: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(endian, 12 + payload.len());
    w.u32((12 + payload.len()) as u32);
    w.u16(kind as u16);
    w.u16(code);
    w.u32(transaction_id);
    w.raw(payload);
    w.into_bytes()
}

/// Packs a response container with the given parameters.
#[must_use]
pub fn response_container(
    endian: Endian,
    code: ResponseCode,
    transaction_id: u32,
    params: &[u32],
) -> Vec<u8> {
    let mut payload = WireWriter::new(endian);
    for &param in params {
        payload.u32(param);
    }
    bulk_container(
        endian,
        ContainerKind::Response,
        code.0,
        transaction_id,
        &payload.into_bytes(),
    )
}

/// Packs a data container carrying `payload`.
#[must_use]
pub fn data_container(endian: Endian, code: OpCode, transaction_id: u32, payload: &[u8]) -> Vec<u8> {
    bulk_container(endian, ContainerKind::Data, code.0, transaction_id, payload)
}

/// Packs an event container as it appears on the interrupt endpoint.
#[must_use]
pub fn event_container(
    endian: Endian,
    code: EventCode,
    transaction_id: u32,
    params: &[u32],
) -> Vec<u8> {
    let mut payload = WireWriter::new(endian);
    for &param in params {
        payload.u32(param);
    }
    bulk_container(
        endian,
        ContainerKind::Event,
        code.0,
        transaction_id,
        &payload.into_bytes(),
    )
}

/// A plausible point-and-shoot device descriptor for tests.
#[must_use]
pub fn test_device_info() -> DeviceInfo {
    DeviceInfo {
        standard_version: 100,
        vendor_extension_id: VendorExtensionId::MICROSOFT,
        vendor_extension_version: 100,
        vendor_extension_desc: "microsoft.com: 1.0".to_string(),
        functional_mode: 0,
        operations: vec![
            OpCode::GET_DEVICE_INFO,
            OpCode::OPEN_SESSION,
            OpCode::CLOSE_SESSION,
            OpCode::GET_STORAGE_IDS,
            OpCode::GET_STORAGE_INFO,
            OpCode::GET_NUM_OBJECTS,
            OpCode::GET_OBJECT_HANDLES,
            OpCode::GET_OBJECT_INFO,
            OpCode::GET_OBJECT,
            OpCode::GET_PARTIAL_OBJECT,
            OpCode::DELETE_OBJECT,
            OpCode::SEND_OBJECT_INFO,
            OpCode::SEND_OBJECT,
            OpCode::INITIATE_CAPTURE,
            OpCode::GET_DEVICE_PROP_DESC,
            OpCode::GET_DEVICE_PROP_VALUE,
            OpCode::SET_DEVICE_PROP_VALUE,
        ],
        events: vec![
            EventCode::OBJECT_ADDED,
            EventCode::OBJECT_REMOVED,
            EventCode::CAPTURE_COMPLETE,
            EventCode::DEVICE_PROP_CHANGED,
        ],
        device_properties: vec![DevicePropCode::BATTERY_LEVEL, DevicePropCode::WHITE_BALANCE],
        capture_formats: vec![ObjectFormatCode::EXIF_JPEG],
        image_formats: vec![ObjectFormatCode::EXIF_JPEG, ObjectFormatCode::ASSOCIATION],
        manufacturer: "Example".to_string(),
        model: "Example X100".to_string(),
        device_version: "1.0.4".to_string(),
        serial_number: "00000042".to_string(),
    }
}

/// A single writable card.
#[must_use]
pub fn test_storage_info() -> StorageInfo {
    StorageInfo {
        storage_type: storage::TYPE_REMOVABLE_RAM,
        filesystem_type: storage::FS_DCF,
        access_capability: storage::ACCESS_READ_WRITE,
        max_capacity: 32 * 1024 * 1024 * 1024,
        free_space_bytes: 31 * 1024 * 1024 * 1024,
        free_space_images: 4000,
        description: "SD card".to_string(),
        volume_label: "NO NAME".to_string(),
    }
}

/// An `ObjectInfo` for a JPEG of the given size.
#[must_use]
pub fn test_object_info(storage_id: StorageId, filename: &str, size: u32) -> ObjectInfo {
    ObjectInfo {
        storage_id,
        object_format: ObjectFormatCode::EXIF_JPEG,
        protection_status: 0,
        object_compressed_size: size,
        thumb_format: ObjectFormatCode::UNDEFINED,
        thumb_compressed_size: 0,
        thumb_pix_width: 0,
        thumb_pix_height: 0,
        image_pix_width: 6000,
        image_pix_height: 4000,
        image_bit_depth: 24,
        parent_object: ObjectHandle::ROOT,
        association_type: 0,
        association_desc: 0,
        sequence_number: 0,
        filename: filename.to_string(),
        capture_date: PtpDateTime::parse("20250812T142530"),
        modification_date: None,
        keywords: String::new(),
    }
}
