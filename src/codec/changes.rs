//! Decoder for the packed change-record stream some vendors return in
//! place of interrupt events.
//!
//! The stream is a sequence of `{u32 size, u32 kind, payload}` records
//! where `size` counts the whole record including the eight-byte head.
//! A record of kind zero terminates the stream early. Devices pad the
//! tail of the data phase with garbage, so any malformed record ends
//! the walk and the records decoded so far are returned.

use tracing::debug;

use crate::codec::{Endian, WireReader};
use crate::proto::vendor::canon::eos::changes;
use crate::proto::{DevicePropCode, ObjectFormatCode, ObjectHandle, StorageId};

/// One change reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    /// A new object exists and can be fetched.
    ObjectAdded {
        /// Handle of the new object.
        handle: ObjectHandle,
        /// Store holding the object.
        storage_id: StorageId,
        /// Object format.
        format: ObjectFormatCode,
        /// Filename, empty if the record was too short to carry one.
        filename: String,
    },
    /// An object disappeared.
    ObjectRemoved {
        /// Handle of the removed object.
        handle: ObjectHandle,
    },
    /// The device asks the host to download an object it will not keep.
    RequestObjectTransfer {
        /// Handle to download.
        handle: ObjectHandle,
    },
    /// Metadata of an object changed.
    ObjectInfoChanged {
        /// Handle of the changed object.
        handle: ObjectHandle,
    },
    /// A device property changed value.
    PropertyChanged {
        /// The property that changed.
        property: DevicePropCode,
        /// Raw new value, datatype known only from the descriptor.
        value: Vec<u8>,
    },
    /// Overall camera status word.
    CameraStatus(u32),
    /// Autofocus result word, zero means focus achieved.
    FocusResult(u32),
    /// A record this crate does not interpret.
    Unknown {
        /// Vendor record kind.
        kind: u32,
        /// Raw payload.
        data: Vec<u8>,
    },
}

/// Walks a change-record stream, returning every record decoded before
/// the terminator or the first malformed record.
#[must_use]
pub fn decode_changes(bytes: &[u8], endian: Endian) -> Vec<ChangeRecord> {
    let mut reader = WireReader::new(bytes, endian);
    let mut records = Vec::new();

    loop {
        if reader.remaining() < 8 {
            break;
        }
        let Ok(size) = reader.u32("record size") else {
            break;
        };
        let Ok(kind) = reader.u32("record kind") else {
            break;
        };
        if size < 8 {
            debug!(size, "undersized change record, stopping");
            break;
        }
        let payload_len = (size - 8) as usize;
        if payload_len > reader.remaining() {
            debug!(
                size,
                remaining = reader.remaining(),
                "change record overruns buffer, stopping"
            );
            break;
        }
        if kind == 0 {
            break;
        }
        let Ok(payload) = reader.take(payload_len, "record payload") else {
            break;
        };
        records.push(decode_record(kind, payload, endian));
    }

    records
}

fn decode_record(kind: u32, payload: &[u8], endian: Endian) -> ChangeRecord {
    let mut reader = WireReader::new(payload, endian);
    match kind {
        changes::OBJECT_ADDED => decode_object_added(&mut reader).unwrap_or_else(|| {
            ChangeRecord::Unknown {
                kind,
                data: payload.to_vec(),
            }
        }),
        changes::OBJECT_REMOVED => match reader.u32("handle") {
            Ok(h) => ChangeRecord::ObjectRemoved {
                handle: ObjectHandle(h),
            },
            Err(_) => ChangeRecord::Unknown {
                kind,
                data: payload.to_vec(),
            },
        },
        changes::REQUEST_OBJECT_TRANSFER => match reader.u32("handle") {
            Ok(h) => ChangeRecord::RequestObjectTransfer {
                handle: ObjectHandle(h),
            },
            Err(_) => ChangeRecord::Unknown {
                kind,
                data: payload.to_vec(),
            },
        },
        changes::OBJECT_INFO_CHANGED => match reader.u32("handle") {
            Ok(h) => ChangeRecord::ObjectInfoChanged {
                handle: ObjectHandle(h),
            },
            Err(_) => ChangeRecord::Unknown {
                kind,
                data: payload.to_vec(),
            },
        },
        changes::PROP_VALUE_CHANGED => match reader.u32("property code") {
            Ok(code) => ChangeRecord::PropertyChanged {
                property: DevicePropCode(code as u16),
                value: reader.rest().to_vec(),
            },
            Err(_) => ChangeRecord::Unknown {
                kind,
                data: payload.to_vec(),
            },
        },
        changes::CAMERA_STATUS_CHANGED => match reader.u32("status") {
            Ok(status) => ChangeRecord::CameraStatus(status),
            Err(_) => ChangeRecord::Unknown {
                kind,
                data: payload.to_vec(),
            },
        },
        changes::AF_RESULT => match reader.u32("focus result") {
            Ok(result) => ChangeRecord::FocusResult(result),
            Err(_) => ChangeRecord::Unknown {
                kind,
                data: payload.to_vec(),
            },
        },
        _ => ChangeRecord::Unknown {
            kind,
            data: payload.to_vec(),
        },
    }
}

/// Object-added records carry fixed-offset fields followed by a
/// NUL-terminated name at payload offset 32.
fn decode_object_added(reader: &mut WireReader<'_>) -> Option<ChangeRecord> {
    let handle = ObjectHandle(reader.u32("handle").ok()?);
    let storage_id = StorageId(reader.u32("storage id").ok()?);
    let format = ObjectFormatCode(reader.u32("format").ok()? as u16);

    // Size, parent and padding sit between the format and the name.
    let filename = if reader.skip(20, "object added padding").is_ok() {
        let tail = reader.rest();
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        String::from_utf8_lossy(&tail[..end]).into_owned()
    } else {
        String::new()
    };

    Some(ChangeRecord::ObjectAdded {
        handle,
        storage_id,
        format,
        filename,
    })
}
