//! Device descriptor codec.

use tracing::debug;

use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::CodecError;
use crate::proto::{DevicePropCode, EventCode, ObjectFormatCode, OpCode, VendorExtensionId};

/// The device descriptor returned by `GetDeviceInfo`.
///
/// Fetched once at session open and owned by the session. Vendor fixups
/// may append operation and property codes the firmware supports but
/// does not advertise; the advertised-set checks in the session consult
/// the merged lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// PTP standard version ×100 (100 = 1.0).
    pub standard_version: u16,
    /// Vendor extension in effect.
    pub vendor_extension_id: VendorExtensionId,
    /// Vendor extension version ×100.
    pub vendor_extension_version: u16,
    /// Vendor extension description.
    pub vendor_extension_desc: String,
    /// Functional mode the device is in.
    pub functional_mode: u16,
    /// Operations the device claims to support.
    pub operations: Vec<OpCode>,
    /// Events the device claims to emit.
    pub events: Vec<EventCode>,
    /// Device properties the device exposes.
    pub device_properties: Vec<DevicePropCode>,
    /// Formats the device can capture to.
    pub capture_formats: Vec<ObjectFormatCode>,
    /// Formats the device can store.
    pub image_formats: Vec<ObjectFormatCode>,
    /// Manufacturer string.
    pub manufacturer: String,
    /// Model string.
    pub model: String,
    /// Firmware version string.
    pub device_version: String,
    /// Serial number string.
    pub serial_number: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            standard_version: 100,
            vendor_extension_id: VendorExtensionId(0),
            vendor_extension_version: 0,
            vendor_extension_desc: String::new(),
            functional_mode: 0,
            operations: Vec::new(),
            events: Vec::new(),
            device_properties: Vec::new(),
            capture_formats: Vec::new(),
            image_formats: Vec::new(),
            manufacturer: String::new(),
            model: String::new(),
            device_version: String::new(),
            serial_number: String::new(),
        }
    }
}

impl DeviceInfo {
    /// Decodes a descriptor, keeping whatever prefix a truncating
    /// firmware managed to send.
    #[must_use]
    pub fn decode(bytes: &[u8], endian: Endian) -> Self {
        let mut reader = WireReader::new(bytes, endian);
        let mut info = Self::default();
        if let Err(err) = Self::fill(&mut reader, &mut info) {
            debug!(%err, consumed = reader.consumed(), "truncated DeviceInfo");
        }
        info
    }

    fn fill(reader: &mut WireReader<'_>, info: &mut Self) -> Result<(), CodecError> {
        info.standard_version = reader.u16("standard version")?;
        info.vendor_extension_id = VendorExtensionId(reader.u32("vendor extension id")?);
        info.vendor_extension_version = reader.u16("vendor extension version")?;
        info.vendor_extension_desc = reader.string()?;
        info.functional_mode = reader.u16("functional mode")?;
        info.operations = reader
            .array_u16("operations")?
            .into_iter()
            .map(OpCode)
            .collect();
        info.events = reader
            .array_u16("events")?
            .into_iter()
            .map(EventCode)
            .collect();
        info.device_properties = reader
            .array_u16("device properties")?
            .into_iter()
            .map(DevicePropCode)
            .collect();
        info.capture_formats = reader
            .array_u16("capture formats")?
            .into_iter()
            .map(ObjectFormatCode)
            .collect();
        info.image_formats = reader
            .array_u16("image formats")?
            .into_iter()
            .map(ObjectFormatCode)
            .collect();
        info.manufacturer = reader.string()?;
        info.model = reader.string()?;
        info.device_version = reader.string()?;
        info.serial_number = reader.string()?;
        Ok(())
    }

    /// Packs the descriptor.
    pub fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        writer.u16(self.standard_version);
        writer.u32(self.vendor_extension_id.0);
        writer.u16(self.vendor_extension_version);
        writer.string(&self.vendor_extension_desc)?;
        writer.u16(self.functional_mode);
        writer.array_u16(&self.operations.iter().map(|c| c.0).collect::<Vec<_>>());
        writer.array_u16(&self.events.iter().map(|c| c.0).collect::<Vec<_>>());
        writer.array_u16(&self.device_properties.iter().map(|c| c.0).collect::<Vec<_>>());
        writer.array_u16(&self.capture_formats.iter().map(|c| c.0).collect::<Vec<_>>());
        writer.array_u16(&self.image_formats.iter().map(|c| c.0).collect::<Vec<_>>());
        writer.string(&self.manufacturer)?;
        writer.string(&self.model)?;
        writer.string(&self.device_version)?;
        writer.string(&self.serial_number)?;
        Ok(())
    }

    /// Packs the descriptor into a fresh buffer.
    pub fn to_bytes(&self, endian: Endian) -> Result<Vec<u8>, CodecError> {
        let mut writer = WireWriter::new(endian);
        self.encode(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// True if the device advertises (or a fixup granted) the operation.
    #[must_use]
    pub fn supports_operation(&self, op: OpCode) -> bool {
        self.operations.contains(&op)
    }

    /// True if the device advertises the event.
    #[must_use]
    pub fn supports_event(&self, event: EventCode) -> bool {
        self.events.contains(&event)
    }

    /// True if the device exposes the property.
    #[must_use]
    pub fn supports_property(&self, prop: DevicePropCode) -> bool {
        self.device_properties.contains(&prop)
    }

    /// True for MTP devices (Microsoft vendor extension).
    #[must_use]
    pub fn is_mtp(&self) -> bool {
        self.vendor_extension_id == VendorExtensionId::MICROSOFT
    }

    /// Appends operation codes not already advertised.
    pub fn add_operations(&mut self, ops: &[OpCode]) {
        for &op in ops {
            if !self.operations.contains(&op) {
                self.operations.push(op);
            }
        }
    }

    /// Appends property codes not already advertised.
    pub fn add_properties(&mut self, props: &[DevicePropCode]) {
        for &prop in props {
            if !self.device_properties.contains(&prop) {
                self.device_properties.push(prop);
            }
        }
    }
}
