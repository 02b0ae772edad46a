//! Object descriptor codec.

use tracing::debug;

use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::CodecError;
use crate::proto::{ObjectFormatCode, ObjectHandle, StorageId, protection};
use crate::types::PtpDateTime;

/// The object descriptor returned by `GetObjectInfo`.
///
/// Objects form a forest over [`parent_object`](Self::parent_object)
/// edges, with [`ObjectHandle::ROOT`] as the absent parent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectInfo {
    /// Store holding the object.
    pub storage_id: StorageId,
    /// Format of the object payload.
    pub object_format: ObjectFormatCode,
    /// Write protection status.
    pub protection_status: u16,
    /// Payload size in bytes as stored.
    pub object_compressed_size: u32,
    /// Format of the thumbnail.
    pub thumb_format: ObjectFormatCode,
    /// Thumbnail size in bytes.
    pub thumb_compressed_size: u32,
    /// Thumbnail width in pixels.
    pub thumb_pix_width: u32,
    /// Thumbnail height in pixels.
    pub thumb_pix_height: u32,
    /// Image width in pixels.
    pub image_pix_width: u32,
    /// Image height in pixels.
    pub image_pix_height: u32,
    /// Image bit depth.
    pub image_bit_depth: u32,
    /// Containing folder, or [`ObjectHandle::ROOT`].
    pub parent_object: ObjectHandle,
    /// Association type for folders.
    pub association_type: u16,
    /// Association qualifier.
    pub association_desc: u32,
    /// Capture sequence number.
    pub sequence_number: u32,
    /// File name.
    pub filename: String,
    /// When the object was captured.
    pub capture_date: Option<PtpDateTime>,
    /// When the object was last modified.
    pub modification_date: Option<PtpDateTime>,
    /// Free-form keywords.
    pub keywords: String,
}

impl ObjectInfo {
    /// Decodes a descriptor, keeping whatever prefix a truncating
    /// firmware managed to send.
    #[must_use]
    pub fn decode(bytes: &[u8], endian: Endian) -> Self {
        let mut reader = WireReader::new(bytes, endian);
        let mut info = Self::default();
        if let Err(err) = Self::fill(&mut reader, &mut info) {
            debug!(%err, consumed = reader.consumed(), "truncated ObjectInfo");
        }
        info
    }

    fn fill(reader: &mut WireReader<'_>, info: &mut Self) -> Result<(), CodecError> {
        info.storage_id = StorageId(reader.u32("storage id")?);
        info.object_format = ObjectFormatCode(reader.u16("object format")?);
        info.protection_status = reader.u16("protection status")?;
        info.object_compressed_size = reader.u32("object size")?;
        info.thumb_format = ObjectFormatCode(reader.u16("thumb format")?);
        info.thumb_compressed_size = reader.u32("thumb size")?;
        info.thumb_pix_width = reader.u32("thumb width")?;
        info.thumb_pix_height = reader.u32("thumb height")?;
        info.image_pix_width = reader.u32("image width")?;
        info.image_pix_height = reader.u32("image height")?;
        info.image_bit_depth = reader.u32("image bit depth")?;
        info.parent_object = ObjectHandle(reader.u32("parent object")?);
        info.association_type = reader.u16("association type")?;
        info.association_desc = reader.u32("association desc")?;
        info.sequence_number = reader.u32("sequence number")?;
        info.filename = reader.string()?;
        info.capture_date = PtpDateTime::parse(&reader.string()?);
        info.modification_date = PtpDateTime::parse(&reader.string()?);
        info.keywords = reader.string()?;
        Ok(())
    }

    /// Packs the descriptor.
    pub fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        writer.u32(self.storage_id.0);
        writer.u16(self.object_format.0);
        writer.u16(self.protection_status);
        writer.u32(self.object_compressed_size);
        writer.u16(self.thumb_format.0);
        writer.u32(self.thumb_compressed_size);
        writer.u32(self.thumb_pix_width);
        writer.u32(self.thumb_pix_height);
        writer.u32(self.image_pix_width);
        writer.u32(self.image_pix_height);
        writer.u32(self.image_bit_depth);
        writer.u32(self.parent_object.0);
        writer.u16(self.association_type);
        writer.u32(self.association_desc);
        writer.u32(self.sequence_number);
        writer.string(&self.filename)?;
        writer.string(&self.capture_date.map(|d| d.to_wire()).unwrap_or_default())?;
        writer.string(
            &self
                .modification_date
                .map(|d| d.to_wire())
                .unwrap_or_default(),
        )?;
        writer.string(&self.keywords)?;
        Ok(())
    }

    /// Packs the descriptor into a fresh buffer.
    pub fn to_bytes(&self, endian: Endian) -> Result<Vec<u8>, CodecError> {
        let mut writer = WireWriter::new(endian);
        self.encode(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// True for folders.
    #[must_use]
    pub fn is_association(&self) -> bool {
        self.object_format == ObjectFormatCode::ASSOCIATION
    }

    /// True when the device marks the object read only.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.protection_status == protection::READ_ONLY
    }
}
