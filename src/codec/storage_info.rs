//! Storage descriptor codec.

use tracing::debug;

use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::CodecError;
use crate::proto::storage;

/// The storage descriptor returned by `GetStorageInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageInfo {
    /// Kind of store (fixed/removable, RAM/ROM).
    pub storage_type: u16,
    /// Filesystem layout.
    pub filesystem_type: u16,
    /// Read/write capability.
    pub access_capability: u16,
    /// Total capacity in bytes.
    pub max_capacity: u64,
    /// Free space in bytes.
    pub free_space_bytes: u64,
    /// Free space as an image count, `0xFFFF_FFFF` when unknown.
    pub free_space_images: u32,
    /// Description of the store.
    pub description: String,
    /// Volume label.
    pub volume_label: String,
}

impl StorageInfo {
    /// Decodes a descriptor, keeping whatever prefix a truncating
    /// firmware managed to send.
    #[must_use]
    pub fn decode(bytes: &[u8], endian: Endian) -> Self {
        let mut reader = WireReader::new(bytes, endian);
        let mut info = Self::default();
        if let Err(err) = Self::fill(&mut reader, &mut info) {
            debug!(%err, consumed = reader.consumed(), "truncated StorageInfo");
        }
        info
    }

    fn fill(reader: &mut WireReader<'_>, info: &mut Self) -> Result<(), CodecError> {
        info.storage_type = reader.u16("storage type")?;
        info.filesystem_type = reader.u16("filesystem type")?;
        info.access_capability = reader.u16("access capability")?;
        info.max_capacity = reader.u64("max capacity")?;
        info.free_space_bytes = reader.u64("free space bytes")?;
        info.free_space_images = reader.u32("free space images")?;
        info.description = reader.string()?;
        info.volume_label = reader.string()?;
        Ok(())
    }

    /// Packs the descriptor.
    pub fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        writer.u16(self.storage_type);
        writer.u16(self.filesystem_type);
        writer.u16(self.access_capability);
        writer.u64(self.max_capacity);
        writer.u64(self.free_space_bytes);
        writer.u32(self.free_space_images);
        writer.string(&self.description)?;
        writer.string(&self.volume_label)?;
        Ok(())
    }

    /// Packs the descriptor into a fresh buffer.
    pub fn to_bytes(&self, endian: Endian) -> Result<Vec<u8>, CodecError> {
        let mut writer = WireWriter::new(endian);
        self.encode(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// True when objects can be written to this store.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.access_capability == storage::ACCESS_READ_WRITE
    }

    /// True for removable media.
    #[must_use]
    pub fn is_removable(&self) -> bool {
        matches!(
            self.storage_type,
            storage::TYPE_REMOVABLE_RAM | storage::TYPE_REMOVABLE_ROM
        )
    }
}
