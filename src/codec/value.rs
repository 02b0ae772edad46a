//! Property values.
//!
//! Device properties are self-describing on the wire only through the
//! datatype code carried in their descriptor, so decoding always takes
//! the expected [`DataTypeCode`] from context. Values own their
//! contents; copying a value into a cached descriptor is a deep copy.

use crate::codec::{WireReader, WireWriter};
use crate::error::CodecError;
use crate::proto::DataTypeCode;

/// A typed PTP property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Signed 8 bit.
    I8(i8),
    /// Unsigned 8 bit.
    U8(u8),
    /// Signed 16 bit.
    I16(i16),
    /// Unsigned 16 bit.
    U16(u16),
    /// Signed 32 bit.
    I32(i32),
    /// Unsigned 32 bit.
    U32(u32),
    /// Signed 64 bit.
    I64(i64),
    /// Unsigned 64 bit.
    U64(u64),
    /// Signed 128 bit.
    I128(i128),
    /// Unsigned 128 bit.
    U128(u128),
    /// UTF-16 string.
    Text(String),
    /// Homogeneous array of any scalar flavor above.
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Decodes a value of the given wire type.
    pub fn decode(
        reader: &mut WireReader<'_>,
        datatype: DataTypeCode,
    ) -> Result<Self, CodecError> {
        if datatype.is_array() {
            let elem = datatype.element();
            let elem_size = scalar_size(elem)?;
            let count = reader.guarded_count(elem_size, "value array count")?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(Self::decode_scalar(reader, elem)?);
            }
            return Ok(Self::Array(items));
        }
        Self::decode_scalar(reader, datatype)
    }

    fn decode_scalar(
        reader: &mut WireReader<'_>,
        datatype: DataTypeCode,
    ) -> Result<Self, CodecError> {
        Ok(match datatype {
            DataTypeCode::INT8 => Self::I8(reader.i8("i8 value")?),
            DataTypeCode::UINT8 => Self::U8(reader.u8("u8 value")?),
            DataTypeCode::INT16 => Self::I16(reader.i16("i16 value")?),
            DataTypeCode::UINT16 => Self::U16(reader.u16("u16 value")?),
            DataTypeCode::INT32 => Self::I32(reader.i32("i32 value")?),
            DataTypeCode::UINT32 => Self::U32(reader.u32("u32 value")?),
            DataTypeCode::INT64 => Self::I64(reader.i64("i64 value")?),
            DataTypeCode::UINT64 => Self::U64(reader.u64("u64 value")?),
            DataTypeCode::INT128 => Self::I128(reader.i128("i128 value")?),
            DataTypeCode::UINT128 => Self::U128(reader.u128("u128 value")?),
            DataTypeCode::STRING => Self::Text(reader.string()?),
            other => {
                return Err(CodecError::InvalidValue {
                    what: "datatype code",
                    value: u64::from(other.0),
                });
            }
        })
    }

    /// Encodes the value in its natural wire type.
    pub fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        match self {
            Self::I8(v) => writer.i8(*v),
            Self::U8(v) => writer.u8(*v),
            Self::I16(v) => writer.i16(*v),
            Self::U16(v) => writer.u16(*v),
            Self::I32(v) => writer.i32(*v),
            Self::U32(v) => writer.u32(*v),
            Self::I64(v) => writer.i64(*v),
            Self::U64(v) => writer.u64(*v),
            Self::I128(v) => writer.i128(*v),
            Self::U128(v) => writer.u128(*v),
            Self::Text(s) => writer.string(s)?,
            Self::Array(items) => {
                writer.u32(items.len() as u32);
                for item in items {
                    item.encode(writer)?;
                }
            }
        }
        Ok(())
    }

    /// The wire type this value encodes as.
    ///
    /// Empty arrays cannot name their element type and report
    /// [`DataTypeCode::UNDEFINED`]; encode them against a descriptor.
    #[must_use]
    pub fn datatype(&self) -> DataTypeCode {
        match self {
            Self::I8(_) => DataTypeCode::INT8,
            Self::U8(_) => DataTypeCode::UINT8,
            Self::I16(_) => DataTypeCode::INT16,
            Self::U16(_) => DataTypeCode::UINT16,
            Self::I32(_) => DataTypeCode::INT32,
            Self::U32(_) => DataTypeCode::UINT32,
            Self::I64(_) => DataTypeCode::INT64,
            Self::U64(_) => DataTypeCode::UINT64,
            Self::I128(_) => DataTypeCode::INT128,
            Self::U128(_) => DataTypeCode::UINT128,
            Self::Text(_) => DataTypeCode::STRING,
            Self::Array(items) => match items.first() {
                Some(first) => DataTypeCode(first.datatype().0 | 0x4000),
                None => DataTypeCode::UNDEFINED,
            },
        }
    }

    /// Widens any unsigned scalar to u32, `None` otherwise.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U8(v) => Some(u32::from(*v)),
            Self::U16(v) => Some(u32::from(*v)),
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens any integer scalar to i64, `None` for the rest.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(*v)),
            Self::U8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::U32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrows the string contents, `None` for non-text values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Wire size in bytes of a scalar datatype.
pub(crate) fn scalar_size(datatype: DataTypeCode) -> Result<usize, CodecError> {
    Ok(match datatype {
        DataTypeCode::INT8 | DataTypeCode::UINT8 => 1,
        DataTypeCode::INT16 | DataTypeCode::UINT16 => 2,
        DataTypeCode::INT32 | DataTypeCode::UINT32 => 4,
        DataTypeCode::INT64 | DataTypeCode::UINT64 => 8,
        DataTypeCode::INT128 | DataTypeCode::UINT128 => 16,
        other => {
            return Err(CodecError::InvalidValue {
                what: "scalar datatype",
                value: u64::from(other.0),
            });
        }
    })
}
