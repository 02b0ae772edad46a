//! Device property descriptor codec.
//!
//! Truncated descriptors are common in the field: firmware sizes the
//! data phase before serializing and cuts the form section off. Decode
//! therefore keeps everything up to the truncation point, leaving the
//! values `None` and the form [`PropForm::None`].

use tracing::debug;

use crate::codec::value::{PropertyValue, scalar_size};
use crate::codec::{Endian, WireReader, WireWriter};
use crate::error::CodecError;
use crate::proto::{DataTypeCode, DevicePropCode};

/// Whether the host may write the property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropAccess {
    /// Host may only read.
    #[default]
    ReadOnly,
    /// Host may read and write.
    ReadWrite,
}

impl PropAccess {
    fn from_wire(raw: u8) -> Self {
        if raw == 1 { Self::ReadWrite } else { Self::ReadOnly }
    }

    fn to_wire(self) -> u8 {
        match self {
            Self::ReadOnly => 0,
            Self::ReadWrite => 1,
        }
    }
}

/// Constraint on the values a property accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropForm {
    /// Any value of the datatype.
    #[default]
    None,
    /// Closed interval with a step size.
    Range {
        /// Smallest accepted value.
        min: PropertyValue,
        /// Largest accepted value.
        max: PropertyValue,
        /// Increment between accepted values.
        step: PropertyValue,
    },
    /// Explicit list of accepted values.
    Enumeration {
        /// The accepted values, in device order.
        values: Vec<PropertyValue>,
    },
}

const FORM_NONE: u8 = 0;
const FORM_RANGE: u8 = 1;
const FORM_ENUM: u8 = 2;

/// The property descriptor returned by `GetDevicePropDesc`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DevicePropDesc {
    /// Property this descriptor describes.
    pub code: DevicePropCode,
    /// Wire type of the value.
    pub datatype: DataTypeCode,
    /// Host access.
    pub access: PropAccess,
    /// Factory default, absent if the descriptor was cut short.
    pub factory_default: Option<PropertyValue>,
    /// Current value, absent if the descriptor was cut short.
    pub current: Option<PropertyValue>,
    /// Accepted-value constraint.
    pub form: PropForm,
}

impl DevicePropDesc {
    /// Decodes a descriptor, keeping whatever prefix a truncating
    /// firmware managed to send.
    #[must_use]
    pub fn decode(bytes: &[u8], endian: Endian) -> Self {
        let mut reader = WireReader::new(bytes, endian);
        let mut desc = Self::default();
        if let Err(err) = Self::fill(&mut reader, &mut desc) {
            debug!(%err, consumed = reader.consumed(), "truncated DevicePropDesc");
        }
        desc
    }

    fn fill(reader: &mut WireReader<'_>, desc: &mut Self) -> Result<(), CodecError> {
        desc.code = DevicePropCode(reader.u16("property code")?);
        desc.datatype = DataTypeCode(reader.u16("datatype")?);
        desc.access = PropAccess::from_wire(reader.u8("get/set flag")?);
        desc.factory_default = Some(PropertyValue::decode(reader, desc.datatype)?);
        desc.current = Some(PropertyValue::decode(reader, desc.datatype)?);

        let form_flag = reader.u8("form flag")?;
        desc.form = match form_flag {
            FORM_NONE => PropForm::None,
            FORM_RANGE => PropForm::Range {
                min: PropertyValue::decode(reader, desc.datatype)?,
                max: PropertyValue::decode(reader, desc.datatype)?,
                step: PropertyValue::decode(reader, desc.datatype)?,
            },
            FORM_ENUM => {
                // Enumeration counts are u16, unlike every other array.
                let count = reader.u16("enum count")?;
                let min_elem = min_elem_size(desc.datatype)?;
                if (count as usize).saturating_mul(min_elem) > reader.remaining() {
                    return Err(CodecError::CountOverrun {
                        count: u32::from(count),
                        remaining: reader.remaining(),
                    });
                }
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(PropertyValue::decode(reader, desc.datatype)?);
                }
                PropForm::Enumeration { values }
            }
            other => {
                debug!(form = other, code = %desc.code, "unknown property form, treating as none");
                PropForm::None
            }
        };
        Ok(())
    }

    /// Packs the descriptor.
    pub fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        writer.u16(self.code.0);
        writer.u16(self.datatype.0);
        writer.u8(self.access.to_wire());
        if let Some(v) = &self.factory_default {
            v.encode(writer)?;
        }
        if let Some(v) = &self.current {
            v.encode(writer)?;
        }
        match &self.form {
            PropForm::None => writer.u8(FORM_NONE),
            PropForm::Range { min, max, step } => {
                writer.u8(FORM_RANGE);
                min.encode(writer)?;
                max.encode(writer)?;
                step.encode(writer)?;
            }
            PropForm::Enumeration { values } => {
                writer.u8(FORM_ENUM);
                writer.u16(values.len() as u16);
                for v in values {
                    v.encode(writer)?;
                }
            }
        }
        Ok(())
    }

    /// Packs the descriptor into a fresh buffer.
    pub fn to_bytes(&self, endian: Endian) -> Result<Vec<u8>, CodecError> {
        let mut writer = WireWriter::new(endian);
        self.encode(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// True if the host may set this property.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.access == PropAccess::ReadWrite
    }

    /// True if `value` satisfies the descriptor's form constraint.
    /// Integer comparison only; string forms accept everything.
    #[must_use]
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match &self.form {
            PropForm::None => true,
            PropForm::Range { min, max, .. } => {
                match (value.as_i64(), min.as_i64(), max.as_i64()) {
                    (Some(v), Some(lo), Some(hi)) => v >= lo && v <= hi,
                    _ => true,
                }
            }
            PropForm::Enumeration { values } => values.contains(value),
        }
    }
}

/// Smallest wire footprint of one element of `datatype`, used to bound
/// enumeration counts before allocating.
fn min_elem_size(datatype: DataTypeCode) -> Result<usize, CodecError> {
    if datatype == DataTypeCode::STRING {
        // An empty string is a single zero byte.
        return Ok(1);
    }
    scalar_size(datatype.element())
}
