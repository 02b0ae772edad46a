//! PTP wire codec.
//!
//! Pure pack/unpack for everything that crosses the wire: integers,
//! UTF-16 strings, counted arrays and the composite descriptors
//! (device, object, storage, property). All functions are total over
//! arbitrary input bytes: decodes check remaining length before every
//! consume and either fail with a [`CodecError`] or, for descriptor
//! tails that real firmware truncates, fall back to defaults.
//!
//! Byte order is explicit. Nearly every device is little-endian but the
//! protocol permits both, so the session's [`Endian`] threads through
//! every reader and writer instead of being baked in.

pub mod changes;
pub mod device_info;
pub mod object_info;
pub mod prop_desc;
pub mod storage_info;
pub mod value;

#[cfg(test)]
mod tests;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::proto::MAX_STRING_CHARS;

pub use changes::{ChangeRecord, decode_changes};
pub use device_info::DeviceInfo;
pub use object_info::ObjectInfo;
pub use prop_desc::{DevicePropDesc, PropAccess, PropForm};
pub use storage_info::StorageInfo;
pub use value::PropertyValue;

/// Byte order of the device's wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    /// Little endian (the common case).
    #[default]
    Little,
    /// Big endian.
    Big,
}

impl Endian {
    #[inline]
    pub(crate) fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Self::Little => LittleEndian::read_u16(buf),
            Self::Big => BigEndian::read_u16(buf),
        }
    }

    #[inline]
    pub(crate) fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(buf),
            Self::Big => BigEndian::read_u32(buf),
        }
    }

    #[inline]
    pub(crate) fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Self::Little => LittleEndian::read_u64(buf),
            Self::Big => BigEndian::read_u64(buf),
        }
    }

    #[inline]
    pub(crate) fn read_u128(self, buf: &[u8]) -> u128 {
        match self {
            Self::Little => LittleEndian::read_u128(buf),
            Self::Big => BigEndian::read_u128(buf),
        }
    }

    #[inline]
    pub(crate) fn write_u16(self, buf: &mut [u8], value: u16) {
        match self {
            Self::Little => LittleEndian::write_u16(buf, value),
            Self::Big => BigEndian::write_u16(buf, value),
        }
    }

    #[inline]
    pub(crate) fn write_u32(self, buf: &mut [u8], value: u32) {
        match self {
            Self::Little => LittleEndian::write_u32(buf, value),
            Self::Big => BigEndian::write_u32(buf, value),
        }
    }

    #[inline]
    pub(crate) fn write_u64(self, buf: &mut [u8], value: u64) {
        match self {
            Self::Little => LittleEndian::write_u64(buf, value),
            Self::Big => BigEndian::write_u64(buf, value),
        }
    }

    #[inline]
    pub(crate) fn write_u128(self, buf: &mut [u8], value: u128) {
        match self {
            Self::Little => LittleEndian::write_u128(buf, value),
            Self::Big => BigEndian::write_u128(buf, value),
        }
    }
}

/// Cursor over a borrowed buffer with checked, endian-aware reads.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// True once the buffer is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// The byte order this reader decodes with.
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The unconsumed tail of the buffer.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                what,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Skips `n` bytes.
    pub fn skip(&mut self, n: usize, what: &'static str) -> Result<(), CodecError> {
        self.take(n, what).map(|_| ())
    }

    /// Reads one unsigned byte.
    pub fn u8(&mut self, what: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, what)?[0])
    }

    /// Reads one signed byte.
    pub fn i8(&mut self, what: &'static str) -> Result<i8, CodecError> {
        Ok(self.u8(what)? as i8)
    }

    /// Reads a u16.
    pub fn u16(&mut self, what: &'static str) -> Result<u16, CodecError> {
        let endian = self.endian;
        Ok(endian.read_u16(self.take(2, what)?))
    }

    /// Reads an i16.
    pub fn i16(&mut self, what: &'static str) -> Result<i16, CodecError> {
        Ok(self.u16(what)? as i16)
    }

    /// Reads a u32.
    pub fn u32(&mut self, what: &'static str) -> Result<u32, CodecError> {
        let endian = self.endian;
        Ok(endian.read_u32(self.take(4, what)?))
    }

    /// Reads an i32.
    pub fn i32(&mut self, what: &'static str) -> Result<i32, CodecError> {
        Ok(self.u32(what)? as i32)
    }

    /// Reads a u64.
    pub fn u64(&mut self, what: &'static str) -> Result<u64, CodecError> {
        let endian = self.endian;
        Ok(endian.read_u64(self.take(8, what)?))
    }

    /// Reads an i64.
    pub fn i64(&mut self, what: &'static str) -> Result<i64, CodecError> {
        Ok(self.u64(what)? as i64)
    }

    /// Reads a u128.
    pub fn u128(&mut self, what: &'static str) -> Result<u128, CodecError> {
        let endian = self.endian;
        Ok(endian.read_u128(self.take(16, what)?))
    }

    /// Reads an i128.
    pub fn i128(&mut self, what: &'static str) -> Result<i128, CodecError> {
        Ok(self.u128(what)? as i128)
    }

    /// Reads a counted element total, refusing counts that would read
    /// past the buffer. Called before any allocation sized by the count.
    pub fn guarded_count(
        &mut self,
        elem_size: usize,
        what: &'static str,
    ) -> Result<usize, CodecError> {
        let count = self.u32(what)?;
        let needed = (count as usize).checked_mul(elem_size);
        match needed {
            Some(n) if n <= self.remaining() => Ok(count as usize),
            _ => Err(CodecError::CountOverrun {
                count,
                remaining: self.remaining(),
            }),
        }
    }

    /// Reads a counted u16 array.
    pub fn array_u16(&mut self, what: &'static str) -> Result<Vec<u16>, CodecError> {
        let count = self.guarded_count(2, what)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.u16(what)?);
        }
        Ok(out)
    }

    /// Reads a counted u32 array.
    pub fn array_u32(&mut self, what: &'static str) -> Result<Vec<u32>, CodecError> {
        let count = self.guarded_count(4, what)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.u32(what)?);
        }
        Ok(out)
    }

    /// Reads a PTP string: a length byte counting UTF-16 code units
    /// including the terminator, then that many units.
    ///
    /// A zero length byte is the empty string. Invalid UTF-16 falls back
    /// to 7-bit transliteration with `?` standing in for anything
    /// non-ASCII, mirroring what cameras themselves do for foreign
    /// filenames.
    pub fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u8("string length")? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let endian = self.endian;
        let raw = self.take(len * 2, "string body")?;
        let mut units: Vec<u16> = raw.chunks_exact(2).map(|c| endian.read_u16(c)).collect();
        while units.last() == Some(&0) {
            units.pop();
        }
        match String::from_utf16(&units) {
            Ok(s) => Ok(s),
            Err(_) => Ok(units
                .iter()
                .map(|&u| if u < 0x80 { u as u8 as char } else { '?' })
                .collect()),
        }
    }
}

/// Growable buffer with endian-aware writes.
#[derive(Debug)]
pub struct WireWriter {
    buf: Vec<u8>,
    endian: Endian,
}

impl WireWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            endian,
        }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(endian: Endian, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            endian,
        }
    }

    /// Consumes the writer, yielding the packed bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends one unsigned byte.
    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Appends one signed byte.
    pub fn i8(&mut self, value: i8) {
        self.u8(value as u8);
    }

    /// Appends a u16.
    pub fn u16(&mut self, value: u16) {
        let mut tmp = [0u8; 2];
        self.endian.write_u16(&mut tmp, value);
        self.buf.extend_from_slice(&tmp);
    }

    /// Appends an i16.
    pub fn i16(&mut self, value: i16) {
        self.u16(value as u16);
    }

    /// Appends a u32.
    pub fn u32(&mut self, value: u32) {
        let mut tmp = [0u8; 4];
        self.endian.write_u32(&mut tmp, value);
        self.buf.extend_from_slice(&tmp);
    }

    /// Appends an i32.
    pub fn i32(&mut self, value: i32) {
        self.u32(value as u32);
    }

    /// Appends a u64.
    pub fn u64(&mut self, value: u64) {
        let mut tmp = [0u8; 8];
        self.endian.write_u64(&mut tmp, value);
        self.buf.extend_from_slice(&tmp);
    }

    /// Appends an i64.
    pub fn i64(&mut self, value: i64) {
        self.u64(value as u64);
    }

    /// Appends a u128.
    pub fn u128(&mut self, value: u128) {
        let mut tmp = [0u8; 16];
        self.endian.write_u128(&mut tmp, value);
        self.buf.extend_from_slice(&tmp);
    }

    /// Appends an i128.
    pub fn i128(&mut self, value: i128) {
        self.u128(value as u128);
    }

    /// Appends raw bytes unchanged.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends a counted u16 array.
    pub fn array_u16(&mut self, values: &[u16]) {
        self.u32(values.len() as u32);
        for &v in values {
            self.u16(v);
        }
    }

    /// Appends a counted u32 array.
    pub fn array_u32(&mut self, values: &[u32]) {
        self.u32(values.len() as u32);
        for &v in values {
            self.u32(v);
        }
    }

    /// Appends a PTP string. The empty string packs to a single zero
    /// byte; anything else packs its UTF-16 units plus a terminator.
    pub fn string(&mut self, s: &str) -> Result<(), CodecError> {
        if s.is_empty() {
            self.u8(0);
            return Ok(());
        }
        let units: Vec<u16> = s.encode_utf16().collect();
        if units.len() + 1 > MAX_STRING_CHARS {
            return Err(CodecError::StringTooLong { chars: units.len() });
        }
        self.u8((units.len() + 1) as u8);
        for unit in units {
            self.u16(unit);
        }
        self.u16(0);
        Ok(())
    }
}
