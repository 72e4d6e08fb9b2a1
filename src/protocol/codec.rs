//! Wire encoding and decoding primitives.
//!
//! All integers are big-endian (network byte order).

use zerocopy::byteorder::big_endian::{I16, I32, U16, U32};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};

/// Cursor over a message payload.
///
/// Every read checks bounds and advances; running out of bytes is a protocol error.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn short(&self, what: &str, need: usize) -> Error {
        Error::Protocol(format!(
            "{}: buffer too short: {} < {}",
            what,
            self.data.len(),
            need
        ))
    }

    pub fn u8(&mut self) -> Result<u8> {
        let (&first, rest) = self
            .data
            .split_first()
            .ok_or_else(|| self.short("read_u8", 1))?;
        self.data = rest;
        Ok(first)
    }

    pub fn i16(&mut self) -> Result<i16> {
        let (value, rest) = I16::read_from_prefix(self.data).map_err(|_e| self.short("read_i16", 2))?;
        self.data = rest;
        Ok(value.get())
    }

    pub fn u16(&mut self) -> Result<u16> {
        let (value, rest) = U16::read_from_prefix(self.data).map_err(|_e| self.short("read_u16", 2))?;
        self.data = rest;
        Ok(value.get())
    }

    pub fn i32(&mut self) -> Result<i32> {
        let (value, rest) = I32::read_from_prefix(self.data).map_err(|_e| self.short("read_i32", 4))?;
        self.data = rest;
        Ok(value.get())
    }

    pub fn u32(&mut self) -> Result<u32> {
        let (value, rest) = U32::read_from_prefix(self.data).map_err(|_e| self.short("read_u32", 4))?;
        self.data = rest;
        Ok(value.get())
    }

    /// Borrow a fixed-layout header straight out of the payload.
    pub fn header<T: FromBytes + Immutable + KnownLayout>(&mut self) -> Result<&'a T> {
        let need = size_of::<T>();
        let (value, rest) =
            T::ref_from_prefix(self.data).map_err(|_e| self.short("read_header", need))?;
        self.data = rest;
        Ok(value)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(self.short("read_bytes", len));
        }
        let (head, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(head)
    }

    /// Length-prefixed value as used by DataRow: `-1` is NULL.
    pub fn nullable_bytes(&mut self) -> Result<Option<&'a [u8]>> {
        let len = self.i32()?;
        if len < 0 {
            return Ok(None);
        }
        self.bytes(len as usize).map(Some)
    }

    /// Null-terminated byte string, terminator stripped.
    pub fn cstring(&mut self) -> Result<&'a [u8]> {
        let pos = memchr::memchr(0, self.data)
            .ok_or_else(|| Error::Protocol("read_cstring: no null terminator found".into()))?;
        let (head, rest) = self.data.split_at(pos);
        self.data = rest.get(1..).unwrap_or_default();
        Ok(head)
    }

    /// Null-terminated UTF-8 string.
    pub fn cstr(&mut self) -> Result<&'a str> {
        let bytes = self.cstring()?;
        simdutf8::basic::from_utf8(bytes)
            .map_err(|e| Error::Protocol(format!("read_cstr: invalid UTF-8: {e}")))
    }
}

/// Builds one framed message, back-filling the length field on `finish`.
///
/// Layout: type byte (not counted), 4-byte length (counts itself), payload.
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        Self::new_startup(buf)
    }

    /// Startup-family messages carry no type byte.
    pub fn new_startup(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0; 4]);
        Self { buf, start }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as i32;
        if let Some(slot) = self.buf.get_mut(self.start..self.start + 4) {
            slot.copy_from_slice(&len.to_be_bytes());
        }
    }
}
