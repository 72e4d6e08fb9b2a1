//! COPY FROM STDIN payload encoding.
//!
//! [`CopyEncoder`] is pure: it only fills a byte buffer. Sending the buffer
//! is the job of [`BulkSession`](crate::sync::BulkSession).

use std::borrow::Cow;

use zerocopy::byteorder::big_endian::U32;
use zerocopy::{Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::types::FormatCode;

/// Text-format NULL marker.
pub const TEXT_NULL: &[u8] = b"\\N";

/// Binary-format stream trailer: a field count of -1.
pub const BINARY_TRAILER: [u8; 2] = (-1i16).to_be_bytes();

/// Fixed header opening a binary COPY stream.
#[derive(IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
struct BinaryHeader {
    signature: [u8; 11],
    flags: U32,
    extension_len: U32,
}

const BINARY_HEADER: BinaryHeader = BinaryHeader {
    signature: *b"PGCOPY\n\xff\r\n\0",
    flags: U32::new(0),
    extension_len: U32::new(0),
};

/// The 19 header bytes of a binary COPY stream.
pub fn binary_header() -> &'static [u8] {
    BINARY_HEADER.as_bytes()
}

/// Escape a value for the text format: backslash, newline, carriage return
/// and tab get a backslash form. Borrowed when nothing needs escaping.
pub fn escape_text(value: &[u8]) -> Cow<'_, [u8]> {
    if !value.iter().any(|b| matches!(b, b'\\' | b'\n' | b'\r' | b'\t')) {
        return Cow::Borrowed(value);
    }
    let mut out = Vec::with_capacity(value.len() + 8);
    for &b in value {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.push(b),
        }
    }
    Cow::Owned(out)
}

/// Accumulates encoded rows for one COPY stream.
///
/// The buffer is reused across batches: [`reset`](Self::reset) clears it
/// without giving back its capacity.
#[derive(Debug)]
pub struct CopyEncoder {
    format: FormatCode,
    width: usize,
    buf: Vec<u8>,
    rows: usize,
}

impl CopyEncoder {
    /// A binary encoder starts with the stream header already queued.
    pub fn new(format: FormatCode, width: usize) -> Self {
        let mut buf = Vec::with_capacity(64 * 1024);
        if format == FormatCode::Binary {
            buf.extend_from_slice(binary_header());
        }
        Self {
            format,
            width,
            buf,
            rows: 0,
        }
    }

    pub fn format(&self) -> FormatCode {
        self.format
    }

    /// Fields per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Append one row. `None` is SQL NULL.
    ///
    /// A row of the wrong width is rejected and leaves the buffer unchanged.
    /// Text values are written as given; use [`escape_text`] for raw data.
    pub fn push_row(&mut self, fields: &[Option<&[u8]>]) -> Result<()> {
        if fields.len() != self.width {
            return Err(Error::InvalidUsage(format!(
                "COPY row has {} fields, expected {}",
                fields.len(),
                self.width
            )));
        }
        match self.format {
            FormatCode::Text => self.push_text(fields),
            FormatCode::Binary => self.push_binary(fields)?,
        }
        self.rows += 1;
        Ok(())
    }

    fn push_text(&mut self, fields: &[Option<&[u8]>]) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.buf.push(b'\t');
            }
            self.buf.extend_from_slice(field.unwrap_or(TEXT_NULL));
        }
        self.buf.push(b'\n');
    }

    fn push_binary(&mut self, fields: &[Option<&[u8]>]) -> Result<()> {
        let count = i16::try_from(fields.len())
            .map_err(|_e| Error::InvalidUsage(format!("{} fields exceed a COPY tuple", fields.len())))?;
        let lengths = fields
            .iter()
            .map(|f| match f {
                Some(bytes) => i32::try_from(bytes.len()).map_err(|_e| {
                    Error::InvalidUsage(format!("{}-byte field exceeds a COPY tuple", bytes.len()))
                }),
                None => Ok(-1),
            })
            .collect::<Result<Vec<i32>>>()?;

        self.buf.extend_from_slice(&count.to_be_bytes());
        for (field, len) in fields.iter().zip(lengths) {
            self.buf.extend_from_slice(&len.to_be_bytes());
            if let Some(bytes) = field {
                self.buf.extend_from_slice(bytes);
            }
        }
        Ok(())
    }

    /// Queue the end-of-stream marker. Text streams have none.
    pub fn finish(&mut self) {
        if self.format == FormatCode::Binary {
            self.buf.extend_from_slice(&BINARY_TRAILER);
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Rows queued since the last reset.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// A batch is due once either threshold is reached.
    pub fn should_flush(&self, max_rows: usize, max_bytes: usize) -> bool {
        self.rows >= max_rows || self.buf.len() >= max_bytes
    }

    /// Forget the queued bytes, keeping the allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.rows = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(s: &str) -> Option<&[u8]> {
        Some(s.as_bytes())
    }

    #[test]
    fn binary_header_layout() {
        let header = binary_header();
        assert_eq!(header.len(), 19);
        assert_eq!(&header[..11], b"PGCOPY\n\xff\r\n\0");
        assert_eq!(&header[11..], &[0; 8]);
    }

    #[test]
    fn text_rows() {
        let mut enc = CopyEncoder::new(FormatCode::Text, 3);
        enc.push_row(&[f("1"), None, f("a b")]).unwrap();
        enc.push_row(&[f(""), f("x"), f("y")]).unwrap();
        assert_eq!(enc.buffer(), b"1\t\\N\ta b\n\tx\ty\n");
        assert_eq!(enc.rows(), 2);
        enc.finish();
        assert_eq!(enc.buffer(), b"1\t\\N\ta b\n\tx\ty\n");
    }

    #[test]
    fn binary_tuple() {
        let mut enc = CopyEncoder::new(FormatCode::Binary, 2);
        enc.push_row(&[Some(&[0u8, 0, 0, 7][..]), None]).unwrap();
        enc.finish();
        let body = &enc.buffer()[19..];
        assert_eq!(
            body,
            &[0, 2, 0, 0, 0, 4, 0, 0, 0, 7, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn wrong_width_leaves_buffer_unchanged() {
        let mut enc = CopyEncoder::new(FormatCode::Binary, 2);
        enc.push_row(&[f("a"), f("b")]).unwrap();
        let before = enc.buffer().to_vec();
        let err = enc.push_row(&[f("a")]).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
        assert_eq!(enc.buffer(), &before[..]);
        assert_eq!(enc.rows(), 1);
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut enc = CopyEncoder::new(FormatCode::Text, 1);
        let big = vec![b'x'; 200_000];
        enc.push_row(&[Some(big.as_slice())]).unwrap();
        let capacity = enc.capacity();
        assert!(enc.should_flush(1000, 100_000));
        enc.reset();
        assert!(enc.is_empty());
        assert_eq!(enc.rows(), 0);
        assert_eq!(enc.capacity(), capacity);
        assert!(!enc.should_flush(1000, 100_000));
    }

    #[test]
    fn flush_on_row_threshold() {
        let mut enc = CopyEncoder::new(FormatCode::Text, 1);
        for _ in 0..3 {
            enc.push_row(&[f("r")]).unwrap();
        }
        assert!(enc.should_flush(3, usize::MAX));
        assert!(!enc.should_flush(4, usize::MAX));
    }

    #[test]
    fn escaping() {
        assert!(matches!(escape_text(b"plain"), Cow::Borrowed(_)));
        assert_eq!(&*escape_text(b"a\tb\\c\nd"), b"a\\tb\\\\c\\nd");
    }
}
