//! COPY FROM STDIN frontend messages.

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;

/// Largest CopyData payload sent in one message. The server refuses messages
/// of 1 GiB or more.
pub const MAX_COPY_DATA: usize = 64 * 1024 * 1024;

/// Write only the CopyData header for a `len`-byte payload.
///
/// The payload is written separately so large batches are never copied into
/// the outgoing message buffer.
pub fn write_copy_data_header(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    let framed = len
        .checked_add(4)
        .and_then(|framed| i32::try_from(framed).ok())
        .ok_or_else(|| {
            Error::InvalidUsage(format!("{}-byte CopyData payload does not fit a message", len))
        })?;
    buf.push(super::msg_type::COPY_DATA);
    buf.extend_from_slice(&framed.to_be_bytes());
    Ok(())
}

pub fn write_copy_done(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, super::msg_type::COPY_DONE).finish();
}

/// Write a CopyFail message; the server answers with an ErrorResponse carrying `reason`.
pub fn write_copy_fail(buf: &mut Vec<u8>, reason: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::COPY_FAIL);
    msg.write_cstr(reason);
    msg.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_data_header_counts_payload() {
        let mut buf = Vec::new();
        write_copy_data_header(&mut buf, 12).unwrap();
        assert_eq!(buf, [b'd', 0, 0, 0, 16]);
    }

    #[test]
    fn copy_data_header_rejects_oversized_payload() {
        let mut buf = Vec::new();
        let err = write_copy_data_header(&mut buf, i32::MAX as usize).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn copy_done_and_fail() {
        let mut buf = Vec::new();
        write_copy_done(&mut buf);
        assert_eq!(buf, [b'c', 0, 0, 0, 4]);

        buf.clear();
        write_copy_fail(&mut buf, "stop");
        assert_eq!(buf, [b'f', 0, 0, 0, 9, b's', b't', b'o', b'p', 0]);
    }
}
