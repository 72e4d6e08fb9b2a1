//! Buffers shared between the socket loop and the state machines.

use crate::protocol::backend::RawMessage;

/// Read and write buffers for one connection.
pub struct BufferSet {
    /// Payload of the last message read (length field stripped)
    pub read_buffer: Vec<u8>,
    /// Outgoing bytes not yet written
    pub write_buffer: Vec<u8>,
    /// Type byte of the last message read
    pub type_byte: u8,
}

impl BufferSet {
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(8192),
            type_byte: 0,
        }
    }

    /// The last message read.
    pub fn message(&self) -> RawMessage<'_> {
        RawMessage::new(self.type_byte, &self.read_buffer)
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
