//! I/O requests produced by the state machines.

use crate::protocol::backend::CopyInResponse;

/// What the caller must do before stepping the state machine again.
#[derive(Debug)]
pub enum Action {
    /// Write `buffer_set.write_buffer` to the server, then read a message.
    WriteAndReadMessage,

    /// Read one message into the buffer set.
    ReadMessage,

    /// The server entered COPY FROM STDIN. The caller either streams data or
    /// sends CopyFail, then keeps reading messages into the machine.
    CopyIn(CopyInResponse),

    /// The state machine has finished.
    Finished,
}
