//! PostgreSQL wire protocol, reduced to the messages the session layer uses.
//!
//! - `backend`: server to client messages (parsing)
//! - `frontend`: client to server messages (encoding)
//! - `codec`: byte-level reading and message framing
//! - `types`: OIDs, format codes, transaction status

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;

pub use backend::RawMessage;
pub use types::{FormatCode, Oid, TransactionStatus};
