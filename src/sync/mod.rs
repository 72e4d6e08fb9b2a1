//! Synchronous PostgreSQL session.

mod bulk;
mod conn;
mod pipeline;
#[cfg(test)]
pub(crate) mod script;
mod stream;

pub use bulk::{BulkOptions, BulkSession, BulkState, DEFAULT_BATCH_BYTES, DEFAULT_BATCH_ROWS};
pub use conn::{Conn, ConnStatus};
