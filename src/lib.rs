//! A PostgreSQL client session layer.
//!
//! # Features
//!
//! - **Blocking and polled connect**: `Conn::connect` or `Conn::connect_start` + `poll`
//! - **Prepared statements**: named plans in a per-connection registry
//! - **Pipelining**: send many commands, read results in send order
//! - **Bulk loads**: COPY FROM STDIN in text or binary tuple format, batched
//! - **Sans-I/O state machines**: handshake and response handling never touch the socket
//!
//! # Example
//!
//! ```no_run
//! use zero_psql::sync::Conn;
//! use zero_psql::{Opts, Param};
//!
//! fn main() -> zero_psql::Result<()> {
//!     let opts = Opts {
//!         host: "localhost".into(),
//!         user: "postgres".into(),
//!         database: Some("mydb".into()),
//!         password: Some("secret".into()),
//!         ..Default::default()
//!     };
//!
//!     let mut conn = Conn::connect(opts)?;
//!
//!     conn.prepare("p1", "SELECT $1::int", 1, &[])?;
//!     let result = conn.exec_prepared("p1", [Param::text("42")])?;
//!     println!("{:?}", result.get_str(0, 0)?);
//!
//!     conn.disconnect();
//!     Ok(())
//! }
//! ```

pub mod buffer_set;
pub mod copy;
pub mod error;
pub mod opts;
pub mod params;
pub mod protocol;
pub mod result;
pub mod state;
pub mod statement;

#[cfg(feature = "sync")]
pub mod sync;

pub use copy::CopyEncoder;
pub use error::{Error, Result, ServerError};
pub use opts::Opts;
pub use params::{Param, Params};
pub use protocol::types::{FormatCode, Oid, TransactionStatus, oid};
pub use result::{Field, QueryResult, ResultStatus};
pub use statement::PreparedStatement;
