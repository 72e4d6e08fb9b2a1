//! Sans-I/O state machines.
//!
//! They never touch the socket. Each step consumes the message in a
//! [`BufferSet`](crate::buffer_set::BufferSet) and returns an [`Action`]
//! telling the caller what I/O to perform next.

pub mod action;
pub mod connection;
pub mod response;

pub use action::Action;
pub use connection::ConnectionStateMachine;
pub use response::ResponseCollector;
