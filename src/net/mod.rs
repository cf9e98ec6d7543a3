//! Colony server transport
//!
//! - `protocol`: request/response line shapes
//! - `line_reader`: background reader turning bytes into lines
//! - `client`: connection lifecycle, serialized requests, retry

pub mod client;
pub mod line_reader;
pub mod protocol;

// Re-exports
pub use client::{ConnectionState, ServerConnection};
pub use line_reader::{AsyncLineReader, LineHandler, ReadEnd};
pub use protocol::Request;
