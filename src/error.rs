//! Error types for colony-sync

use thiserror::Error;

use crate::codec::CodecError;
use crate::transform::TransformError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Could not reach the server (unknown host, refused, attempts exhausted)
    #[error("Cannot connect: {0}")]
    Connection(String),

    /// The server closed the stream before answering
    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Request timeout: {0}")]
    Timeout(String),

    /// The server answered with something we could not interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The owning task pool was shut down
    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Transport failures are worth retrying on a fresh connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_)
                | SyncError::ConnectionClosed
                | SyncError::Timeout(_)
                | SyncError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
