//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] viewdb_protocol::ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] viewdb_store::StoreError),
}
