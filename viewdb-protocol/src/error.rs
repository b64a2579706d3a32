//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
///
/// Every variant is fatal for the connection it occurs on: the session is
/// terminated and all of its resources are released.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown command tag: {0}")]
    UnknownCommand(u8),

    #[error("unexpected value tag: expected {expected}, got {found:#04x}")]
    UnexpectedTag { expected: &'static str, found: u8 },

    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("version mismatch: peer speaks {peer}, expected {expected}")]
    VersionMismatch { peer: u64, expected: u64 },
}
