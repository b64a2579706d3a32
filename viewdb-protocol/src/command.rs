//! Command tags of the viewdb remote protocol.

use crate::error::ProtocolError;

/// A protocol command.
///
/// Each command is sent as a single raw byte, followed by its encoded
/// arguments and answered by its encoded response values, in the order the
/// variants document. Commands returning a handle reply with `0` on logical
/// failure; the cause can then be queried with [`Command::LastError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Asks for the protocol version the server speaks. Replies with one
    /// u64. Can also be sent periodically to keep the connection open.
    Version = 0,
    /// Asks for the textual description of the last command-level error on
    /// this session. Replies with one byte string, literally `"<nil>"` when
    /// no error is recorded.
    LastError = 1,
    /// Opens a read-only transaction. Replies with the transaction handle,
    /// or 0 on failure.
    BeginTx = 2,
    /// `(txHandle)`. Ends (rolls back) the transaction and releases every
    /// bucket and cursor opened in it. No reply.
    EndTx = 3,
    /// `(txHandle, name)`. Opens a bucket by name within the transaction.
    /// Replies with the bucket handle, or 0 on failure.
    Bucket = 4,
    /// `(bucketHandle, key)`. Replies with the value for the key, or nil if
    /// the key is absent.
    Get = 5,
    /// `(bucketHandle)`. Creates a cursor positioned before the first key of
    /// the bucket. Replies with the cursor handle, or 0 on failure.
    Cursor = 6,
    /// `(cursorHandle, seekKey)`. Moves the cursor to the smallest key that
    /// is `>= seekKey`. Replies with that (key, value) pair, or (nil, nil)
    /// when no such key exists.
    CursorSeek = 7,
    /// `(cursorHandle, n)`. Advances the cursor and streams back up to `n`
    /// (key, value) pairs. A pair with a nil key terminates the stream.
    CursorNext = 8,
    /// `(cursorHandle, n)`. Moves the cursor to the bucket start and streams
    /// back up to `n` (key, value) pairs. A pair with a nil key terminates
    /// the stream.
    CursorFirst = 9,
}

impl Command {
    /// Returns the wire byte for this command.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Command::Version),
            1 => Ok(Command::LastError),
            2 => Ok(Command::BeginTx),
            3 => Ok(Command::EndTx),
            4 => Ok(Command::Bucket),
            5 => Ok(Command::Get),
            6 => Ok(Command::Cursor),
            7 => Ok(Command::CursorSeek),
            8 => Ok(Command::CursorNext),
            9 => Ok(Command::CursorFirst),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}
