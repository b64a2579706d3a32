//! Tagged binary encoding of the protocol primitives.
//!
//! Every value on the wire carries a one-byte type tag so both peers can
//! decode independently; there is no structural framing beyond the
//! concatenation of encoded values. The layouts:
//!
//! ```text
//! command      +-----+
//!              | cmd |                      1 byte, raw command tag
//!              +-----+
//! u64          +------+----------------+
//!              | 0x01 | value (8 BE)   |
//!              +------+----------------+
//! byte string  +------+----------+---------+
//!              | 0x02 | len (4 BE)| payload |
//!              +------+----------+---------+
//! nil          +------+
//!              | 0x03 |                     end-of-range / absent value
//!              +------+
//! ```

use crate::command::Command;
use crate::error::ProtocolError;
use crate::MAX_VALUE_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Mutex;

/// Type tag for an unsigned 64-bit integer.
const TAG_UINT: u8 = 0x01;
/// Type tag for a length-prefixed byte string.
const TAG_BYTES: u8 = 0x02;
/// Type tag for nil (absent value / end-of-range sentinel).
const TAG_NIL: u8 = 0x03;

/// Initial capacity of encoder/decoder buffers.
const INITIAL_BUFFER_CAPACITY: usize = 8192;

/// Encodes protocol values into an internal buffer.
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Appends a command tag.
    pub fn put_command(&mut self, cmd: Command) {
        self.buf.put_u8(cmd.as_u8());
    }

    /// Appends a u64.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u8(TAG_UINT);
        self.buf.put_u64(value);
    }

    /// Appends a byte string (empty is valid and distinct from nil).
    pub fn put_bytes(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.len() > MAX_VALUE_SIZE {
            return Err(ProtocolError::ValueTooLarge {
                size: data.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        self.buf.put_u8(TAG_BYTES);
        self.buf.put_u32(data.len() as u32);
        self.buf.put_slice(data);
        Ok(())
    }

    /// Appends the nil sentinel.
    pub fn put_nil(&mut self) {
        self.buf.put_u8(TAG_NIL);
    }

    /// Appends a byte string, or nil when `data` is `None`.
    pub fn put_opt_bytes(&mut self, data: Option<&[u8]>) -> Result<(), ProtocolError> {
        match data {
            Some(data) => self.put_bytes(data),
            None => {
                self.put_nil();
                Ok(())
            }
        }
    }

    /// Takes the encoded bytes out of the encoder, leaving it empty.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    /// Returns the number of bytes currently encoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discards any encoded bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes protocol values from an internal buffer fed by stream reads.
///
/// Every `decode_*` method returns `Ok(None)` when the buffer does not yet
/// hold a complete value; feed more input with [`Decoder::extend`] and retry.
/// Nothing is consumed until a value decodes completely.
pub struct Decoder {
    buf: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to decode the next command tag.
    pub fn decode_command(&mut self) -> Result<Option<Command>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let cmd = Command::try_from(self.buf[0])?;
        self.buf.advance(1);
        Ok(Some(cmd))
    }

    /// Attempts to decode a u64.
    pub fn decode_u64(&mut self) -> Result<Option<u64>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf[0] != TAG_UINT {
            return Err(ProtocolError::UnexpectedTag {
                expected: "u64",
                found: self.buf[0],
            });
        }
        if self.buf.len() < 9 {
            return Ok(None);
        }
        self.buf.advance(1);
        Ok(Some(self.buf.get_u64()))
    }

    /// Attempts to decode a byte string. Nil in this position is a protocol
    /// error; use [`Decoder::decode_opt_bytes`] where nil is part of the
    /// grammar.
    pub fn decode_bytes(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        match self.decode_opt_bytes()? {
            Some(Some(data)) => Ok(Some(data)),
            Some(None) => Err(ProtocolError::UnexpectedTag {
                expected: "byte string",
                found: TAG_NIL,
            }),
            None => Ok(None),
        }
    }

    /// Attempts to decode a byte string or the nil sentinel.
    ///
    /// `Ok(Some(None))` means nil was decoded.
    pub fn decode_opt_bytes(&mut self) -> Result<Option<Option<Bytes>>, ProtocolError> {
        match self.peek_bytes_header()? {
            Some(BytesHeader::Nil) => {
                self.buf.advance(1);
                Ok(Some(None))
            }
            Some(BytesHeader::Data(len)) => {
                self.buf.advance(5);
                Ok(Some(Some(self.buf.split_to(len).freeze())))
            }
            None => Ok(None),
        }
    }

    /// Attempts to decode a byte string or nil into a caller-supplied
    /// buffer, reusing its allocation.
    ///
    /// Returns `Ok(Some(true))` when a byte string was written into `dst`,
    /// and `Ok(Some(false))` when nil was decoded (`dst` is cleared).
    pub fn decode_bytes_into(&mut self, dst: &mut Vec<u8>) -> Result<Option<bool>, ProtocolError> {
        match self.peek_bytes_header()? {
            Some(BytesHeader::Nil) => {
                self.buf.advance(1);
                dst.clear();
                Ok(Some(false))
            }
            Some(BytesHeader::Data(len)) => {
                dst.clear();
                dst.extend_from_slice(&self.buf[5..5 + len]);
                self.buf.advance(5 + len);
                Ok(Some(true))
            }
            None => Ok(None),
        }
    }

    /// Peeks at the next byte-string-position value without consuming it.
    fn peek_bytes_header(&self) -> Result<Option<BytesHeader>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        match self.buf[0] {
            TAG_NIL => Ok(Some(BytesHeader::Nil)),
            TAG_BYTES => {
                if self.buf.len() < 5 {
                    return Ok(None);
                }
                let len =
                    u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]])
                        as usize;
                if len > MAX_VALUE_SIZE {
                    return Err(ProtocolError::ValueTooLarge {
                        size: len,
                        max: MAX_VALUE_SIZE,
                    });
                }
                if self.buf.len() < 5 + len {
                    return Ok(None);
                }
                Ok(Some(BytesHeader::Data(len)))
            }
            other => Err(ProtocolError::UnexpectedTag {
                expected: "byte string",
                found: other,
            }),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

enum BytesHeader {
    Nil,
    Data(usize),
}

/// Capacity of the process-global encoder and decoder pools.
const POOL_CAPACITY: usize = 128;

static ENCODER_POOL: Mutex<Vec<Encoder>> = Mutex::new(Vec::new());
static DECODER_POOL: Mutex<Vec<Decoder>> = Mutex::new(Vec::new());

fn lock_pool<T>(pool: &Mutex<Vec<T>>) -> std::sync::MutexGuard<'_, Vec<T>> {
    match pool.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Takes an encoder from the pool, or allocates a fresh one.
pub fn take_encoder() -> Encoder {
    lock_pool(&ENCODER_POOL).pop().unwrap_or_default()
}

/// Returns an encoder to the pool. When the pool is full the instance is
/// dropped instead.
pub fn recycle_encoder(mut encoder: Encoder) {
    encoder.clear();
    let mut pool = lock_pool(&ENCODER_POOL);
    if pool.len() < POOL_CAPACITY {
        pool.push(encoder);
    } else {
        tracing::debug!("encoder pool full, dropping instance");
    }
}

/// Takes a decoder from the pool, or allocates a fresh one.
pub fn take_decoder() -> Decoder {
    lock_pool(&DECODER_POOL).pop().unwrap_or_default()
}

/// Returns a decoder to the pool. When the pool is full the instance is
/// dropped instead.
pub fn recycle_decoder(mut decoder: Decoder) {
    decoder.clear();
    let mut pool = lock_pool(&DECODER_POOL);
    if pool.len() < POOL_CAPACITY {
        pool.push(decoder);
    } else {
        tracing::debug!("decoder pool full, dropping instance");
    }
}
