//! Connection management and wire round trips.

use crate::cursor::{Page, DEFAULT_PAGE_SIZE};
use crate::error::ClientError;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use viewdb_protocol::{
    recycle_decoder, recycle_encoder, take_decoder, take_encoder, Command, Decoder, Encoder,
    ProtocolError, PROTOCOL_VERSION,
};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection establishment timeout. Commands themselves have no
    /// timeout; cancellation is by closing the connection.
    pub connect_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Cursor prefetch page capacity, in pairs.
    pub page_size: u64,
}

impl ClientConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_page_size(mut self, pairs: u64) -> Self {
        self.page_size = pairs.max(1);
        self
    }
}

struct ConnInner {
    stream: TcpStream,
    encoder: Encoder,
    decoder: Decoder,
    read_buf: Vec<u8>,
}

impl ConnInner {
    /// Writes out everything staged in the encoder.
    async fn flush(&mut self) -> Result<(), ClientError> {
        let frame = self.encoder.take();
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Reads more bytes from the stream into the decoder.
    async fn fill(&mut self) -> Result<(), ClientError> {
        let n = self.stream.read(&mut self.read_buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        self.decoder.extend(&self.read_buf[..n]);
        Ok(())
    }

    async fn recv_u64(&mut self) -> Result<u64, ClientError> {
        loop {
            if let Some(value) = self.decoder.decode_u64()? {
                return Ok(value);
            }
            self.fill().await?;
        }
    }

    async fn recv_bytes(&mut self) -> Result<Bytes, ClientError> {
        loop {
            if let Some(data) = self.decoder.decode_bytes()? {
                return Ok(data);
            }
            self.fill().await?;
        }
    }

    async fn recv_opt_bytes(&mut self) -> Result<Option<Bytes>, ClientError> {
        loop {
            if let Some(value) = self.decoder.decode_opt_bytes()? {
                return Ok(value);
            }
            self.fill().await?;
        }
    }

    async fn recv_bytes_into(&mut self, dst: &mut Vec<u8>) -> Result<bool, ClientError> {
        loop {
            if let Some(filled) = self.decoder.decode_bytes_into(dst)? {
                return Ok(filled);
            }
            self.fill().await?;
        }
    }
}

/// A connection to a viewdb server.
///
/// All round trips take `&self`; the stream sits behind a mutex so the
/// transaction/bucket/cursor façades can share the connection. The protocol
/// is strictly request/response, so there is never more than one command in
/// flight.
pub struct Connection {
    inner: Mutex<ConnInner>,
    connected: AtomicBool,
}

impl Connection {
    /// Connects and performs the version handshake.
    ///
    /// The connection fails closed when the server's protocol version
    /// differs from [`PROTOCOL_VERSION`].
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        tracing::debug!("connecting to {}", config.addr);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;
        stream.set_nodelay(true).ok();

        let mut inner = ConnInner {
            stream,
            encoder: take_encoder(),
            decoder: take_decoder(),
            read_buf: vec![0u8; config.read_buffer_size],
        };

        inner.encoder.put_command(Command::Version);
        inner.flush().await?;
        let server_version = inner.recv_u64().await?;
        if server_version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                peer: server_version,
                expected: PROTOCOL_VERSION,
            }
            .into());
        }
        tracing::debug!("handshake complete, protocol version {}", server_version);

        Ok(Self {
            inner: Mutex::new(inner),
            connected: AtomicBool::new(true),
        })
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection and returns the codec instances to their pools.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        inner.stream.shutdown().await.ok();
        recycle_encoder(std::mem::take(&mut inner.encoder));
        recycle_decoder(std::mem::take(&mut inner.decoder));
        Ok(())
    }

    async fn lock(&self) -> Result<MutexGuard<'_, ConnInner>, ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        Ok(self.inner.lock().await)
    }

    /// Asks the server for its protocol version.
    pub async fn version(&self) -> Result<u64, ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(Command::Version);
        inner.flush().await?;
        inner.recv_u64().await
    }

    /// Fetches the text of the last command-level error on this session.
    pub(crate) async fn last_error(&self) -> Result<String, ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(Command::LastError);
        inner.flush().await?;
        let text = inner.recv_bytes().await?;
        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    pub(crate) async fn begin_tx(&self) -> Result<u64, ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(Command::BeginTx);
        inner.flush().await?;
        inner.recv_u64().await
    }

    pub(crate) async fn end_tx(&self, tx_handle: u64) -> Result<(), ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(Command::EndTx);
        inner.encoder.put_u64(tx_handle);
        inner.flush().await
    }

    pub(crate) async fn open_bucket(&self, tx_handle: u64, name: &[u8]) -> Result<u64, ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(Command::Bucket);
        inner.encoder.put_u64(tx_handle);
        inner.encoder.put_bytes(name)?;
        inner.flush().await?;
        inner.recv_u64().await
    }

    pub(crate) async fn get(
        &self,
        bucket_handle: u64,
        key: &[u8],
    ) -> Result<Option<Bytes>, ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(Command::Get);
        inner.encoder.put_u64(bucket_handle);
        inner.encoder.put_bytes(key)?;
        inner.flush().await?;
        inner.recv_opt_bytes().await
    }

    pub(crate) async fn open_cursor(&self, bucket_handle: u64) -> Result<u64, ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(Command::Cursor);
        inner.encoder.put_u64(bucket_handle);
        inner.flush().await?;
        inner.recv_u64().await
    }

    /// Single round trip positioning a cursor; bypasses the prefetch page.
    pub(crate) async fn cursor_seek(
        &self,
        cursor_handle: u64,
        key: &[u8],
    ) -> Result<Option<(Bytes, Bytes)>, ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(Command::CursorSeek);
        inner.encoder.put_u64(cursor_handle);
        inner.encoder.put_bytes(key)?;
        inner.flush().await?;
        let found_key = inner.recv_opt_bytes().await?;
        let value = inner.recv_opt_bytes().await?;
        match found_key {
            Some(found_key) if !found_key.is_empty() => {
                Ok(Some((found_key, value.unwrap_or_default())))
            }
            _ => Ok(None),
        }
    }

    /// Issues a paged cursor command and refills the page, decoding each
    /// pair into the page's preallocated slot buffers.
    pub(crate) async fn fetch_page(
        &self,
        cmd: Command,
        cursor_handle: u64,
        count: u64,
        page: &mut Page,
    ) -> Result<(), ClientError> {
        let mut inner = self.lock().await?;
        inner.encoder.put_command(cmd);
        inner.encoder.put_u64(cursor_handle);
        inner.encoder.put_u64(count);
        inner.flush().await?;

        page.reset();
        let mut filled = 0usize;
        while filled < count as usize {
            inner.recv_bytes_into(&mut page.keys[filled]).await?;
            inner.recv_bytes_into(&mut page.values[filled]).await?;
            // An empty-key slot is the end-of-range sentinel.
            if page.keys[filled].is_empty() {
                page.end_of_range = true;
                break;
            }
            filled += 1;
        }
        page.last_idx = filled;
        Ok(())
    }
}
