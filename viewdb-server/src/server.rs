//! TCP server and per-connection session loop.

use crate::error::ServerError;
use crate::session::Session;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use viewdb_protocol::{
    recycle_decoder, recycle_encoder, take_decoder, take_encoder, Command, Decoder, Encoder,
    ProtocolError, PROTOCOL_VERSION,
};
use viewdb_store::KvEngine;

/// Default read buffer size for socket reads (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Encoded page bytes are written out whenever this many have accumulated,
/// so a streamed page is never wholly resident in memory.
const FLUSH_THRESHOLD: usize = 64 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7510".parse().unwrap(),
            max_connections: 1000,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for viewdb.
///
/// Spawns one session task per accepted connection. Shutting down stops the
/// accept loop; in-flight sessions run until their stream reaches
/// end-of-input or fails.
pub struct Server {
    config: ServerConfig,
    engine: Arc<dyn KvEngine>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server over the given engine.
    pub fn new(config: ServerConfig, engine: Arc<dyn KvEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            engine,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Runs the accept loop until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                            stream.set_nodelay(true).ok();

                            let engine = self.engine.clone();
                            let stats = self.stats.clone();
                            let read_buffer_size = self.config.read_buffer_size;

                            tokio::spawn(async move {
                                let result =
                                    serve_session(engine, stream, addr, read_buffer_size).await;
                                if let Err(err) = result {
                                    tracing::debug!("connection {} error: {}", addr, err);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }
                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(err) => {
                            tracing::error!("accept error: {}", err);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Stops the accept loop. In-flight sessions are not interrupted.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

/// Serves one session over any duplex byte stream.
///
/// Returns when the peer closes the stream at a command boundary (clean) or
/// on the first protocol or transport error (fatal). Either way the stream
/// is dropped, which closes the underlying connection, and every transaction
/// the session still holds is rolled back.
pub async fn serve_connection<S>(
    engine: Arc<dyn KvEngine>,
    stream: S,
    peer: SocketAddr,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    serve_session(engine, stream, peer, DEFAULT_READ_BUFFER_SIZE).await
}

async fn serve_session<S>(
    engine: Arc<dyn KvEngine>,
    stream: S,
    peer: SocketAddr,
    read_buffer_size: usize,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut decoder = take_decoder();
    let mut encoder = take_encoder();
    let mut session = Session::new();

    tracing::info!("session {} started for {}", session.id(), peer);

    let result = session_loop(
        engine.as_ref(),
        &mut session,
        &mut reader,
        &mut writer,
        &mut decoder,
        &mut encoder,
        read_buffer_size,
    )
    .await;

    recycle_decoder(decoder);
    recycle_encoder(encoder);

    match &result {
        Ok(()) => tracing::info!("session {} ended", session.id()),
        Err(err) => tracing::error!("session {} failed: {}", session.id(), err),
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn session_loop<S>(
    engine: &dyn KvEngine,
    session: &mut Session,
    reader: &mut ReadHalf<S>,
    writer: &mut WriteHalf<S>,
    decoder: &mut Decoder,
    encoder: &mut Encoder,
    read_buffer_size: usize,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut read_buf = vec![0u8; read_buffer_size];

    loop {
        let cmd = match recv_command(reader, decoder, &mut read_buf).await? {
            Some(cmd) => cmd,
            // Graceful termination when the end of the input is reached.
            None => return Ok(()),
        };
        tracing::trace!("session {}: {:?}", session.id(), cmd);

        match cmd {
            Command::Version => {
                encoder.put_u64(PROTOCOL_VERSION);
            }
            Command::LastError => {
                encoder.put_bytes(session.last_error_text().as_bytes())?;
            }
            Command::BeginTx => {
                let handle = session.begin_tx(engine);
                encoder.put_u64(handle);
            }
            Command::EndTx => {
                let handle = recv_u64(reader, decoder, &mut read_buf).await?;
                if !session.end_tx(handle) {
                    // A missing tx handle ends the whole session, without a
                    // response and without a transport error.
                    tracing::warn!(
                        "session {}: end of unknown transaction {}, terminating",
                        session.id(),
                        handle
                    );
                    return Ok(());
                }
            }
            Command::Bucket => {
                let tx_handle = recv_u64(reader, decoder, &mut read_buf).await?;
                let name = recv_bytes(reader, decoder, &mut read_buf).await?;
                let handle = session.open_bucket(tx_handle, &name);
                encoder.put_u64(handle);
            }
            Command::Get => {
                let bucket_handle = recv_u64(reader, decoder, &mut read_buf).await?;
                let key = recv_bytes(reader, decoder, &mut read_buf).await?;
                let value = session.get(bucket_handle, &key);
                encoder.put_opt_bytes(value.as_deref())?;
            }
            Command::Cursor => {
                let bucket_handle = recv_u64(reader, decoder, &mut read_buf).await?;
                let handle = session.open_cursor(bucket_handle);
                encoder.put_u64(handle);
            }
            Command::CursorSeek => {
                let cursor_handle = recv_u64(reader, decoder, &mut read_buf).await?;
                let seek_key = recv_bytes(reader, decoder, &mut read_buf).await?;
                match session.cursor_seek(cursor_handle, &seek_key) {
                    Some((key, value)) => {
                        encoder.put_bytes(&key)?;
                        encoder.put_bytes(&value)?;
                    }
                    None => {
                        encoder.put_nil();
                        encoder.put_nil();
                    }
                }
            }
            Command::CursorNext => {
                let cursor_handle = recv_u64(reader, decoder, &mut read_buf).await?;
                let count = recv_u64(reader, decoder, &mut read_buf).await?;
                if !session.cursor_exists(cursor_handle) {
                    tracing::warn!(
                        "session {}: next on unknown cursor {}, terminating",
                        session.id(),
                        cursor_handle
                    );
                    return Ok(());
                }
                stream_pairs(session, encoder, writer, cursor_handle, count, false).await?;
            }
            Command::CursorFirst => {
                let cursor_handle = recv_u64(reader, decoder, &mut read_buf).await?;
                let count = recv_u64(reader, decoder, &mut read_buf).await?;
                if !session.cursor_exists(cursor_handle) {
                    tracing::warn!(
                        "session {}: first on unknown cursor {}, terminating",
                        session.id(),
                        cursor_handle
                    );
                    return Ok(());
                }
                stream_pairs(session, encoder, writer, cursor_handle, count, true).await?;
            }
        }

        if encoder.buffered() > 0 {
            writer.write_all(&encoder.take()).await?;
            writer.flush().await?;
        }
    }
}

/// Streams up to `count` (key, value) pairs from a cursor into the encoder,
/// terminating early with a (nil, nil) pair at end-of-range.
///
/// With `from_start` the cursor is first repositioned to the bucket start
/// and that pair is always written, even when `count` is 0; the remaining
/// count is then `count - 1`, saturating.
async fn stream_pairs<W>(
    session: &mut Session,
    encoder: &mut Encoder,
    writer: &mut W,
    cursor_handle: u64,
    count: u64,
    from_start: bool,
) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let mut remaining = count;

    if from_start {
        match session.cursor_advance(cursor_handle, true) {
            Some((key, value)) => {
                encoder.put_bytes(&key)?;
                encoder.put_bytes(&value)?;
                remaining = count.saturating_sub(1);
            }
            None => {
                encoder.put_nil();
                encoder.put_nil();
                remaining = 0;
            }
        }
    }

    while remaining > 0 {
        match session.cursor_advance(cursor_handle, false) {
            Some((key, value)) => {
                encoder.put_bytes(&key)?;
                encoder.put_bytes(&value)?;
                remaining -= 1;
            }
            None => {
                encoder.put_nil();
                encoder.put_nil();
                break;
            }
        }
        if encoder.buffered() >= FLUSH_THRESHOLD {
            writer.write_all(&encoder.take()).await?;
        }
    }

    session.clear_error();
    Ok(())
}

async fn recv_command<R>(
    reader: &mut R,
    decoder: &mut Decoder,
    buf: &mut [u8],
) -> Result<Option<Command>, ServerError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(cmd) = decoder.decode_command()? {
            return Ok(Some(cmd));
        }
        let n = reader.read(buf).await?;
        if n == 0 {
            if decoder.buffered() == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::UnexpectedEof.into());
        }
        decoder.extend(&buf[..n]);
    }
}

async fn recv_u64<R>(
    reader: &mut R,
    decoder: &mut Decoder,
    buf: &mut [u8],
) -> Result<u64, ServerError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(value) = decoder.decode_u64()? {
            return Ok(value);
        }
        let n = reader.read(buf).await?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof.into());
        }
        decoder.extend(&buf[..n]);
    }
}

async fn recv_bytes<R>(
    reader: &mut R,
    decoder: &mut Decoder,
    buf: &mut [u8],
) -> Result<bytes::Bytes, ServerError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(data) = decoder.decode_bytes()? {
            return Ok(data);
        }
        let n = reader.read(buf).await?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof.into());
        }
        decoder.extend(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;
    use viewdb_store::MemoryEngine;

    fn seeded_engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.create_bucket(&b"b"[..]);
        engine.put(b"b", &b"a"[..], &b"1"[..]).unwrap();
        engine.put(b"b", &b"b"[..], &b"2"[..]).unwrap();
        engine.put(b"b", &b"c"[..], &b"3"[..]).unwrap();
        engine
    }

    struct TestClient {
        stream: DuplexStream,
        encoder: Encoder,
        decoder: Decoder,
    }

    impl TestClient {
        async fn send(&mut self, build: impl FnOnce(&mut Encoder)) {
            build(&mut self.encoder);
            self.stream.write_all(&self.encoder.take()).await.unwrap();
        }

        async fn fill(&mut self) {
            let mut buf = [0u8; 1024];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "unexpected end of stream");
            self.decoder.extend(&buf[..n]);
        }

        async fn recv_u64(&mut self) -> u64 {
            loop {
                if let Some(value) = self.decoder.decode_u64().unwrap() {
                    return value;
                }
                self.fill().await;
            }
        }

        async fn recv_bytes(&mut self) -> Bytes {
            loop {
                if let Some(data) = self.decoder.decode_bytes().unwrap() {
                    return data;
                }
                self.fill().await;
            }
        }

        async fn recv_opt_bytes(&mut self) -> Option<Bytes> {
            loop {
                if let Some(value) = self.decoder.decode_opt_bytes().unwrap() {
                    return value;
                }
                self.fill().await;
            }
        }

        async fn expect_eof(&mut self) {
            let mut buf = [0u8; 16];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert_eq!(n, 0, "expected end of stream");
        }
    }

    fn start(engine: MemoryEngine) -> (TestClient, JoinHandle<Result<(), ServerError>>) {
        let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
        let engine: Arc<dyn KvEngine> = Arc::new(engine);
        let peer: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = tokio::spawn(serve_connection(engine, server_stream, peer));
        let client = TestClient {
            stream: client_stream,
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        };
        (client, handle)
    }

    #[tokio::test]
    async fn test_version_handshake() {
        let (mut client, handle) = start(seeded_engine());

        client.send(|e| e.put_command(Command::Version)).await;
        assert_eq!(client.recv_u64().await, PROTOCOL_VERSION);

        drop(client);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_get_existing_and_missing_key() {
        let (mut client, handle) = start(seeded_engine());

        client.send(|e| e.put_command(Command::BeginTx)).await;
        let tx = client.recv_u64().await;
        assert_eq!(tx, 1);

        client
            .send(|e| {
                e.put_command(Command::Bucket);
                e.put_u64(tx);
                e.put_bytes(b"b").unwrap();
            })
            .await;
        let bucket = client.recv_u64().await;
        assert_eq!(bucket, 2);

        client
            .send(|e| {
                e.put_command(Command::Get);
                e.put_u64(bucket);
                e.put_bytes(b"a").unwrap();
            })
            .await;
        assert_eq!(client.recv_opt_bytes().await.unwrap().as_ref(), b"1");

        // Missing key: nil value, and the error slot stays cleared.
        client
            .send(|e| {
                e.put_command(Command::Get);
                e.put_u64(bucket);
                e.put_bytes(b"absent").unwrap();
            })
            .await;
        assert_eq!(client.recv_opt_bytes().await, None);

        client.send(|e| e.put_command(Command::LastError)).await;
        assert_eq!(client.recv_bytes().await.as_ref(), b"<nil>");

        client
            .send(|e| {
                e.put_command(Command::EndTx);
                e.put_u64(tx);
            })
            .await;
        client.send(|e| e.put_command(Command::Version)).await;
        assert_eq!(client.recv_u64().await, PROTOCOL_VERSION);

        drop(client);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_missing_bucket_keeps_session_usable() {
        let (mut client, _handle) = start(seeded_engine());

        client.send(|e| e.put_command(Command::BeginTx)).await;
        let tx = client.recv_u64().await;

        client
            .send(|e| {
                e.put_command(Command::Bucket);
                e.put_u64(tx);
                e.put_bytes(b"nope").unwrap();
            })
            .await;
        assert_eq!(client.recv_u64().await, 0);

        client.send(|e| e.put_command(Command::LastError)).await;
        assert_eq!(client.recv_bytes().await.as_ref(), b"bucket not found");

        client
            .send(|e| {
                e.put_command(Command::Bucket);
                e.put_u64(tx);
                e.put_bytes(b"b").unwrap();
            })
            .await;
        assert!(client.recv_u64().await != 0);
    }

    async fn open_cursor(client: &mut TestClient) -> u64 {
        client.send(|e| e.put_command(Command::BeginTx)).await;
        let tx = client.recv_u64().await;
        client
            .send(|e| {
                e.put_command(Command::Bucket);
                e.put_u64(tx);
                e.put_bytes(b"b").unwrap();
            })
            .await;
        let bucket = client.recv_u64().await;
        client
            .send(|e| {
                e.put_command(Command::Cursor);
                e.put_u64(bucket);
            })
            .await;
        client.recv_u64().await
    }

    #[tokio::test]
    async fn test_cursor_first_streams_until_sentinel() {
        let (mut client, _handle) = start(seeded_engine());
        let cursor = open_cursor(&mut client).await;

        client
            .send(|e| {
                e.put_command(Command::CursorFirst);
                e.put_u64(cursor);
                e.put_u64(10);
            })
            .await;

        for (key, value) in [(&b"a"[..], &b"1"[..]), (b"b", b"2"), (b"c", b"3")] {
            assert_eq!(client.recv_opt_bytes().await.unwrap().as_ref(), key);
            assert_eq!(client.recv_opt_bytes().await.unwrap().as_ref(), value);
        }
        // End-of-range sentinel.
        assert_eq!(client.recv_opt_bytes().await, None);
        assert_eq!(client.recv_opt_bytes().await, None);
    }

    #[tokio::test]
    async fn test_cursor_next_zero_writes_nothing() {
        let (mut client, _handle) = start(seeded_engine());
        let cursor = open_cursor(&mut client).await;

        client
            .send(|e| {
                e.put_command(Command::CursorNext);
                e.put_u64(cursor);
                e.put_u64(0);
            })
            .await;

        // No pairs were written and the cursor did not move: the next
        // advance still yields the first key.
        client
            .send(|e| {
                e.put_command(Command::CursorNext);
                e.put_u64(cursor);
                e.put_u64(1);
            })
            .await;
        assert_eq!(client.recv_opt_bytes().await.unwrap().as_ref(), b"a");
        assert_eq!(client.recv_opt_bytes().await.unwrap().as_ref(), b"1");
    }

    #[tokio::test]
    async fn test_cursor_seek() {
        let (mut client, _handle) = start(seeded_engine());
        let cursor = open_cursor(&mut client).await;

        client
            .send(|e| {
                e.put_command(Command::CursorSeek);
                e.put_u64(cursor);
                e.put_bytes(b"ab").unwrap();
            })
            .await;
        assert_eq!(client.recv_opt_bytes().await.unwrap().as_ref(), b"b");
        assert_eq!(client.recv_opt_bytes().await.unwrap().as_ref(), b"2");

        // Past the last key: (nil, nil).
        client
            .send(|e| {
                e.put_command(Command::CursorSeek);
                e.put_u64(cursor);
                e.put_bytes(b"zz").unwrap();
            })
            .await;
        assert_eq!(client.recv_opt_bytes().await, None);
        assert_eq!(client.recv_opt_bytes().await, None);
    }

    #[tokio::test]
    async fn test_sentinel_sticky_after_exhaustion() {
        let (mut client, _handle) = start(seeded_engine());
        let cursor = open_cursor(&mut client).await;

        client
            .send(|e| {
                e.put_command(Command::CursorNext);
                e.put_u64(cursor);
                e.put_u64(10);
            })
            .await;
        for _ in 0..3 {
            assert!(client.recv_opt_bytes().await.is_some());
            assert!(client.recv_opt_bytes().await.is_some());
        }
        assert_eq!(client.recv_opt_bytes().await, None);
        assert_eq!(client.recv_opt_bytes().await, None);

        // An exhausted cursor keeps answering with the sentinel.
        client
            .send(|e| {
                e.put_command(Command::CursorNext);
                e.put_u64(cursor);
                e.put_u64(5);
            })
            .await;
        assert_eq!(client.recv_opt_bytes().await, None);
        assert_eq!(client.recv_opt_bytes().await, None);
    }

    #[tokio::test]
    async fn test_first_on_empty_bucket() {
        let engine = MemoryEngine::new();
        engine.create_bucket(&b"b"[..]);
        let (mut client, _handle) = start(engine);
        let cursor = open_cursor(&mut client).await;

        client
            .send(|e| {
                e.put_command(Command::CursorFirst);
                e.put_u64(cursor);
                e.put_u64(10);
            })
            .await;
        // Exactly one (nil, nil) pair.
        assert_eq!(client.recv_opt_bytes().await, None);
        assert_eq!(client.recv_opt_bytes().await, None);

        client.send(|e| e.put_command(Command::Version)).await;
        assert_eq!(client.recv_u64().await, PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_unknown_tag_terminates_with_error() {
        let (mut client, handle) = start(seeded_engine());

        client.stream.write_all(&[0xFF]).await.unwrap();
        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::UnknownCommand(0xFF)))
        ));
        client.expect_eof().await;
    }

    #[tokio::test]
    async fn test_end_tx_unknown_handle_terminates() {
        let (mut client, handle) = start(seeded_engine());

        client
            .send(|e| {
                e.put_command(Command::EndTx);
                e.put_u64(99);
            })
            .await;

        // No response is written; the session just ends.
        assert!(handle.await.unwrap().is_ok());
        client.expect_eof().await;
    }

    #[tokio::test]
    async fn test_next_unknown_cursor_terminates() {
        let (mut client, handle) = start(seeded_engine());

        client
            .send(|e| {
                e.put_command(Command::CursorNext);
                e.put_u64(99);
                e.put_u64(5);
            })
            .await;

        assert!(handle.await.unwrap().is_ok());
        client.expect_eof().await;
    }

    #[tokio::test]
    async fn test_disconnect_rolls_back_transactions() {
        let engine = seeded_engine();
        let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
        let engine = Arc::new(engine);
        let peer: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = tokio::spawn(serve_connection(
            engine.clone() as Arc<dyn KvEngine>,
            server_stream,
            peer,
        ));
        let mut client = TestClient {
            stream: client_stream,
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        };

        client.send(|e| e.put_command(Command::BeginTx)).await;
        assert!(client.recv_u64().await != 0);
        assert_eq!(engine.open_transactions(), 1);

        // Drop the connection mid-session: the transaction must be rolled
        // back by the time the session task finishes.
        drop(client);
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(engine.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_eof_mid_arguments_is_protocol_error() {
        let (mut client, handle) = start(seeded_engine());

        // A Get command tag with no arguments, then EOF.
        client.send(|e| e.put_command(Command::Get)).await;
        drop(client);

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::UnexpectedEof))
        ));
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let engine: Arc<dyn KvEngine> = Arc::new(seeded_engine());
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let server = Server::new(config, engine);
        assert!(!server.is_running());
        server.shutdown();
    }
}
