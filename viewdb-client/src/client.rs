//! High-level client API.
//!
//! Mirrors the server's abstractions: a database connection opens read-only
//! transactions, transactions open buckets, buckets answer point lookups and
//! create cursors.

use crate::connection::{ClientConfig, Connection};
use crate::cursor::RemoteCursor;
use crate::error::ClientError;
use bytes::Bytes;
use std::future::Future;

/// A remote viewdb database.
pub struct RemoteDb {
    conn: Connection,
    page_size: u64,
}

impl RemoteDb {
    /// Connects to a server and performs the version handshake.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let page_size = config.page_size;
        let conn = Connection::connect(&config).await?;
        Ok(Self { conn, page_size })
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Asks the server for its protocol version.
    pub async fn server_version(&self) -> Result<u64, ClientError> {
        self.conn.version().await
    }

    /// Runs `f` inside a read-only transaction.
    ///
    /// The transaction is always ended (rolled back server-side) when `f`
    /// returns, whether it succeeded or not. `f`'s error is the result of
    /// `view`; a protocol error while ending the transaction overrides it.
    pub async fn view<'c, T, F, Fut>(&'c self, f: F) -> Result<T, ClientError>
    where
        F: FnOnce(RemoteTx<'c>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let handle = self.conn.begin_tx().await?;
        if handle == 0 {
            let message = self.conn.last_error().await?;
            return Err(ClientError::Server(message));
        }

        let tx = RemoteTx {
            conn: &self.conn,
            handle,
            page_size: self.page_size,
        };
        let op_result = f(tx).await;

        self.conn.end_tx(handle).await?;
        op_result
    }
}

/// A read-only transaction on the remote database.
#[derive(Clone, Copy)]
pub struct RemoteTx<'c> {
    conn: &'c Connection,
    handle: u64,
    page_size: u64,
}

impl<'c> RemoteTx<'c> {
    /// Returns the server-side transaction handle.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Opens a bucket by name.
    pub async fn bucket(&self, name: &[u8]) -> Result<RemoteBucket<'c>, ClientError> {
        let handle = self.conn.open_bucket(self.handle, name).await?;
        if handle == 0 {
            let message = self.conn.last_error().await?;
            return Err(ClientError::Server(message));
        }
        Ok(RemoteBucket {
            conn: self.conn,
            handle,
            page_size: self.page_size,
        })
    }
}

/// A bucket opened within a remote transaction.
#[derive(Clone, Copy)]
pub struct RemoteBucket<'c> {
    conn: &'c Connection,
    handle: u64,
    page_size: u64,
}

impl<'c> RemoteBucket<'c> {
    /// Returns the server-side bucket handle.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Returns the value for `key`, or `None` when the key is absent.
    ///
    /// An absent key and a command-level failure are indistinguishable here;
    /// a client that needs the distinction must query the session's last
    /// error immediately afterwards.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, ClientError> {
        self.conn.get(self.handle, key).await
    }

    /// Creates a streaming cursor over this bucket.
    pub async fn cursor(&self) -> Result<RemoteCursor<'c>, ClientError> {
        let handle = self.conn.open_cursor(self.handle).await?;
        if handle == 0 {
            let message = self.conn.last_error().await?;
            return Err(ClientError::Server(message));
        }
        Ok(RemoteCursor::new(self.conn, handle, self.page_size))
    }
}
