//! Per-session state and command semantics.
//!
//! A session owns everything a connection has opened. Execution within a
//! session is strictly sequential (one command at a time), so no locking is
//! involved; dropping the session drops the registry, which rolls back every
//! transaction still open.

use crate::registry::HandleRegistry;
use bytes::Bytes;
use uuid::Uuid;
use viewdb_store::KvEngine;

/// Wire text reported by LastError when no error is recorded.
const NO_ERROR: &str = "<nil>";

/// State of one client session.
///
/// `last_error` holds the most recent command-level error; every command
/// that completes overwrites it (success clears it), so it is only
/// meaningful to a client querying it immediately after the failing command.
pub struct Session {
    id: Uuid,
    registry: HandleRegistry,
    last_error: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            registry: HandleRegistry::new(),
            last_error: None,
        }
    }

    /// Returns the session id used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the text the LastError command reports.
    pub fn last_error_text(&self) -> String {
        self.last_error
            .clone()
            .unwrap_or_else(|| NO_ERROR.to_string())
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Opens a read-only transaction. Returns its handle, or 0 on failure.
    pub fn begin_tx(&mut self, engine: &dyn KvEngine) -> u64 {
        match engine.begin_read_only() {
            Ok(tx) => {
                let handle = self.registry.alloc();
                self.registry.insert_tx(handle, tx);
                self.last_error = None;
                handle
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                0
            }
        }
    }

    /// Ends (rolls back) a transaction, releasing every bucket and cursor
    /// opened in it.
    ///
    /// Returns `false` when the handle is unknown; the caller terminates the
    /// session in that case.
    pub fn end_tx(&mut self, handle: u64) -> bool {
        match self.registry.drop_tx(handle) {
            Some(tx) => {
                drop(tx);
                self.last_error = None;
                true
            }
            None => {
                self.last_error = Some("transaction not found".to_string());
                false
            }
        }
    }

    /// Opens a bucket by name within a transaction. Returns its handle, or 0
    /// on failure.
    pub fn open_bucket(&mut self, tx_handle: u64, name: &[u8]) -> u64 {
        let bucket = match self.registry.tx(tx_handle) {
            Some(tx) => tx.bucket(name),
            None => {
                self.last_error = Some("transaction not found".to_string());
                return 0;
            }
        };
        match bucket {
            Some(bucket) => {
                let handle = self.registry.alloc();
                self.registry.insert_bucket(handle, bucket, tx_handle);
                self.last_error = None;
                handle
            }
            None => {
                self.last_error = Some("bucket not found".to_string());
                0
            }
        }
    }

    /// Returns the value for a key, or `None` when the key is absent or the
    /// bucket handle is unknown (the two are indistinguishable on the wire).
    pub fn get(&mut self, bucket_handle: u64, key: &[u8]) -> Option<Bytes> {
        match self.registry.bucket(bucket_handle) {
            Some(bucket) => {
                let value = bucket.get(key);
                self.last_error = None;
                value
            }
            None => {
                self.last_error = Some("bucket not found".to_string());
                None
            }
        }
    }

    /// Creates a cursor over a bucket. Returns its handle, or 0 on failure.
    pub fn open_cursor(&mut self, bucket_handle: u64) -> u64 {
        let cursor = match self.registry.bucket(bucket_handle) {
            Some(bucket) => bucket.cursor(),
            None => {
                self.last_error = Some("bucket not found".to_string());
                return 0;
            }
        };
        let handle = self.registry.alloc();
        self.registry.insert_cursor(handle, cursor, bucket_handle);
        self.last_error = None;
        handle
    }

    /// Moves a cursor to the smallest key `>= key` and returns the pair
    /// there, or `None` past the end of the bucket or when the cursor handle
    /// is unknown.
    pub fn cursor_seek(&mut self, cursor_handle: u64, key: &[u8]) -> Option<(Bytes, Bytes)> {
        match self.registry.cursor_mut(cursor_handle) {
            Some(cursor) => {
                let pair = cursor.seek(key);
                self.last_error = None;
                pair
            }
            None => {
                self.last_error = Some("cursor not found".to_string());
                None
            }
        }
    }

    /// Checks that a cursor handle exists before a paged command streams
    /// from it, recording the error when it does not.
    pub fn cursor_exists(&mut self, cursor_handle: u64) -> bool {
        if self.registry.contains_cursor(cursor_handle) {
            true
        } else {
            self.last_error = Some("cursor not found".to_string());
            false
        }
    }

    /// Advances a cursor (or repositions it to the bucket start) and returns
    /// the pair there. Does not touch `last_error`; the paged commands clear
    /// it once their stream completes.
    pub fn cursor_advance(&mut self, cursor_handle: u64, from_start: bool) -> Option<(Bytes, Bytes)> {
        let cursor = self.registry.cursor_mut(cursor_handle)?;
        if from_start {
            cursor.first()
        } else {
            cursor.next()
        }
    }

    /// Returns the registry, for accounting checks.
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
