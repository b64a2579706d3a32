//! # viewdb-store
//!
//! Storage contract for viewdb.
//!
//! This crate provides:
//! - The engine traits the server serves over the wire: read-only
//!   transactions, named buckets, point lookups, and ordered cursors
//! - An in-memory reference engine with snapshot isolation
//!
//! Any ordered key-value store offering read-only snapshots can back a
//! viewdb server by implementing [`KvEngine`].

pub mod error;
pub mod memory;

pub use error::StoreError;
pub use memory::MemoryEngine;

use bytes::Bytes;

/// An ordered key-value store that can open read-only transactions.
pub trait KvEngine: Send + Sync + 'static {
    /// Opens a read-only transaction.
    ///
    /// Dropping the returned transaction rolls it back; there is no commit.
    fn begin_read_only(&self) -> Result<Box<dyn KvTx>, StoreError>;
}

/// A read-only transaction: a consistent snapshot of the store.
pub trait KvTx: Send {
    /// Opens the named bucket, or returns `None` when it does not exist.
    fn bucket(&self, name: &[u8]) -> Option<Box<dyn KvBucket>>;
}

/// A named ordered keyspace within a transaction.
pub trait KvBucket: Send {
    /// Returns the value for `key`, or `None` when the key is absent.
    fn get(&self, key: &[u8]) -> Option<Bytes>;

    /// Creates a cursor positioned before the first key of the bucket.
    fn cursor(&self) -> Box<dyn KvCursor>;
}

/// A positioned iterator over a bucket, advancing in ascending key order.
///
/// `None` from any method means end-of-range; once a cursor has run off the
/// end, [`KvCursor::next`] keeps returning `None` until it is repositioned
/// with [`KvCursor::first`] or [`KvCursor::seek`].
pub trait KvCursor: Send {
    /// Moves to the first key and returns its pair.
    fn first(&mut self) -> Option<(Bytes, Bytes)>;

    /// Moves to the smallest key `>= key` and returns its pair.
    fn seek(&mut self, key: &[u8]) -> Option<(Bytes, Bytes)>;

    /// Advances to the next key and returns its pair.
    fn next(&mut self) -> Option<(Bytes, Bytes)>;
}
