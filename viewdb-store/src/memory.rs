//! In-memory reference engine.
//!
//! Buckets are copy-on-write: a read-only transaction clones the bucket
//! table (cheap, the per-bucket maps are shared behind `Arc`), and writers
//! clone a bucket's map before mutating it when a snapshot still holds it.
//! An open transaction therefore observes the store exactly as it was when
//! the transaction began.

use crate::error::StoreError;
use crate::{KvBucket, KvCursor, KvEngine, KvTx};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type BucketMap = BTreeMap<Bytes, Bytes>;

/// In-memory ordered key-value engine with snapshot isolation.
pub struct MemoryEngine {
    buckets: RwLock<BTreeMap<Vec<u8>, Arc<BucketMap>>>,
    open_txs: Arc<AtomicUsize>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            open_txs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a bucket. Creating an existing bucket is a no-op.
    pub fn create_bucket(&self, name: impl Into<Vec<u8>>) {
        self.buckets
            .write()
            .entry(name.into())
            .or_insert_with(|| Arc::new(BTreeMap::new()));
    }

    /// Inserts a key-value pair into an existing bucket.
    ///
    /// Open transactions keep seeing the pre-write snapshot.
    pub fn put(
        &self,
        bucket: &[u8],
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<(), StoreError> {
        let mut buckets = self.buckets.write();
        let entries = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::BucketNotFound(String::from_utf8_lossy(bucket).into()))?;
        Arc::make_mut(entries).insert(key.into(), value.into());
        Ok(())
    }

    /// Returns the number of currently open read-only transactions.
    pub fn open_transactions(&self) -> usize {
        self.open_txs.load(Ordering::Acquire)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KvEngine for MemoryEngine {
    fn begin_read_only(&self) -> Result<Box<dyn KvTx>, StoreError> {
        let snapshot = self.buckets.read().clone();
        self.open_txs.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryTx {
            snapshot,
            _guard: OpenTxGuard(self.open_txs.clone()),
        }))
    }
}

/// Decrements the open-transaction count when the transaction is dropped.
struct OpenTxGuard(Arc<AtomicUsize>);

impl Drop for OpenTxGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct MemoryTx {
    snapshot: BTreeMap<Vec<u8>, Arc<BucketMap>>,
    _guard: OpenTxGuard,
}

impl KvTx for MemoryTx {
    fn bucket(&self, name: &[u8]) -> Option<Box<dyn KvBucket>> {
        let entries = self.snapshot.get(name)?.clone();
        Some(Box::new(MemoryBucket { entries }))
    }
}

struct MemoryBucket {
    entries: Arc<BucketMap>,
}

impl KvBucket for MemoryBucket {
    fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.entries.get(key).cloned()
    }

    fn cursor(&self) -> Box<dyn KvCursor> {
        Box::new(MemoryCursor {
            entries: self.entries.clone(),
            pos: CursorPos::Start,
        })
    }
}

enum CursorPos {
    /// Before the first key.
    Start,
    /// At the given key.
    At(Bytes),
    /// Past the last key.
    End,
}

struct MemoryCursor {
    entries: Arc<BucketMap>,
    pos: CursorPos,
}

impl MemoryCursor {
    fn advance_from(&mut self, lower: Bound<&[u8]>) -> Option<(Bytes, Bytes)> {
        match self
            .entries
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
        {
            Some((key, value)) => {
                self.pos = CursorPos::At(key.clone());
                Some((key.clone(), value.clone()))
            }
            None => {
                self.pos = CursorPos::End;
                None
            }
        }
    }
}

impl KvCursor for MemoryCursor {
    fn first(&mut self) -> Option<(Bytes, Bytes)> {
        self.advance_from(Bound::Unbounded)
    }

    fn seek(&mut self, key: &[u8]) -> Option<(Bytes, Bytes)> {
        self.advance_from(Bound::Included(key))
    }

    fn next(&mut self) -> Option<(Bytes, Bytes)> {
        match &self.pos {
            CursorPos::Start => self.advance_from(Bound::Unbounded),
            CursorPos::At(key) => {
                let key = key.clone();
                self.advance_from(Bound::Excluded(key.as_ref()))
            }
            CursorPos::End => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.create_bucket(&b"b"[..]);
        engine.put(b"b", &b"a"[..], &b"1"[..]).unwrap();
        engine.put(b"b", &b"b"[..], &b"2"[..]).unwrap();
        engine.put(b"b", &b"c"[..], &b"3"[..]).unwrap();
        engine
    }

    #[test]
    fn test_get() {
        let engine = seeded_engine();
        let tx = engine.begin_read_only().unwrap();
        let bucket = tx.bucket(b"b").unwrap();

        assert_eq!(bucket.get(b"a").unwrap().as_ref(), b"1");
        assert_eq!(bucket.get(b"absent"), None);
    }

    #[test]
    fn test_missing_bucket() {
        let engine = seeded_engine();
        let tx = engine.begin_read_only().unwrap();
        assert!(tx.bucket(b"nope").is_none());
    }

    #[test]
    fn test_put_missing_bucket() {
        let engine = MemoryEngine::new();
        let result = engine.put(b"nope", &b"k"[..], &b"v"[..]);
        assert!(matches!(result, Err(StoreError::BucketNotFound(_))));
    }

    #[test]
    fn test_cursor_order() {
        let engine = seeded_engine();
        let tx = engine.begin_read_only().unwrap();
        let bucket = tx.bucket(b"b").unwrap();
        let mut cursor = bucket.cursor();

        let (k, v) = cursor.first().unwrap();
        assert_eq!((k.as_ref(), v.as_ref()), (&b"a"[..], &b"1"[..]));
        let (k, _) = cursor.next().unwrap();
        assert_eq!(k.as_ref(), b"b");
        let (k, _) = cursor.next().unwrap();
        assert_eq!(k.as_ref(), b"c");
        assert!(cursor.next().is_none());
        // Exhausted cursors stay exhausted until repositioned.
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_cursor_next_from_start() {
        let engine = seeded_engine();
        let tx = engine.begin_read_only().unwrap();
        let bucket = tx.bucket(b"b").unwrap();
        let mut cursor = bucket.cursor();

        // A fresh cursor is positioned before the first key.
        let (k, _) = cursor.next().unwrap();
        assert_eq!(k.as_ref(), b"a");
    }

    #[test]
    fn test_cursor_seek() {
        let engine = seeded_engine();
        let tx = engine.begin_read_only().unwrap();
        let bucket = tx.bucket(b"b").unwrap();
        let mut cursor = bucket.cursor();

        // Exact hit.
        let (k, v) = cursor.seek(b"b").unwrap();
        assert_eq!((k.as_ref(), v.as_ref()), (&b"b"[..], &b"2"[..]));

        // Between keys: smallest key >= the target.
        let (k, _) = cursor.seek(b"ab").unwrap();
        assert_eq!(k.as_ref(), b"b");

        // Past the end.
        assert!(cursor.seek(b"zz").is_none());

        // Seek repositions an exhausted cursor.
        let (k, _) = cursor.seek(b"a").unwrap();
        assert_eq!(k.as_ref(), b"a");
        let (k, _) = cursor.next().unwrap();
        assert_eq!(k.as_ref(), b"b");
    }

    #[test]
    fn test_first_repositions() {
        let engine = seeded_engine();
        let tx = engine.begin_read_only().unwrap();
        let bucket = tx.bucket(b"b").unwrap();
        let mut cursor = bucket.cursor();

        while cursor.next().is_some() {}
        let (k, _) = cursor.first().unwrap();
        assert_eq!(k.as_ref(), b"a");
    }

    #[test]
    fn test_empty_bucket_cursor() {
        let engine = MemoryEngine::new();
        engine.create_bucket(&b"empty"[..]);
        let tx = engine.begin_read_only().unwrap();
        let bucket = tx.bucket(b"empty").unwrap();
        let mut cursor = bucket.cursor();

        assert!(cursor.first().is_none());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_snapshot_isolation() {
        let engine = seeded_engine();
        let tx = engine.begin_read_only().unwrap();

        engine.put(b"b", &b"d"[..], &b"4"[..]).unwrap();
        engine.create_bucket(&b"late"[..]);

        // The open transaction sees neither the new key nor the new bucket.
        let bucket = tx.bucket(b"b").unwrap();
        assert_eq!(bucket.get(b"d"), None);
        assert!(tx.bucket(b"late").is_none());

        // A fresh transaction sees both.
        let tx2 = engine.begin_read_only().unwrap();
        let bucket2 = tx2.bucket(b"b").unwrap();
        assert_eq!(bucket2.get(b"d").unwrap().as_ref(), b"4");
        assert!(tx2.bucket(b"late").is_some());
    }

    #[test]
    fn test_open_transaction_count() {
        let engine = seeded_engine();
        assert_eq!(engine.open_transactions(), 0);

        let tx1 = engine.begin_read_only().unwrap();
        let tx2 = engine.begin_read_only().unwrap();
        assert_eq!(engine.open_transactions(), 2);

        drop(tx1);
        assert_eq!(engine.open_transactions(), 1);
        drop(tx2);
        assert_eq!(engine.open_transactions(), 0);
    }
}
