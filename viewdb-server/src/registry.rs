//! Handle registry.
//!
//! Per-session bookkeeping of the entities a client has opened. The natural
//! shape is a tree (transaction -> buckets -> cursors), kept here as three
//! flat handle-keyed maps plus two parent-to-children indices so transitive
//! removal on transaction end is a straight index walk.

use std::collections::HashMap;
use viewdb_store::{KvBucket, KvCursor, KvTx};

/// Registry of the transactions, buckets, and cursors of one session.
///
/// Handles come from a single monotonically increasing counter shared by all
/// three entity kinds; handle 0 is never allocated (it means "error" on the
/// wire) and handles are never reused within a session.
pub struct HandleRegistry {
    last_handle: u64,
    txs: HashMap<u64, Box<dyn KvTx>>,
    buckets: HashMap<u64, Box<dyn KvBucket>>,
    cursors: HashMap<u64, Box<dyn KvCursor>>,
    buckets_by_tx: HashMap<u64, Vec<u64>>,
    cursors_by_bucket: HashMap<u64, Vec<u64>>,
}

/// Sizes of the registry maps, for accounting checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryCounts {
    pub txs: usize,
    pub buckets: usize,
    pub cursors: usize,
    pub bucket_lists: usize,
    pub cursor_lists: usize,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            last_handle: 0,
            txs: HashMap::new(),
            buckets: HashMap::new(),
            cursors: HashMap::new(),
            buckets_by_tx: HashMap::new(),
            cursors_by_bucket: HashMap::new(),
        }
    }

    /// Allocates the next handle. Never returns 0.
    pub fn alloc(&mut self) -> u64 {
        self.last_handle += 1;
        self.last_handle
    }

    /// Records a transaction under `handle`.
    pub fn insert_tx(&mut self, handle: u64, tx: Box<dyn KvTx>) {
        self.txs.insert(handle, tx);
    }

    /// Records a bucket under `handle` as a child of `parent_tx`.
    pub fn insert_bucket(&mut self, handle: u64, bucket: Box<dyn KvBucket>, parent_tx: u64) {
        self.buckets.insert(handle, bucket);
        self.buckets_by_tx.entry(parent_tx).or_default().push(handle);
    }

    /// Records a cursor under `handle` as a child of `parent_bucket`.
    pub fn insert_cursor(&mut self, handle: u64, cursor: Box<dyn KvCursor>, parent_bucket: u64) {
        self.cursors.insert(handle, cursor);
        self.cursors_by_bucket
            .entry(parent_bucket)
            .or_default()
            .push(handle);
    }

    /// Removes a transaction and, transitively, every bucket opened in it
    /// and every cursor opened in those buckets.
    ///
    /// Returns the transaction so the caller controls when it is dropped
    /// (dropping rolls it back).
    pub fn drop_tx(&mut self, handle: u64) -> Option<Box<dyn KvTx>> {
        let tx = self.txs.remove(&handle)?;
        if let Some(bucket_handles) = self.buckets_by_tx.remove(&handle) {
            for bucket_handle in bucket_handles {
                if let Some(cursor_handles) = self.cursors_by_bucket.remove(&bucket_handle) {
                    for cursor_handle in cursor_handles {
                        self.cursors.remove(&cursor_handle);
                    }
                }
                self.buckets.remove(&bucket_handle);
            }
        }
        Some(tx)
    }

    pub fn contains_tx(&self, handle: u64) -> bool {
        self.txs.contains_key(&handle)
    }

    pub fn tx(&self, handle: u64) -> Option<&dyn KvTx> {
        self.txs.get(&handle).map(|tx| tx.as_ref())
    }

    pub fn bucket(&self, handle: u64) -> Option<&dyn KvBucket> {
        self.buckets.get(&handle).map(|bucket| bucket.as_ref())
    }

    pub fn contains_cursor(&self, handle: u64) -> bool {
        self.cursors.contains_key(&handle)
    }

    pub fn cursor_mut(&mut self, handle: u64) -> Option<&mut (dyn KvCursor + '_)> {
        match self.cursors.get_mut(&handle) {
            Some(cursor) => Some(cursor.as_mut()),
            None => None,
        }
    }

    /// Returns the current sizes of all five maps.
    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            txs: self.txs.len(),
            buckets: self.buckets.len(),
            cursors: self.cursors.len(),
            bucket_lists: self.buckets_by_tx.len(),
            cursor_lists: self.cursors_by_bucket.len(),
        }
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
