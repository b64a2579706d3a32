//! Client-side streaming cursor with batched page prefetch.

use crate::connection::Connection;
use crate::error::ClientError;
use bytes::Bytes;
use viewdb_protocol::Command;

/// Default prefetch page capacity, in (key, value) pairs.
pub const DEFAULT_PAGE_SIZE: u64 = 100_000;

/// Preallocated capacity of each page slot buffer, in bytes. Slots grow past
/// this on demand and keep their allocation across refills.
const SLOT_CAPACITY: usize = 64;

/// A page of prefetched (key, value) pairs.
///
/// Slot buffers are preallocated once and the decoder reads directly into
/// them, so steady-state iteration allocates nothing per pair.
pub(crate) struct Page {
    pub(crate) keys: Vec<Vec<u8>>,
    pub(crate) values: Vec<Vec<u8>>,
    /// High-water index: number of real pairs decoded into the page.
    pub(crate) last_idx: usize,
    /// Read index of the next pair to hand out.
    pub(crate) idx: usize,
    /// Whether the end-of-range sentinel was observed while filling.
    pub(crate) end_of_range: bool,
}

impl Page {
    fn new(capacity: usize) -> Self {
        Self {
            keys: (0..capacity).map(|_| Vec::with_capacity(SLOT_CAPACITY)).collect(),
            values: (0..capacity)
                .map(|_| Vec::with_capacity(SLOT_CAPACITY))
                .collect(),
            last_idx: 0,
            idx: 0,
            end_of_range: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last_idx = 0;
        self.idx = 0;
        self.end_of_range = false;
    }

    fn is_exhausted(&self) -> bool {
        self.idx == self.last_idx
    }
}

/// A positioned iterator over a remote bucket, prefetching pages of pairs.
///
/// `first` and `next` return slices borrowed from the page slots; they are
/// valid until the cursor is advanced again.
pub struct RemoteCursor<'c> {
    conn: &'c Connection,
    handle: u64,
    page_size: u64,
    page: Page,
}

impl<'c> RemoteCursor<'c> {
    pub(crate) fn new(conn: &'c Connection, handle: u64, page_size: u64) -> Self {
        Self {
            conn,
            handle,
            page_size,
            page: Page::new(page_size as usize),
        }
    }

    /// Returns the server-side cursor handle.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Moves to the first key of the bucket and returns its pair, refilling
    /// the page. `None` means the bucket is empty.
    pub async fn first(&mut self) -> Result<Option<(&[u8], &[u8])>, ClientError> {
        self.conn
            .fetch_page(Command::CursorFirst, self.handle, self.page_size, &mut self.page)
            .await?;
        Ok(self.take_slot())
    }

    /// Advances to the next key and returns its pair, refilling the page
    /// when it is exhausted. `None` means end of the bucket; once seen,
    /// further calls keep returning `None` without another round trip until
    /// the cursor is repositioned.
    pub async fn next(&mut self) -> Result<Option<(&[u8], &[u8])>, ClientError> {
        if self.page.is_exhausted() {
            if self.page.end_of_range {
                return Ok(None);
            }
            self.conn
                .fetch_page(Command::CursorNext, self.handle, self.page_size, &mut self.page)
                .await?;
        }
        Ok(self.take_slot())
    }

    /// Moves to the smallest key `>= key` in a single round trip, bypassing
    /// the page. Prefetched pairs from before the seek are discarded.
    pub async fn seek(&mut self, key: &[u8]) -> Result<Option<(Bytes, Bytes)>, ClientError> {
        let pair = self.conn.cursor_seek(self.handle, key).await?;
        self.page.reset();
        Ok(pair)
    }

    fn take_slot(&mut self) -> Option<(&[u8], &[u8])> {
        if self.page.idx < self.page.last_idx {
            let i = self.page.idx;
            self.page.idx += 1;
            Some((self.page.keys[i].as_slice(), self.page.values[i].as_slice()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slots_preallocated() {
        let page = Page::new(4);
        assert_eq!(page.keys.len(), 4);
        assert_eq!(page.values.len(), 4);
        assert!(page.keys.iter().all(|k| k.capacity() >= SLOT_CAPACITY));
    }

    #[test]
    fn test_page_reset() {
        let mut page = Page::new(2);
        page.last_idx = 2;
        page.idx = 1;
        page.end_of_range = true;

        page.reset();
        assert_eq!(page.last_idx, 0);
        assert_eq!(page.idx, 0);
        assert!(!page.end_of_range);
        assert!(page.is_exhausted());
    }
}
