// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable multi-column FIFO queue backed by sled.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::QueueError;
use crate::key;

/// In-memory bookkeeping for one column, rebuilt from disk on open.
#[derive(Debug, Clone, Copy, Default)]
struct ColumnState {
    /// Sequence assigned to the next push. Monotonic, never reused.
    next_sequence: u64,
    /// Surviving entries in the column.
    len: u64,
}

/// Crash-safe store multiplexing independent FIFO columns into one sled
/// database.
///
/// Columns are identified by decimal numeric names (`"001"` and `"1"` denote
/// the same column) and created implicitly on first [`push`]. All mutating
/// operations are safe under concurrent callers; no external locking is
/// required.
///
/// Payloads are opaque bytes and binary-safe end to end, embedded zero bytes
/// included.
///
/// [`push`]: ColumnQueue::push
#[derive(Debug)]
pub struct ColumnQueue {
    db: sled::Db,
    columns: Mutex<HashMap<u64, ColumnState>>,
}

#[allow(clippy::expect_used)]
impl ColumnQueue {
    /// Opens (or creates) the store at `path` and rebuilds all column state
    /// from the on-disk keys.
    ///
    /// Keys written by older versions without fixed-width padding are
    /// migrated to the canonical form in a single atomic batch; their order
    /// is determined by numeric interpretation of the key components, not by
    /// raw byte comparison. The first push after recovery resumes from
    /// `max(sequence) + 1` for the affected column.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on keys that cannot be interpreted as
    /// `<column>_<sequence>`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let db = sled::open(path)?;
        let columns = Self::recover(&db)?;
        debug!(columns = columns.len(), "column queue opened");
        Ok(Self {
            db,
            columns: Mutex::new(columns),
        })
    }

    fn recover(db: &sled::Db) -> Result<HashMap<u64, ColumnState>, QueueError> {
        let mut columns: HashMap<u64, ColumnState> = HashMap::new();
        let mut legacy: Vec<(sled::IVec, u64, u64, sled::IVec)> = Vec::new();

        for entry in db.iter() {
            let (raw_key, value) = entry?;
            let (column, sequence) = key::decode(&raw_key)?;

            let state = columns.entry(column).or_default();
            state.len += 1;
            state.next_sequence = state.next_sequence.max(sequence + 1);

            if !key::is_canonical(&raw_key) {
                legacy.push((raw_key, column, sequence, value));
            }
        }

        if !legacy.is_empty() {
            let migrated = legacy.len();
            let mut batch = sled::Batch::default();
            for (raw_key, column, sequence, value) in legacy {
                batch.remove(raw_key);
                batch.insert(key::encode(column, sequence).as_bytes(), value);
            }
            db.apply_batch(batch)?;
            db.flush()?;
            info!(keys = migrated, "migrated legacy queue keys to padded form");
        }

        Ok(columns)
    }

    /// Appends `payload` at the tail of the named column, creating the
    /// column if it does not exist yet. The entry is flushed to disk before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Fails on invalid column names and on storage I/O failures, which are
    /// fatal for this operation and surfaced to the caller.
    pub fn push(&self, queue_name: &str, payload: &[u8]) -> Result<(), QueueError> {
        let column = key::parse_column(queue_name)?;

        let mut columns = self.columns.lock().expect("column registry lock poisoned");
        let state = columns.entry(column).or_insert(ColumnState {
            next_sequence: 1,
            len: 0,
        });

        let physical_key = key::encode(column, state.next_sequence);
        self.db.insert(physical_key.as_bytes(), payload)?;
        self.db.flush()?;

        state.next_sequence += 1;
        state.len += 1;
        Ok(())
    }

    /// Returns the head entry of the named column without removing it.
    ///
    /// # Errors
    ///
    /// [`QueueError::Empty`] if the column holds no entries.
    pub fn front(&self, queue_name: &str) -> Result<Vec<u8>, QueueError> {
        let column = key::parse_column(queue_name)?;
        match self.head_entry(column)? {
            Some((_, value)) => Ok(value.to_vec()),
            None => Err(QueueError::Empty(queue_name.to_string())),
        }
    }

    /// Removes the head entry of the named column.
    ///
    /// Popping an empty column is reported as [`QueueError::Empty`]; it
    /// never touches another column.
    pub fn pop(&self, queue_name: &str) -> Result<(), QueueError> {
        let column = key::parse_column(queue_name)?;

        let mut columns = self.columns.lock().expect("column registry lock poisoned");
        let Some((head_key, _)) = self.head_entry(column)? else {
            return Err(QueueError::Empty(queue_name.to_string()));
        };

        self.db.remove(head_key)?;
        self.db.flush()?;
        if let Some(state) = columns.get_mut(&column) {
            state.len = state.len.saturating_sub(1);
        }
        Ok(())
    }

    /// Returns up to `limit` head entries of the named column in sequence
    /// order, without removing them. An empty column yields an empty vector.
    pub fn peek_batch(&self, queue_name: &str, limit: usize) -> Result<Vec<Vec<u8>>, QueueError> {
        let column = key::parse_column(queue_name)?;
        let prefix = key::column_prefix(column);

        let mut entries = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()).take(limit) {
            let (_, value) = item?;
            entries.push(value.to_vec());
        }
        Ok(entries)
    }

    /// Removes the first `count` entries of the named column in one atomic
    /// write followed by a flush. This is the acknowledgment point for
    /// delivered batches: either every entry is removed or none is.
    ///
    /// Removes fewer entries if the column holds fewer than `count`.
    pub fn pop_batch(&self, queue_name: &str, count: usize) -> Result<(), QueueError> {
        let column = key::parse_column(queue_name)?;
        let prefix = key::column_prefix(column);

        let mut columns = self.columns.lock().expect("column registry lock poisoned");

        let mut batch = sled::Batch::default();
        let mut removed: u64 = 0;
        for item in self.db.scan_prefix(prefix.as_bytes()).take(count) {
            let (head_key, _) = item?;
            batch.remove(head_key);
            removed += 1;
        }
        if removed == 0 {
            return Ok(());
        }

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        if let Some(state) = columns.get_mut(&column) {
            state.len = state.len.saturating_sub(removed);
        }
        Ok(())
    }

    /// Count of surviving entries in the named column. Correct after
    /// recovery from any prior process state, including legacy unpadded
    /// keys.
    pub fn size(&self, queue_name: &str) -> Result<u64, QueueError> {
        let column = key::parse_column(queue_name)?;
        let columns = self.columns.lock().expect("column registry lock poisoned");
        Ok(columns.get(&column).map_or(0, |state| state.len))
    }

    /// Total surviving entries across all columns.
    pub fn len(&self) -> u64 {
        let columns = self.columns.lock().expect("column registry lock poisoned");
        columns.values().map(|state| state.len).sum()
    }

    /// True only if the entire store, all columns included, has zero
    /// entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all columns currently holding entries, in ascending numeric
    /// order.
    pub fn columns(&self) -> Vec<String> {
        let columns = self.columns.lock().expect("column registry lock poisoned");
        let mut ids: Vec<u64> = columns
            .iter()
            .filter(|(_, state)| state.len > 0)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids.iter().map(u64::to_string).collect()
    }

    fn head_entry(&self, column: u64) -> Result<Option<(sled::IVec, sled::IVec)>, QueueError> {
        let prefix = key::column_prefix(column);
        match self.db.scan_prefix(prefix.as_bytes()).next() {
            Some(entry) => Ok(Some(entry?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_queue() -> (tempfile::TempDir, ColumnQueue) {
        let dir = tempfile::TempDir::new().unwrap();
        let queue = ColumnQueue::open(dir.path()).unwrap();
        (dir, queue)
    }

    #[test]
    fn push_increases_size_and_non_empty_state() {
        let (_dir, queue) = open_queue();

        queue.push("001", b"first").unwrap();
        queue.push("001", b"second").unwrap();
        queue.push("002", b"third").unwrap();

        assert_eq!(queue.size("001").unwrap(), 2);
        assert_eq!(queue.size("002").unwrap(), 1);
        assert!(!queue.is_empty());
    }

    #[test]
    fn front_returns_first_element() {
        let (_dir, queue) = open_queue();

        queue.push("001", b"value1").unwrap();
        queue.push("001", b"value2").unwrap();

        assert_eq!(queue.front("001").unwrap(), b"value1");
        // front does not consume
        assert_eq!(queue.front("001").unwrap(), b"value1");
        assert_eq!(queue.size("001").unwrap(), 2);
    }

    #[test]
    fn pop_removes_first_element() {
        let (_dir, queue) = open_queue();

        queue.push("001", b"a").unwrap();
        queue.push("001", b"b").unwrap();
        queue.push("002", b"c").unwrap();

        queue.pop("001").unwrap();

        assert_eq!(queue.front("001").unwrap(), b"b");
        assert_eq!(queue.size("001").unwrap(), 1);
        // the other column is untouched
        assert_eq!(queue.front("002").unwrap(), b"c");
        assert_eq!(queue.size("002").unwrap(), 1);
    }

    #[test]
    fn fifo_order_with_binary_payloads() {
        let (_dir, queue) = open_queue();
        let binary: &[u8] = &[0xA1, 0x3A, 0x5F, 0x00, 0x10, 0xDA, 0x0F, 0x1A];

        queue.push("001", b"plain").unwrap();
        queue.push("001", binary).unwrap();
        queue.push("001", b"").unwrap();

        assert_eq!(queue.front("001").unwrap(), b"plain");
        queue.pop("001").unwrap();
        assert_eq!(queue.front("001").unwrap(), binary);
        queue.pop("001").unwrap();
        assert_eq!(queue.front("001").unwrap(), b"");
        queue.pop("001").unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn size_reflects_pushes_minus_pops() {
        let (_dir, queue) = open_queue();

        for i in 0..25u32 {
            queue.push("7", &i.to_be_bytes()).unwrap();
        }
        for _ in 0..11 {
            queue.pop("7").unwrap();
        }

        assert_eq!(queue.size("7").unwrap(), 14);
    }

    #[test]
    fn empty_column_is_reported() {
        let (_dir, queue) = open_queue();

        assert!(matches!(queue.front("001"), Err(QueueError::Empty(_))));
        assert!(matches!(queue.pop("001"), Err(QueueError::Empty(_))));

        queue.push("001", b"only").unwrap();
        queue.pop("001").unwrap();
        assert!(matches!(queue.pop("001"), Err(QueueError::Empty(_))));
    }

    #[test]
    fn non_numeric_column_names_are_rejected() {
        let (_dir, queue) = open_queue();

        assert!(matches!(
            queue.push("orders", b"x"),
            Err(QueueError::InvalidColumn(_))
        ));
        assert!(matches!(
            queue.size("a1"),
            Err(QueueError::InvalidColumn(_))
        ));
    }

    #[test]
    fn leading_zeros_denote_the_same_column() {
        let (_dir, queue) = open_queue();

        queue.push("001", b"a").unwrap();
        queue.push("1", b"b").unwrap();

        assert_eq!(queue.size("001").unwrap(), 2);
        assert_eq!(queue.size("1").unwrap(), 2);
        assert_eq!(queue.front("1").unwrap(), b"a");
    }

    #[test]
    fn columns_are_ordered_numerically() {
        let (_dir, queue) = open_queue();

        queue.push("10", b"x").unwrap();
        queue.push("2", b"y").unwrap();
        queue.push("1", b"z").unwrap();

        assert_eq!(queue.columns(), vec!["1", "2", "10"]);

        // drained columns drop out of the listing
        queue.pop("2").unwrap();
        assert_eq!(queue.columns(), vec!["1", "10"]);
    }

    #[test]
    fn peek_batch_preserves_order_without_consuming() {
        let (_dir, queue) = open_queue();

        for value in [b"a".as_slice(), b"b", b"c", b"d"] {
            queue.push("3", value).unwrap();
        }

        let peeked = queue.peek_batch("3", 3).unwrap();
        assert_eq!(peeked, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(queue.size("3").unwrap(), 4);

        assert!(queue.peek_batch("9", 10).unwrap().is_empty());
    }

    #[test]
    fn pop_batch_removes_exactly_the_head_entries() {
        let (_dir, queue) = open_queue();

        for value in [b"a".as_slice(), b"b", b"c", b"d"] {
            queue.push("3", value).unwrap();
        }

        queue.pop_batch("3", 3).unwrap();
        assert_eq!(queue.size("3").unwrap(), 1);
        assert_eq!(queue.front("3").unwrap(), b"d");

        // count larger than the column removes what is there
        queue.pop_batch("3", 10).unwrap();
        assert!(queue.is_empty());
    }
}
