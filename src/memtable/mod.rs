//! The active/frozen in-memory ordered table.
//!
//! Backed by a [`BTreeMap`] keyed on raw key bytes, so iteration is always
//! in ascending lexicographic order for free. Unlike a general MVCC table,
//! this memtable keeps exactly one [`Record`] per key — the newest write or
//! delete simply overwrites the map entry.


use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::trace;

use crate::record::Record;

/// Estimated per-entry object overhead (pointers, map node, etc.), added on
/// top of key/value byte length when computing [`Memtable::byte_estimate`].
/// Governs flush-threshold sizing only; need not be exact.
const ENTRY_OVERHEAD_BYTES: usize = 64;

/// Errors produced by the memtable.
///
/// None of this memtable's operations are themselves fallible (it performs
/// no I/O), so this type currently has no constructible variants. It exists
/// for API symmetry with the other modules, whose errors do compose into
/// [`crate::engine::EngineError`] through the same `#[from]` machinery.
#[derive(Debug, Error)]
pub enum MemtableError {}

/// A key's contribution to [`Memtable::byte_estimate`]'s accounting.
fn entry_byte_estimate(key: &[u8], record: &Record) -> usize {
    let value_len = record.value.as_ref().map_or(0, Vec::len);
    2 * key.len() + 2 * value_len + ENTRY_OVERHEAD_BYTES
}

#[derive(Debug, Default)]
struct MemtableInner {
    tree: BTreeMap<Vec<u8>, Record>,
    byte_estimate: usize,
}

/// The in-memory ordered table. Cheaply `Clone`-able (an `Arc` handle),
/// matching the engine's own `Arc<RwLock<_>>` sharing idiom.
#[derive(Debug, Clone)]
pub struct Memtable {
    inner: Arc<RwLock<MemtableInner>>,
    creation_timestamp: i64,
}

impl Memtable {
    /// Create a new, empty memtable stamped with the given creation time.
    pub fn new(creation_timestamp: i64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemtableInner::default())),
            creation_timestamp,
        }
    }

    /// Insert or overwrite a live record for `key`.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, timestamp: i64) {
        self.insert(Record::put(key, value, timestamp));
    }

    /// Insert or overwrite a tombstone record for `key`.
    pub fn delete(&self, key: Vec<u8>, timestamp: i64) {
        self.insert(Record::delete(key, timestamp));
    }

    /// Insert a fully-formed record (used directly during WAL replay, where
    /// the original timestamp must be preserved rather than re-stamped).
    pub fn insert(&self, record: Record) {
        trace!(key = %HexKey(&record.key), timestamp = record.timestamp, "memtable insert");
        let mut inner = self.inner.write().expect("memtable lock poisoned");
        let new_estimate = entry_byte_estimate(&record.key, &record);
        if let Some(old) = inner.tree.insert(record.key.clone(), record) {
            let old_estimate = entry_byte_estimate(&old.key, &old);
            inner.byte_estimate = inner.byte_estimate + new_estimate - old_estimate;
        } else {
            inner.byte_estimate += new_estimate;
        }
    }

    /// Exact-match lookup. Returns the stored record (tombstone or not) —
    /// callers decide whether to hide the value.
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        let inner = self.inner.read().expect("memtable lock poisoned");
        inner.tree.get(key).cloned()
    }

    /// Take a read-only, independent copy of the current contents.
    pub fn snapshot(&self) -> MemtableSnapshot {
        let inner = self.inner.read().expect("memtable lock poisoned");
        MemtableSnapshot {
            tree: inner.tree.clone(),
            creation_timestamp: self.creation_timestamp,
        }
    }

    /// Number of distinct keys currently held.
    pub fn size(&self) -> usize {
        self.inner.read().expect("memtable lock poisoned").tree.len()
    }

    /// `true` if the table holds no keys.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Estimated byte footprint: `sum(2*len(key) + 2*len(value) + 64)`.
    pub fn byte_estimate(&self) -> usize {
        self.inner.read().expect("memtable lock poisoned").byte_estimate
    }

    /// Remove all entries, resetting the table to empty.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("memtable lock poisoned");
        inner.tree.clear();
        inner.byte_estimate = 0;
    }

    /// The wall-clock time this table started accepting writes.
    pub fn creation_timestamp(&self) -> i64 {
        self.creation_timestamp
    }
}

/// A frozen, independent copy of a memtable's contents taken at flush time.
///
/// Owns its own data; unaffected by any later mutation of (or even
/// destruction of) the memtable it was copied from.
#[derive(Debug, Clone)]
pub struct MemtableSnapshot {
    tree: BTreeMap<Vec<u8>, Record>,
    creation_timestamp: i64,
}

impl MemtableSnapshot {
    /// Yield records in ascending key order. Finite, not restartable.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.tree.values()
    }

    /// Number of distinct keys in the snapshot.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// `true` if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// The wall-clock time the source table started accepting writes.
    pub fn creation_timestamp(&self) -> i64 {
        self.creation_timestamp
    }
}

/// Renders a key as a bounded hex prefix for tracing output, avoiding huge
/// log lines for large keys while still being useful for debugging.
pub(crate) struct HexKey<'a>(pub &'a [u8]);

impl std::fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const MAX_SHOWN: usize = 16;
        for byte in self.0.iter().take(MAX_SHOWN) {
            write!(f, "{byte:02x}")?;
        }
        if self.0.len() > MAX_SHOWN {
            write!(f, "..")?;
        }
        Ok(())
    }
}
