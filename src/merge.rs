//! K-way merge iterator: fuses N sorted-run iterators into one ordered
//! stream, resolving duplicate keys by recency and optionally dropping
//! tombstones once no older, un-merged run could still hold a
//! pre-deletion version of the same key.


use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::record::Record;
use crate::sstable::{SSTableError, SortedRunIterator};

/// One source's current head record, ordered so that [`BinaryHeap`] (a
/// max-heap) pops the smallest key first; among equal keys, the greatest
/// timestamp; among equal timestamps, the smallest `source_id` (callers
/// should feed newer runs at lower indices so ties resolve to the newer
/// record).
struct HeapEntry {
    key: Vec<u8>,
    timestamp: i64,
    source_id: usize,
    record: Record,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.timestamp == other.timestamp && self.source_id == other.source_id
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| other.source_id.cmp(&self.source_id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges `sources` into a single key-ascending stream with one record per
/// key. Feed sources newest-first: ties at equal (key, timestamp) resolve
/// to the lowest `source_id`.
pub struct MergeIterator {
    sources: Vec<SortedRunIterator>,
    heap: BinaryHeap<HeapEntry>,
    drop_tombstones: bool,
}

impl MergeIterator {
    /// Construct a merge over `sources`, pulling one record from each to
    /// seed the heap. `drop_tombstones` must be `true` only when the
    /// candidates being merged include every run that could contain an
    /// older version of any key they cover — otherwise a surviving older
    /// run could still hold a pre-deletion value the tombstone needs to
    /// keep shadowing.
    pub fn new(mut sources: Vec<SortedRunIterator>, drop_tombstones: bool) -> Result<Self, SSTableError> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source_id, source) in sources.iter_mut().enumerate() {
            if let Some(result) = source.next() {
                let record = result?;
                heap.push(HeapEntry {
                    key: record.key.clone(),
                    timestamp: record.timestamp,
                    source_id,
                    record,
                });
            }
        }
        Ok(Self {
            sources,
            heap,
            drop_tombstones,
        })
    }

    fn advance(&mut self, source_id: usize) -> Result<(), SSTableError> {
        if let Some(result) = self.sources[source_id].next() {
            let record = result?;
            self.heap.push(HeapEntry {
                key: record.key.clone(),
                timestamp: record.timestamp,
                source_id,
                record,
            });
        }
        Ok(())
    }

    fn pull_winner(&mut self) -> Result<Option<Record>, SSTableError> {
        loop {
            let Some(top) = self.heap.pop() else {
                return Ok(None);
            };
            let key = top.key.clone();
            let mut winner = top.record;
            self.advance(top.source_id)?;

            while let Some(next_top) = self.heap.peek() {
                if next_top.key != key {
                    break;
                }
                let next_top = self.heap.pop().expect("peeked entry must still be present");
                if next_top.timestamp > winner.timestamp {
                    winner = next_top.record;
                }
                self.advance(next_top.source_id)?;
            }

            if winner.tombstone && self.drop_tombstones {
                continue;
            }
            return Ok(Some(winner));
        }
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Record, SSTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.pull_winner() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
