//! Catalog: registry of every live sorted run plus the reader cache keyed
//! by file path.
//!
//! The ordered view (runs sorted by creation timestamp, newest first) is
//! also the read-search order: the engine's read path walks this list top
//! to bottom and the first run whose key range contains the target wins,
//! which is always the newest version by construction.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use crate::record::Record;
use crate::sstable::{parse_run_id, run_file_name, RunMetadata, SSTableError, SortedRunReader};

/// Size-tier thresholds: {≤64 MiB: 0, ≤256 MiB: 1, ≤1 GiB: 2, else: 3}.
const TIER_BOUNDS_BYTES: [u64; 3] = [64 * 1024 * 1024, 256 * 1024 * 1024, 1024 * 1024 * 1024];

/// Errors produced by the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A sorted-run file could not be opened or parsed.
    #[error(transparent)]
    SSTable(#[from] SSTableError),
}

/// Assigns a size tier to a byte size per the thresholds above.
fn tier_for_bytes(byte_size: u64) -> u8 {
    TIER_BOUNDS_BYTES
        .iter()
        .position(|&bound| byte_size <= bound)
        .map_or(3, |p| p as u8)
}

struct CatalogInner {
    runs: Vec<RunMetadata>,
    readers: HashMap<PathBuf, Arc<SortedRunReader>>,
    next_id: u64,
}

impl CatalogInner {
    fn resort(&mut self) {
        self.runs.sort_by(|a, b| b.created_ms.cmp(&a.created_ms));
    }
}

/// The set of sorted runs live for one engine directory.
pub struct Catalog {
    dir: PathBuf,
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Enumerate `run_<id>.dat` files under `dir`, open each to read its
    /// footer, and seed the file-id counter past the highest id observed.
    /// Unreadable files are skipped with a warning rather than failing
    /// startup outright, leaving the corrupt run on disk for an operator
    /// to investigate.
    pub fn scan(dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut runs = Vec::new();
        let mut readers = HashMap::new();
        let mut next_id = 0u64;

        let mut entries: Vec<_> = fs::read_dir(&dir)?.collect::<Result<_, io::Error>>()?;
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let file_name = entry.file_name();
            let Some(id) = parse_run_id(&file_name.to_string_lossy()) else {
                continue;
            };
            let path = entry.path();

            let reader = match SortedRunReader::open(&path) {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable sorted run during catalog scan");
                    continue;
                }
            };

            let meta = RunMetadata {
                byte_size: entry.metadata()?.len(),
                path: path.clone(),
                id,
                min_key: reader.min_key().to_vec(),
                max_key: reader.max_key().to_vec(),
                entry_count: reader.entry_count(),
                created_ms: reader.created_ms(),
            };

            next_id = next_id.max(id + 1);
            readers.insert(path, Arc::new(reader));
            runs.push(meta);
        }

        let mut inner = CatalogInner {
            runs,
            readers,
            next_id,
        };
        inner.resort();

        debug!(dir = %dir.display(), runs = inner.runs.len(), "catalog scanned");

        Ok(Self {
            dir,
            inner: RwLock::new(inner),
        })
    }

    /// Allocate the path for the next run file and advance the id counter.
    pub fn new_path(&self) -> PathBuf {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        self.dir.join(run_file_name(id))
    }

    /// Register a newly-published run, opening and caching its reader.
    pub fn publish(&self, metadata: RunMetadata) -> Result<(), CatalogError> {
        let reader = SortedRunReader::open(&metadata.path)?;
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        inner.readers.insert(metadata.path.clone(), Arc::new(reader));
        inner.runs.push(metadata.clone());
        inner.resort();
        debug!(path = %metadata.path.display(), "run published to catalog");
        Ok(())
    }

    /// Remove a run from the catalog, close its cached reader, and delete
    /// the underlying file. The reader is dropped (closing its file
    /// handle) before the file is removed, so nothing can still be mid-read
    /// on a handle whose file is about to disappear.
    pub fn retire(&self, metadata: &RunMetadata) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        inner.runs.retain(|r| r.path != metadata.path);
        inner.readers.remove(&metadata.path);
        drop(inner);

        match fs::remove_file(&metadata.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(path = %metadata.path.display(), "run retired from catalog");
        Ok(())
    }

    /// Point lookup across every live run, newest first. Returns the first
    /// hit (which is the newest version, since [`publish`](Self::publish)
    /// keeps the list sorted newest-first).
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>, CatalogError> {
        let inner = self.inner.read().expect("catalog lock poisoned");
        for run in &inner.runs {
            if !run.may_contain(key) {
                continue;
            }
            let Some(reader) = inner.readers.get(&run.path) else {
                continue;
            };
            if let Some(record) = reader.get(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Group live runs by size tier.
    pub fn group_by_tier(&self) -> HashMap<u8, Vec<RunMetadata>> {
        let inner = self.inner.read().expect("catalog lock poisoned");
        let mut tiers: HashMap<u8, Vec<RunMetadata>> = HashMap::new();
        for run in &inner.runs {
            tiers
                .entry(tier_for_bytes(run.byte_size))
                .or_default()
                .push(run.clone());
        }
        tiers
    }

    /// Pick the tier with the greatest population; if that population is
    /// at least 2, return its oldest `min(max_files, population)` runs by
    /// creation timestamp ascending. Otherwise return an empty list.
    pub fn select_for_compaction(&self, max_files: usize) -> Vec<RunMetadata> {
        let tiers = self.group_by_tier();
        let Some((_, mut candidates)) = tiers
            .into_iter()
            .max_by_key(|(_, runs)| runs.len())
            .filter(|(_, runs)| runs.len() >= 2)
        else {
            return Vec::new();
        };
        candidates.sort_by_key(|r| r.created_ms);
        candidates.truncate(max_files.min(candidates.len()));
        candidates
    }

    /// Sum of every live run's file size.
    pub fn total_bytes(&self) -> u64 {
        let inner = self.inner.read().expect("catalog lock poisoned");
        inner.runs.iter().map(|r| r.byte_size).sum()
    }

    /// Sum of every live run's entry count.
    pub fn total_entries(&self) -> u64 {
        let inner = self.inner.read().expect("catalog lock poisoned");
        inner.runs.iter().map(|r| r.entry_count).sum()
    }

    /// Number of live runs.
    pub fn count(&self) -> usize {
        self.inner.read().expect("catalog lock poisoned").runs.len()
    }

    /// Snapshot of every live run's metadata, newest first.
    pub fn runs(&self) -> Vec<RunMetadata> {
        self.inner.read().expect("catalog lock poisoned").runs.clone()
    }

    /// Drop every cached reader, closing its underlying file handle. The
    /// run list itself is left intact — this only releases open files, it
    /// does not retire runs.
    pub fn close(&self) {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        let closed = inner.readers.len();
        inner.readers.clear();
        debug!(dir = %self.dir.display(), closed, "catalog readers closed");
    }

    /// Fetch (opening and caching on first use) the reader for a run.
    pub(crate) fn reader_for(&self, metadata: &RunMetadata) -> Result<Arc<SortedRunReader>, CatalogError> {
        {
            let inner = self.inner.read().expect("catalog lock poisoned");
            if let Some(reader) = inner.readers.get(&metadata.path) {
                return Ok(Arc::clone(reader));
            }
        }
        let reader = Arc::new(SortedRunReader::open(&metadata.path)?);
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        inner
            .readers
            .entry(metadata.path.clone())
            .or_insert_with(|| Arc::clone(&reader));
        Ok(reader)
    }
}
