//! The public facade: coordinates the memtable, WAL, catalog, and
//! compaction worker behind a small string-keyed API.

#[cfg(test)]
mod tests;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::string::FromUtf8Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use thiserror::Error;
use tracing::error;

use crate::catalog::{Catalog, CatalogError};
use crate::clock::MonotonicClock;
use crate::compaction::{CompactionError, CompactionWorker};
use crate::memtable::Memtable;
use crate::record::Record;
use crate::sstable::{parse_run_id, RunWriter, SSTableError};
use crate::wal::{LogRecordKind, Wal, WalError};

/// Errors surfaced by the [`Engine`] facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error from the catalog (publish/retire/scan).
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Error from a sorted-run reader or writer.
    #[error(transparent)]
    SSTable(#[from] SSTableError),

    /// Error from the write-ahead log.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// Error from the compaction worker.
    #[error(transparent)]
    Compaction(#[from] CompactionError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored value was not valid UTF-8 (every value this engine ever
    /// wrote was a `&str`, so this indicates on-disk corruption).
    #[error("stored value is not valid UTF-8")]
    InvalidUtf8(#[from] FromUtf8Error),

    /// Operation attempted on a closed engine.
    #[error("operation attempted on a closed engine")]
    InvalidState,
}

/// Configuration for an [`Engine`] instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Advisory cap (entries) for the active table; reserved for future
    /// admission control and not currently enforced.
    pub mem_table_max_size: usize,
    /// Entry count at which the active table is frozen and scheduled for
    /// flush.
    pub flush_threshold: usize,
    /// Minimum number of runs required before periodic compaction runs.
    pub compaction_threshold: usize,
    /// Period, in milliseconds, of the background compaction tick.
    pub compaction_interval_ms: u64,
    /// Upper bound on runs merged per compaction pass.
    pub max_compaction_files: usize,
    /// If `false`, skip the write-ahead log entirely (no crash recovery).
    pub enable_wal: bool,
    /// Upper bound on the time between WAL fsyncs; `0` forces fsync on
    /// every write.
    pub wal_sync_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mem_table_max_size: 10_000,
            flush_threshold: 1_000,
            compaction_threshold: 4,
            compaction_interval_ms: 30_000,
            max_compaction_files: 10,
            enable_wal: true,
            wal_sync_interval_ms: 1_000,
        }
    }
}

struct EngineInner {
    active: Memtable,
    frozen: Option<Memtable>,
}

enum FlushMsg {
    Flush,
    Shutdown,
}

/// Writes the frozen memtable (if any) to a new sorted run, publishes it,
/// clears the frozen slot, and truncates the WAL. Returns `Ok(false)`
/// without doing anything if the frozen slot was already empty.
///
/// Any failure here leaves the frozen slot populated (never cleared before
/// a successful publish) so the next attempt retries from scratch.
fn run_flush(
    inner: &RwLock<EngineInner>,
    catalog: &Catalog,
    wal: Option<&Wal>,
    clock: &MonotonicClock,
) -> Result<bool, EngineError> {
    let snapshot = {
        let guard = inner.read().expect("engine lock poisoned");
        match &guard.frozen {
            Some(frozen) => frozen.snapshot(),
            None => return Ok(false),
        }
    };

    if !snapshot.is_empty() {
        let new_path = catalog.new_path();
        let id = parse_run_id(&new_path.file_name().unwrap_or_default().to_string_lossy())
            .expect("catalog.new_path() must produce a parseable run filename");
        let dir = new_path.parent().expect("run path must have a parent directory");

        let mut writer = RunWriter::create(dir, id, clock.next())?;
        for record in snapshot.iter() {
            if let Err(e) = writer.write(record) {
                writer.cancel()?;
                return Err(e.into());
            }
        }
        let metadata = writer.finish()?;
        catalog.publish(metadata)?;
    }

    {
        let mut guard = inner.write().expect("engine lock poisoned");
        guard.frozen = None;
    }
    if let Some(wal) = wal {
        wal.truncate()?;
    }
    Ok(true)
}

/// The embedded key-value engine.
///
/// Cloning is not provided; share an `Engine` across threads by wrapping it
/// in an `Arc` the way its own internals wrap the memtable, catalog, and
/// compaction worker.
pub struct Engine {
    dir: PathBuf,
    inner: Arc<RwLock<EngineInner>>,
    catalog: Arc<Catalog>,
    wal: Option<Arc<Wal>>,
    clock: Arc<MonotonicClock>,
    compaction: Arc<CompactionWorker>,
    flush_tx: Sender<FlushMsg>,
    flush_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    frozen_cv: Arc<Condvar>,
    frozen_lock: Arc<Mutex<()>>,
    flush_threshold: usize,
    closed: AtomicBool,
}

impl Engine {
    /// Open (creating if necessary) the engine directory at `dir`: scan the
    /// catalog, optionally open and replay the WAL, and start the
    /// compaction worker.
    pub fn open(dir: impl Into<PathBuf>, config: EngineConfig) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let catalog = Arc::new(Catalog::scan(&dir)?);
        let clock = Arc::new(MonotonicClock::new());
        let active = Memtable::new(clock.next());

        let wal = if config.enable_wal {
            let wal = Wal::open(&dir, config.wal_sync_interval_ms)?;
            let records = wal.recover()?;
            for record in &records {
                clock.observe(record.timestamp);
            }
            for record in records {
                let restored = match record.kind {
                    LogRecordKind::Put => Record::put(record.key, record.value.unwrap_or_default(), record.timestamp),
                    LogRecordKind::Delete => Record::delete(record.key, record.timestamp),
                };
                active.insert(restored);
            }
            Some(Arc::new(wal))
        } else {
            None
        };

        let inner = Arc::new(RwLock::new(EngineInner { active, frozen: None }));

        let compaction = CompactionWorker::new(
            Arc::clone(&catalog),
            config.compaction_threshold,
            config.max_compaction_files,
            config.compaction_interval_ms,
        );
        compaction.start();

        let frozen_cv = Arc::new(Condvar::new());
        let frozen_lock = Arc::new(Mutex::new(()));

        let (flush_tx, flush_rx) = channel::unbounded();
        let flush_handle = {
            let inner = Arc::clone(&inner);
            let catalog = Arc::clone(&catalog);
            let wal = wal.clone();
            let clock = Arc::clone(&clock);
            let frozen_cv = Arc::clone(&frozen_cv);
            std::thread::spawn(move || {
                while let Ok(msg) = flush_rx.recv() {
                    match msg {
                        FlushMsg::Flush => match run_flush(&inner, &catalog, wal.as_deref(), &clock) {
                            Ok(_) => frozen_cv.notify_all(),
                            Err(e) => error!(error = %e, "flush failed, frozen slot retained for retry"),
                        },
                        FlushMsg::Shutdown => break,
                    }
                }
            })
        };

        Ok(Self {
            dir,
            inner,
            catalog,
            wal,
            clock,
            compaction,
            flush_tx,
            flush_handle: Mutex::new(Some(flush_handle)),
            frozen_cv,
            frozen_lock,
            flush_threshold: config.flush_threshold,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::InvalidState);
        }
        Ok(())
    }

    /// Block until the frozen slot is empty, then move `active` into it and
    /// install a fresh active table. A no-op if another thread already
    /// froze the table by the time the write lock is acquired.
    fn freeze_active(&self) {
        loop {
            {
                let guard = self.inner.read().expect("engine lock poisoned");
                if guard.frozen.is_none() {
                    break;
                }
            }
            let lock = self.frozen_lock.lock().expect("frozen handoff lock poisoned");
            let _ = self.frozen_cv.wait_timeout(lock, Duration::from_millis(20));
        }

        let mut guard = self.inner.write().expect("engine lock poisoned");
        if guard.frozen.is_none() {
            let fresh = Memtable::new(self.clock.next());
            let old_active = std::mem::replace(&mut guard.active, fresh);
            guard.frozen = Some(old_active);
        }
    }

    /// Insert or overwrite `key` with `value`.
    pub fn set(&self, key: impl AsRef<str>, value: impl AsRef<str>) -> Result<(), EngineError> {
        self.ensure_open()?;
        let key = key.as_ref().as_bytes();
        let value = value.as_ref().as_bytes();
        let timestamp = self.clock.next();

        let should_flush = {
            let guard = self.inner.write().expect("engine lock poisoned");
            if let Some(wal) = &self.wal {
                wal.log_put(key, value, timestamp)?;
            }
            guard.active.put(key.to_vec(), value.to_vec(), timestamp);
            guard.active.size() >= self.flush_threshold
        };

        if should_flush {
            self.freeze_active();
            let _ = self.flush_tx.send(FlushMsg::Flush);
        }
        Ok(())
    }

    /// Mark `key` deleted.
    pub fn delete(&self, key: impl AsRef<str>) -> Result<(), EngineError> {
        self.ensure_open()?;
        let key = key.as_ref().as_bytes();
        let timestamp = self.clock.next();

        let should_flush = {
            let guard = self.inner.write().expect("engine lock poisoned");
            if let Some(wal) = &self.wal {
                wal.log_delete(key, timestamp)?;
            }
            guard.active.delete(key.to_vec(), timestamp);
            guard.active.size() >= self.flush_threshold
        };

        if should_flush {
            self.freeze_active();
            let _ = self.flush_tx.send(FlushMsg::Flush);
        }
        Ok(())
    }

    /// Look up `key`, consulting active, then frozen, then the catalog, in
    /// that order. Returns `None` for a tombstone or an absent key.
    pub fn get(&self, key: impl AsRef<str>) -> Result<Option<String>, EngineError> {
        self.ensure_open()?;
        let key = key.as_ref().as_bytes();

        let in_memory = {
            let guard = self.inner.read().expect("engine lock poisoned");
            guard.active.get(key).or_else(|| guard.frozen.as_ref().and_then(|f| f.get(key)))
        };

        let record = match in_memory {
            Some(record) => Some(record),
            None => self.catalog.get(key)?,
        };

        match record {
            Some(Record { tombstone: true, .. }) | None => Ok(None),
            Some(Record { value: Some(value), .. }) => Ok(Some(String::from_utf8(value)?)),
            Some(Record { value: None, .. }) => Ok(None),
        }
    }

    /// Delegate to the compaction worker's synchronous, on-demand trigger.
    /// Returns `Ok(false)` if a compaction pass was already in flight or
    /// there were fewer than two merge candidates.
    pub fn compact(&self) -> Result<bool, EngineError> {
        self.ensure_open()?;
        Ok(self.compaction.trigger()?)
    }

    /// Refuse further operations, flush the active table synchronously,
    /// shut down the compaction worker, and close the WAL.
    pub fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(EngineError::InvalidState);
        }

        self.freeze_active();
        run_flush(&self.inner, &self.catalog, self.wal.as_deref(), &self.clock)?;

        let _ = self.flush_tx.send(FlushMsg::Shutdown);
        if let Some(handle) = self.flush_handle.lock().expect("flush thread lock poisoned").take() {
            let _ = handle.join();
        }

        self.compaction.shutdown();

        if let Some(wal) = &self.wal {
            wal.close()?;
        }

        self.catalog.close();
        Ok(())
    }

    /// The directory this engine is backed by.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}
