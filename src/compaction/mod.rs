//! Background size-tiered compaction worker.
//!
//! One dedicated thread ticks on `compaction_interval_ms` and, separately,
//! callers may request an on-demand pass via [`CompactionWorker::trigger`].
//! Both paths share a single non-reentrant [`Mutex`] so a periodic tick and
//! a concurrent on-demand trigger coalesce into one pass rather than racing
//! each other over the catalog.

#[cfg(test)]
mod tests;

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, select, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, CatalogError};
use crate::merge::MergeIterator;
use crate::sstable::{parse_run_id, RunWriter, SSTableError};

/// Errors produced while running a compaction pass.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Error from the catalog (publish/retire/scan).
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Error from the sorted-run writer or a source reader.
    #[error(transparent)]
    SSTable(#[from] SSTableError),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

/// How long [`CompactionWorker::shutdown`] waits for an in-flight pass
/// before giving up on a clean join.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The periodic, size-tiered compaction task.
///
/// Owns no data of its own beyond thresholds and a handle to the shared
/// [`Catalog`] — every candidate selection, merge, and publish/retire goes
/// through the catalog's own locking.
pub struct CompactionWorker {
    catalog: Arc<Catalog>,
    compaction_threshold: usize,
    max_compaction_files: usize,
    interval_ms: u64,
    state: AtomicU8,
    busy: Mutex<()>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CompactionWorker {
    /// Construct a worker bound to `catalog`. Call [`start`](Self::start) to
    /// spawn its background thread.
    pub fn new(
        catalog: Arc<Catalog>,
        compaction_threshold: usize,
        max_compaction_files: usize,
        interval_ms: u64,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        Arc::new(Self {
            catalog,
            compaction_threshold,
            max_compaction_files,
            interval_ms,
            state: AtomicU8::new(IDLE),
            busy: Mutex::new(()),
            shutdown_tx,
            shutdown_rx,
            thread: Mutex::new(None),
        })
    }

    /// Spawn the background tick thread. No-op if already started.
    pub fn start(self: &Arc<Self>) {
        let mut thread_guard = self.thread.lock().expect("compaction thread lock poisoned");
        if thread_guard.is_some() {
            return;
        }
        let worker = Arc::clone(self);
        *thread_guard = Some(std::thread::spawn(move || worker.run_loop()));
        info!(interval_ms = self.interval_ms, "compaction worker started");
    }

    fn run_loop(self: Arc<Self>) {
        let tick = channel::tick(Duration::from_millis(self.interval_ms.max(1)));
        loop {
            select! {
                recv(tick) -> _ => {
                    if self.catalog.count() >= self.compaction_threshold {
                        if let Err(e) = self.run_compaction_pass() {
                            error!(error = %e, "compaction pass failed");
                        }
                    }
                }
                recv(self.shutdown_rx) -> _ => {
                    debug!("compaction worker received shutdown signal");
                    return;
                }
            }
        }
    }

    /// Run one compaction pass synchronously, coalescing with any
    /// concurrently-running pass (periodic or on-demand). Returns `Ok(false)`
    /// without doing any work if a pass is already in flight or there are
    /// fewer than two merge candidates.
    pub fn trigger(&self) -> Result<bool, CompactionError> {
        self.run_compaction_pass()
    }

    fn run_compaction_pass(&self) -> Result<bool, CompactionError> {
        let Ok(_guard) = self.busy.try_lock() else {
            debug!("compaction pass already in flight, coalescing");
            return Ok(false);
        };
        self.state.store(RUNNING, Ordering::Release);
        let result = self.compact_once();
        self.state.store(IDLE, Ordering::Release);
        result
    }

    fn compact_once(&self) -> Result<bool, CompactionError> {
        let mut candidates = self.catalog.select_for_compaction(self.max_compaction_files);
        if candidates.len() < 2 {
            return Ok(false);
        }
        // Newest first, so the merge iterator's source-id tie-break (lowest
        // wins) favors the newer candidate on equal (key, timestamp).
        candidates.sort_by(|a, b| b.created_ms.cmp(&a.created_ms));

        let oldest_candidate_ms = candidates.iter().map(|r| r.created_ms).min().unwrap_or(i64::MAX);
        let drop_tombstones = self
            .catalog
            .runs()
            .iter()
            .filter(|r| !candidates.iter().any(|c| c.path == r.path))
            .all(|r| r.created_ms >= oldest_candidate_ms);

        let mut sources = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let reader = self.catalog.reader_for(candidate)?;
            sources.push(reader.iter(None, None)?);
        }
        let merged = MergeIterator::new(sources, drop_tombstones)?;

        let new_path = self.catalog.new_path();
        let id = parse_run_id(&new_path.file_name().unwrap_or_default().to_string_lossy())
            .expect("catalog.new_path() must produce a parseable run filename");
        let dir = new_path.parent().expect("run path must have a parent directory");

        let created_ms = candidates.iter().map(|r| r.created_ms).max().unwrap_or(0);
        let mut writer = RunWriter::create(dir, id, created_ms)?;
        for record in merged {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    writer.cancel()?;
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.write(&record) {
                writer.cancel()?;
                return Err(e.into());
            }
        }

        if writer.entry_count() == 0 {
            // Every merged entry was a tombstone dropped by the merge —
            // the candidates still retire, just with no replacement run.
            writer.cancel()?;
        } else {
            let metadata = writer.finish()?;
            self.catalog.publish(metadata)?;
        }
        for candidate in &candidates {
            self.catalog.retire(candidate)?;
        }

        info!(
            merged = candidates.len(),
            drop_tombstones,
            "compaction pass completed"
        );
        Ok(true)
    }

    /// Transition to STOPPING, signal the background thread, and join it
    /// (bounded by [`SHUTDOWN_GRACE`]).
    pub fn shutdown(&self) {
        self.state.store(STOPPING, Ordering::Release);
        let _ = self.shutdown_tx.send(());

        let handle = self.thread.lock().expect("compaction thread lock poisoned").take();
        if let Some(handle) = handle {
            let start = std::time::Instant::now();
            while !handle.is_finished() && start.elapsed() < SHUTDOWN_GRACE {
                std::thread::sleep(Duration::from_millis(10));
            }
            if let Err(e) = handle.join() {
                warn!(?e, "compaction worker thread panicked during shutdown");
            }
        }
    }
}
