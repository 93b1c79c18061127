//! Write-ahead log: the single `database.wal` file that every mutation is
//! appended to before it becomes visible in the active memtable.
//!
//! ## On-disk layout
//!
//! A bare sequence of records, each:
//!
//! ```text
//! [u8 kind (1=PUT, 2=DELETE)][i64 sequence][i64 timestamp_ms]
//! [u32 key_len][key_utf8][u32 val_len][val_utf8]   // val_len = 0 for DELETE
//! ```
//!
//! There is no header and no per-record checksum — corruption is detected
//! structurally (a length prefix that runs past EOF, or an invalid kind
//! byte) and recovery discards the truncated tail rather than the whole
//! log.
//!
//! ## Durability
//!
//! Every append goes through a single `Mutex<File>` in `O_APPEND` mode.
//! `fsync` is not called on every append — it is debounced to at most once
//! per [`Wal`]'s `sync_interval_ms`, except that `sync_interval_ms == 0`
//! forces an `fsync` on every append.


use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::encoding::{CodecError, Decode, Encode};

/// Filename of the single write-ahead log file within an engine directory.
pub const WAL_FILE_NAME: &str = "database.wal";

/// Errors produced by the write-ahead log.
#[derive(Debug, Error)]
pub enum WalError {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record failed to decode — used only internally; callers observe
    /// tail-truncation via [`Wal::recover`], not this variant.
    #[error("corrupt WAL record: {0}")]
    Corrupt(String),

    /// Operation attempted on a closed WAL.
    #[error("WAL is closed")]
    InvalidState,
}

/// The kind of mutation a [`LogRecord`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordKind {
    /// A `set(key, value)`.
    Put,
    /// A `delete(key)`.
    Delete,
}

impl Encode for LogRecordKind {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        let tag: u8 = match self {
            LogRecordKind::Put => 1,
            LogRecordKind::Delete => 2,
        };
        tag.encode_to(buf)
    }
}

impl Decode for LogRecordKind {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let (tag, n) = u8::decode_from(buf)?;
        let kind = match tag {
            1 => LogRecordKind::Put,
            2 => LogRecordKind::Delete,
            other => {
                return Err(CodecError::InvalidTag {
                    tag: other as u32,
                    type_name: "LogRecordKind",
                });
            }
        };
        Ok((kind, n))
    }
}

/// One mutation as recorded in the WAL.
///
/// `sequence` is a monotonically increasing counter stamped at append
/// time. It is preserved for debuggability only — recovery and ordering
/// rely on `timestamp`, not `sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// PUT or DELETE.
    pub kind: LogRecordKind,
    /// The mutated key.
    pub key: Vec<u8>,
    /// The new value; always `None` for DELETE.
    pub value: Option<Vec<u8>>,
    /// Wall-clock milliseconds at append time.
    pub timestamp: i64,
    /// Monotonic append-order counter.
    pub sequence: i64,
}

impl Encode for LogRecord {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        self.kind.encode_to(buf)?;
        self.sequence.encode_to(buf)?;
        self.timestamp.encode_to(buf)?;
        self.key.encode_to(buf)?;
        match &self.value {
            Some(v) => v.encode_to(buf)?,
            None => Vec::<u8>::new().encode_to(buf)?,
        }
        Ok(())
    }
}

impl Decode for LogRecord {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut offset = 0;

        let (kind, n) = LogRecordKind::decode_from(&buf[offset..])?;
        offset += n;

        let (sequence, n) = i64::decode_from(&buf[offset..])?;
        offset += n;

        let (timestamp, n) = i64::decode_from(&buf[offset..])?;
        offset += n;

        let (key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;

        let (value_bytes, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;

        let value = match kind {
            LogRecordKind::Delete => None,
            LogRecordKind::Put => Some(value_bytes),
        };

        Ok((
            LogRecord {
                kind,
                key,
                value,
                timestamp,
                sequence,
            },
            offset,
        ))
    }
}

/// Reads every well-formed record from `path` sequentially, stopping at
/// EOF or at the first sign of corruption. The truncated suffix, if any,
/// is discarded — never surfaced as an error.
fn scan(path: &Path) -> Result<Vec<LogRecord>, WalError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let mut records = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        match LogRecord::decode_from(&bytes[offset..]) {
            Ok((record, consumed)) => {
                offset += consumed;
                records.push(record);
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    offset,
                    error = %e,
                    "WAL tail truncated at corruption"
                );
                break;
            }
        }
    }
    Ok(records)
}

/// The append-only, crash-recoverable write-ahead log for one engine
/// instance.
pub struct Wal {
    file: Mutex<Option<File>>,
    path: PathBuf,
    next_sequence: Mutex<i64>,
    last_sync: Mutex<Instant>,
    sync_interval_ms: u64,
}

impl Wal {
    /// Open (or create) `dir/database.wal`. If the file already exists and
    /// is non-empty, it is scanned once to seed the sequence counter past
    /// the highest sequence on disk.
    pub fn open(dir: impl AsRef<Path>, sync_interval_ms: u64) -> Result<Self, WalError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(WAL_FILE_NAME);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let next_sequence = if file.metadata()?.len() > 0 {
            scan(&path)?.iter().map(|r| r.sequence).max().unwrap_or(0) + 1
        } else {
            0
        };

        info!(path = %path.display(), next_sequence, "WAL opened");

        Ok(Self {
            file: Mutex::new(Some(file)),
            path,
            next_sequence: Mutex::new(next_sequence),
            last_sync: Mutex::new(Instant::now()),
            sync_interval_ms,
        })
    }

    /// Append a PUT record, returning its assigned sequence number.
    pub fn log_put(&self, key: &[u8], value: &[u8], timestamp: i64) -> Result<i64, WalError> {
        self.append(LogRecordKind::Put, key, Some(value), timestamp)
    }

    /// Append a DELETE record, returning its assigned sequence number.
    pub fn log_delete(&self, key: &[u8], timestamp: i64) -> Result<i64, WalError> {
        self.append(LogRecordKind::Delete, key, None, timestamp)
    }

    fn append(
        &self,
        kind: LogRecordKind,
        key: &[u8],
        value: Option<&[u8]>,
        timestamp: i64,
    ) -> Result<i64, WalError> {
        let mut sequence_guard = self.next_sequence.lock().expect("WAL sequence lock poisoned");
        let sequence = *sequence_guard;
        *sequence_guard += 1;
        drop(sequence_guard);

        let record = LogRecord {
            kind,
            key: key.to_vec(),
            value: value.map(<[u8]>::to_vec),
            timestamp,
            sequence,
        };
        let bytes = crate::encoding::encode_to_vec(&record)?;

        let mut file_guard = self.file.lock().expect("WAL file lock poisoned");
        let file = file_guard.as_mut().ok_or(WalError::InvalidState)?;
        file.write_all(&bytes)?;

        let mut last_sync = self.last_sync.lock().expect("WAL last-sync lock poisoned");
        if self.sync_interval_ms == 0 || last_sync.elapsed().as_millis() as u64 >= self.sync_interval_ms {
            file.sync_all()?;
            *last_sync = Instant::now();
        }

        trace!(sequence, kind = ?kind, "WAL record appended");
        Ok(sequence)
    }

    /// Flush and `fsync` unconditionally, regardless of the debounce
    /// interval.
    pub fn sync(&self) -> Result<(), WalError> {
        let mut file_guard = self.file.lock().expect("WAL file lock poisoned");
        let file = file_guard.as_mut().ok_or(WalError::InvalidState)?;
        file.flush()?;
        file.sync_all()?;
        *self.last_sync.lock().expect("WAL last-sync lock poisoned") = Instant::now();
        Ok(())
    }

    /// Replay every well-formed record in append order. The truncated tail
    /// past any corruption is silently discarded.
    pub fn recover(&self) -> Result<Vec<LogRecord>, WalError> {
        scan(&self.path)
    }

    /// Close the writer, delete the file, and reopen an empty one. The
    /// sequence counter is **not** reset — it keeps counting for
    /// debuggability.
    pub fn truncate(&self) -> Result<(), WalError> {
        let mut file_guard = self.file.lock().expect("WAL file lock poisoned");
        *file_guard = None;

        fs::remove_file(&self.path).or_else(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        *file_guard = Some(file);

        debug!(path = %self.path.display(), "WAL truncated");
        Ok(())
    }

    /// Final sync and close. Further operations return
    /// [`WalError::InvalidState`].
    pub fn close(&self) -> Result<(), WalError> {
        let mut file_guard = self.file.lock().expect("WAL file lock poisoned");
        if let Some(file) = file_guard.as_mut() {
            file.sync_all()?;
        }
        *file_guard = None;
        Ok(())
    }

    /// Path to the underlying `database.wal` file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Seeks to the end of `file` and returns its length — a small helper used
/// by tests to assert the log shrank after [`Wal::truncate`].
#[cfg(test)]
pub(crate) fn file_len(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(0))
}
