//! [`SortedRunReader`]: loads a run file's footer and index once at open
//! time, then serves point lookups via binary search over the in-memory
//! index plus a bounded forward scan of the data section.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::encoding::{CodecError, Decode};
use crate::record::Record;

use super::writer::RunFooter;
use super::SSTableError;

/// Reads `len` bytes from `file` starting at absolute offset `at`, leaving
/// the file cursor positioned just past them.
fn read_exact_at(file: &mut File, at: u64, len: usize) -> Result<Vec<u8>, SSTableError> {
    file.seek(SeekFrom::Start(at))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Decode the next record starting at the file's current cursor position,
/// refilling an internal buffer as needed but never reading past
/// `remaining` bytes (the boundary between the data section and the index
/// section that follows it).
fn read_next_record(file: &mut File, remaining: &mut u64) -> Result<Option<Record>, SSTableError> {
    if *remaining == 0 {
        return Ok(None);
    }
    let mut buf = Vec::new();
    loop {
        match Record::decode_from(&buf) {
            Ok((record, consumed)) => {
                *remaining -= consumed as u64;
                return Ok(Some(record));
            }
            Err(CodecError::UnexpectedEof { .. }) => {
                let room = *remaining as usize - buf.len();
                if room == 0 {
                    return Err(SSTableError::Corrupt(
                        "truncated record at data section boundary".to_string(),
                    ));
                }
                let chunk_size = room.min(4096);
                let mut chunk = vec![0u8; chunk_size];
                file.read_exact(&mut chunk)?;
                buf.extend_from_slice(&chunk);
            }
            Err(e) => return Err(SSTableError::Corrupt(e.to_string())),
        }
    }
}

/// An open sorted run, ready to serve point lookups and range scans.
pub struct SortedRunReader {
    path: PathBuf,
    index: Vec<(Vec<u8>, i64)>,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    entry_count: u64,
    created_ms: i64,
    index_offset: u64,
    file: Mutex<File>,
}

impl SortedRunReader {
    /// Open `path`, reading its trailing-length footer and full index into
    /// memory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SSTableError> {
        let path = path.into();
        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len < 4 {
            return Err(SSTableError::Corrupt(
                "sorted run smaller than the trailing footer length".to_string(),
            ));
        }

        let footer_len_bytes = read_exact_at(&mut file, len - 4, 4)?;
        let (footer_len, _) = u32::decode_from(&footer_len_bytes)?;
        let footer_len = footer_len as u64;
        if len < 4 + footer_len + 8 {
            return Err(SSTableError::Corrupt(
                "footer length exceeds file size".to_string(),
            ));
        }

        let footer_start = len - 4 - footer_len;
        let footer_bytes = read_exact_at(&mut file, footer_start, footer_len as usize)?;
        let (footer, _) = RunFooter::decode_from(&footer_bytes)?;

        let index_offset_pos = footer_start - 8;
        let index_offset_bytes = read_exact_at(&mut file, index_offset_pos, 8)?;
        let (index_offset, _) = i64::decode_from(&index_offset_bytes)?;
        if index_offset < 0 || index_offset as u64 > index_offset_pos {
            return Err(SSTableError::Corrupt(
                "index offset out of range".to_string(),
            ));
        }
        let index_offset = index_offset as u64;

        let index_bytes = read_exact_at(
            &mut file,
            index_offset,
            (index_offset_pos - index_offset) as usize,
        )?;
        let mut index = Vec::with_capacity(footer.entry_count as usize);
        let mut offset = 0;
        while offset < index_bytes.len() {
            let (key, n) = Vec::<u8>::decode_from(&index_bytes[offset..])?;
            offset += n;
            let (data_offset, n) = i64::decode_from(&index_bytes[offset..])?;
            offset += n;
            index.push((key, data_offset));
        }

        debug!(path = %path.display(), entries = index.len(), "sorted run opened");

        Ok(Self {
            path,
            index,
            min_key: footer.min_key,
            max_key: footer.max_key,
            entry_count: footer.entry_count as u64,
            created_ms: footer.created_ms,
            index_offset,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying run file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Smallest key in the run.
    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    /// Wall-clock milliseconds at creation (flush or compaction).
    pub fn created_ms(&self) -> i64 {
        self.created_ms
    }

    /// Largest key in the run.
    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    /// Number of records in the run.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Exact-match point lookup. Returns the stored record (which
    /// may be a tombstone) or `None` if the key is not present in this run.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>, SSTableError> {
        if key < self.min_key.as_slice() || key > self.max_key.as_slice() {
            return Ok(None);
        }

        let idx = self.index.partition_point(|(k, _)| k.as_slice() <= key);
        if idx == 0 {
            return Ok(None);
        }
        let start_offset = self.index[idx - 1].1 as u64;

        let mut file = self.file.lock().expect("sorted run file lock poisoned");
        file.seek(SeekFrom::Start(start_offset))?;
        let mut remaining = self.index_offset - start_offset;

        loop {
            match read_next_record(&mut file, &mut remaining)? {
                Some(record) => match record.key.as_slice().cmp(key) {
                    Ordering::Equal => return Ok(Some(record)),
                    Ordering::Greater => return Ok(None),
                    Ordering::Less => continue,
                },
                None => return Ok(None),
            }
        }
    }

    /// Forward iterator over `[from, to)`. `from == None` starts at the
    /// beginning of the run; `to == None` scans to the end.
    pub fn iter(
        &self,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
    ) -> Result<SortedRunIterator, SSTableError> {
        let start_offset = match from {
            None => 0,
            Some(key) => {
                let idx = self.index.partition_point(|(k, _)| k.as_slice() < key);
                self.index
                    .get(idx)
                    .map(|(_, offset)| *offset as u64)
                    .unwrap_or(self.index_offset)
            }
        };

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(start_offset))?;

        Ok(SortedRunIterator {
            file,
            remaining: self.index_offset - start_offset,
            to: to.map(<[u8]>::to_vec),
            done: false,
        })
    }
}

/// A forward iterator over a bounded range of one sorted run's data
/// section, opened with its own independent file handle.
pub struct SortedRunIterator {
    file: File,
    remaining: u64,
    to: Option<Vec<u8>>,
    done: bool,
}

impl Iterator for SortedRunIterator {
    type Item = Result<Record, SSTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_next_record(&mut self.file, &mut self.remaining) {
            Ok(Some(record)) => {
                if let Some(to) = &self.to {
                    if record.key.as_slice() >= to.as_slice() {
                        self.done = true;
                        return None;
                    }
                }
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
