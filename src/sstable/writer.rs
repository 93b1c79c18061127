//! [`RunWriter`]: streams records into a new sorted run file, publishing it
//! atomically via the classic `.tmp`-then-`rename` idiom.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::encoding::{encode_to_vec, Encode};
use crate::record::Record;

use super::{run_file_name, RunMetadata, SSTableError};

/// The footer fields written just before the trailing length.
pub(super) struct RunFooter {
    pub entry_count: u32,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub created_ms: i64,
}

impl Encode for RunFooter {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), crate::encoding::CodecError> {
        self.entry_count.encode_to(buf)?;
        self.min_key.encode_to(buf)?;
        self.max_key.encode_to(buf)?;
        self.created_ms.encode_to(buf)?;
        Ok(())
    }
}

impl crate::encoding::Decode for RunFooter {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), crate::encoding::CodecError> {
        let mut offset = 0;
        let (entry_count, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (min_key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (max_key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (created_ms, n) = i64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            RunFooter {
                entry_count,
                min_key,
                max_key,
                created_ms,
            },
            offset,
        ))
    }
}

/// Writes a new sorted run. Records must be supplied in ascending key
/// order — the writer trusts its caller (the flush path and the compaction
/// worker, both of which already iterate in key order) rather than
/// re-sorting.
pub struct RunWriter {
    tmp_path: PathBuf,
    final_path: PathBuf,
    id: u64,
    file: BufWriter<File>,
    index: Vec<(Vec<u8>, i64)>,
    min_key: Option<Vec<u8>>,
    max_key: Vec<u8>,
    entry_count: u64,
    data_len: u64,
    created_ms: i64,
}

impl RunWriter {
    /// Create a new run writer for run id `id` inside `dir`. Writes go to a
    /// `.tmp` sibling of the final path until [`RunWriter::finish`].
    pub fn create(dir: impl AsRef<Path>, id: u64, created_ms: i64) -> Result<Self, SSTableError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let final_path = dir.join(run_file_name(id));
        let tmp_path = dir.join(format!("{}.tmp", run_file_name(id)));

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            tmp_path,
            final_path,
            id,
            file: BufWriter::new(file),
            index: Vec::new(),
            min_key: None,
            max_key: Vec::new(),
            entry_count: 0,
            data_len: 0,
            created_ms,
        })
    }

    /// Append one record to the data section. Caller must supply records in
    /// ascending key order.
    pub fn write(&mut self, record: &Record) -> Result<(), SSTableError> {
        let bytes = encode_to_vec(record)?;
        let offset = self.data_len as i64;
        self.file.write_all(&bytes)?;
        self.data_len += bytes.len() as u64;

        self.index.push((record.key.clone(), offset));
        if self.min_key.is_none() {
            self.min_key = Some(record.key.clone());
        }
        self.max_key = record.key.clone();
        self.entry_count += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Write the index and footer, fsync, and atomically publish the file
    /// under its final name. Fails if no records were ever written — an
    /// empty run has no min/max key and would never be selected by any
    /// catalog lookup anyway.
    pub fn finish(mut self) -> Result<RunMetadata, SSTableError> {
        if self.entry_count == 0 {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(SSTableError::Corrupt(
                "cannot finish an empty sorted run".to_string(),
            ));
        }

        let entry_count_u32 = u32::try_from(self.entry_count)
            .map_err(|_| SSTableError::Corrupt("entry count exceeds u32::MAX".to_string()))?;
        let min_key = self.min_key.clone().unwrap_or_default();
        let max_key = self.max_key.clone();

        let mut tail = Vec::new();
        for (key, offset) in &self.index {
            key.encode_to(&mut tail)?;
            offset.encode_to(&mut tail)?;
        }

        let index_offset = self.data_len as i64;
        index_offset.encode_to(&mut tail)?;

        let footer_field_start = tail.len();
        let footer = RunFooter {
            entry_count: entry_count_u32,
            min_key: min_key.clone(),
            max_key: max_key.clone(),
            created_ms: self.created_ms,
        };
        footer.encode_to(&mut tail)?;
        let footer_len = u32::try_from(tail.len() - footer_field_start)
            .map_err(|_| SSTableError::Corrupt("footer exceeds u32::MAX".to_string()))?;
        footer_len.encode_to(&mut tail)?;

        self.file.write_all(&tail)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        let byte_size = self.data_len + tail.len() as u64;
        drop(self.file);
        fs::rename(&self.tmp_path, &self.final_path)?;

        debug!(
            path = %self.final_path.display(),
            entries = self.entry_count,
            byte_size,
            "sorted run published"
        );

        Ok(RunMetadata {
            path: self.final_path,
            id: self.id,
            min_key,
            max_key,
            entry_count: self.entry_count,
            byte_size,
            created_ms: self.created_ms,
        })
    }

    /// Abandon the run, discarding its `.tmp` file.
    pub fn cancel(self) -> Result<(), SSTableError> {
        drop(self.file);
        match fs::remove_file(&self.tmp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
