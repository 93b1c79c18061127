//! Sorted runs: the immutable on-disk file format produced by a flush or
//! a compaction.
//!
//! Each run file holds, in order: a data section of key-ascending encoded
//! [`crate::record::Record`]s, a sparse/complete index section, and a
//! trailing-length footer so the reader never has to guess a fixed footer
//! size.
//!
//! ```text
//! [data section: records, key-ascending]
//! [index section: (u32 key_len, key_bytes, i64 offset) per record]
//! [i64 index_offset]             // byte offset where the index section starts
//! [u32 entry_count]
//! [u32 min_key_len][min_key_bytes]
//! [u32 max_key_len][max_key_bytes]
//! [i64 created_ms]
//! [u32 footer_len]               // last 4 bytes of the file
//! ```
//!
//! [`writer::RunWriter`] produces these files; [`reader::SortedRunReader`]
//! loads the footer and index once and serves point lookups via binary
//! search plus a bounded forward scan.

pub mod reader;
pub mod writer;


pub use reader::{SortedRunIterator, SortedRunReader};
pub use writer::RunWriter;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::encoding::CodecError;

/// Errors produced while writing or reading a sorted run.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding/decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] CodecError),

    /// The file's structure violates an invariant (e.g. footer too short
    /// for the file size, or a decoded record fails a length check).
    #[error("corrupt sorted run: {0}")]
    Corrupt(String),
}

/// Metadata describing one published sorted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetadata {
    /// Path to the `.dat` file on disk.
    pub path: PathBuf,
    /// File id, parsed out of the filename (`run_<id>.dat`).
    pub id: u64,
    /// Smallest key in the run.
    pub min_key: Vec<u8>,
    /// Largest key in the run.
    pub max_key: Vec<u8>,
    /// Number of records in the run.
    pub entry_count: u64,
    /// Size of the file in bytes.
    pub byte_size: u64,
    /// Wall-clock milliseconds at creation (flush or compaction).
    pub created_ms: i64,
}

impl RunMetadata {
    /// `true` if `key` could possibly be present (falls within `[min_key,
    /// max_key]`).
    pub fn may_contain(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}

/// Formats the filename for run id `id`: `run_<id zero-padded to 6>.dat`.
pub fn run_file_name(id: u64) -> String {
    format!("run_{id:06}.dat")
}

/// Parses a run id out of a filename matching [`run_file_name`]'s pattern,
/// returning `None` if it doesn't match.
pub fn parse_run_id(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("run_")
        .and_then(|s| s.strip_suffix(".dat"))
        .and_then(|s| s.parse::<u64>().ok())
}
