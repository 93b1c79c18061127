//! # lsmkv
//!
//! An embedded, single-node, ordered key-value store built on the
//! log-structured merge-tree (LSM-tree) discipline. Keys and values are
//! strings; every mutation is durable; point lookups always reflect the
//! latest write or delete for a key.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Engine                            │
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────────┐ │
//! │  │  Active     │   │   Frozen     │   │  Sorted runs    │ │
//! │  │  memtable   │   │   memtable   │   │  (on disk)      │ │
//! │  └─────┬───────┘   └──────┬───────┘   └────────┬────────┘ │
//! │        │   freeze         │   flush            │          │
//! │        └──────────►       └───────────►         │          │
//! │                                                 │          │
//! │  ┌──────────────────────────────────────────────┘          │
//! │  │  Size-tiered background compaction (k-way merge)        │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │             Write-ahead log (crash recovery)          │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`record`] | The immutable (key, value, tombstone, timestamp) unit shared by every layer |
//! | [`encoding`] | Deterministic big-endian binary encoding used by every on-disk format |
//! | [`memtable`] | Active/frozen in-memory ordered table |
//! | [`wal`] | Append-only write-ahead log and crash recovery |
//! | [`sstable`] | Sorted-run writer and reader (the on-disk file format) |
//! | [`catalog`] | Registry of live sorted runs, tiering, and compaction candidate selection |
//! | [`merge`] | K-way merge iterator fusing sorted runs during compaction |
//! | [`compaction`] | Background size-tiered compaction worker |
//! | [`engine`] | The public facade coordinating all of the above |
//!
//! ## Guarantees
//!
//! - **Durability** — every write is appended to the WAL before being
//!   acknowledged (unless the WAL is disabled).
//! - **Crash recovery** — on [`engine::Engine::open`], the WAL is replayed
//!   into the active memtable before the engine accepts new operations.
//! - **Version precedence** — for any key, the record with the greatest
//!   timestamp wins, whether it lives in the active table, a frozen table,
//!   or a sorted run.
//! - **Crash-safe compaction** — a crash between publishing a new run and
//!   retiring its inputs leaves both present; re-reading still resolves to
//!   the newest version.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lsmkv::engine::{Engine, EngineConfig};
//!
//! let engine = Engine::open("/tmp/my_store", EngineConfig::default()).unwrap();
//!
//! engine.set("hello", "world").unwrap();
//! assert_eq!(engine.get("hello").unwrap(), Some("world".to_string()));
//!
//! engine.delete("hello").unwrap();
//! assert_eq!(engine.get("hello").unwrap(), None);
//!
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod catalog;
mod clock;
pub mod compaction;
pub mod encoding;
pub mod engine;
pub mod memtable;
pub mod merge;
pub mod record;
pub mod sstable;
pub mod wal;
