use std::sync::Arc;

use tempfile::TempDir;

use crate::catalog::Catalog;
use crate::record::Record;
use crate::sstable::RunWriter;

use super::CompactionWorker;

fn write_run(dir: &std::path::Path, id: u64, created_ms: i64, records: &[(&str, Option<&str>)]) {
    let mut writer = RunWriter::create(dir, id, created_ms).unwrap();
    for (key, value) in records {
        let record = match value {
            Some(v) => Record::put(key.as_bytes().to_vec(), v.as_bytes().to_vec(), created_ms),
            None => Record::delete(key.as_bytes().to_vec(), created_ms),
        };
        writer.write(&record).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn compact_once_merges_and_retires_candidates() {
    let dir = TempDir::new().unwrap();
    write_run(dir.path(), 0, 100, &[("a", Some("1")), ("b", Some("2"))]);
    write_run(dir.path(), 1, 200, &[("b", Some("3")), ("c", Some("4"))]);

    let catalog = Arc::new(Catalog::scan(dir.path()).unwrap());
    assert_eq!(catalog.count(), 2);

    let worker = CompactionWorker::new(Arc::clone(&catalog), 2, 10, 60_000);
    let did_work = worker.compact_once().unwrap();
    assert!(did_work);

    assert_eq!(catalog.count(), 1);
    let merged = catalog.get(b"b").unwrap().unwrap();
    assert_eq!(merged.value, Some(b"3".to_vec()));
    assert_eq!(catalog.get(b"a").unwrap().unwrap().value, Some(b"1".to_vec()));
    assert_eq!(catalog.get(b"c").unwrap().unwrap().value, Some(b"4".to_vec()));
}

#[test]
fn compact_once_returns_false_with_fewer_than_two_candidates() {
    let dir = TempDir::new().unwrap();
    write_run(dir.path(), 0, 100, &[("a", Some("1"))]);

    let catalog = Arc::new(Catalog::scan(dir.path()).unwrap());
    let worker = CompactionWorker::new(Arc::clone(&catalog), 2, 10, 60_000);
    assert!(!worker.compact_once().unwrap());
    assert_eq!(catalog.count(), 1);
}

#[test]
fn compact_once_drops_tombstones_when_no_older_run_remains() {
    let dir = TempDir::new().unwrap();
    write_run(dir.path(), 0, 100, &[("a", Some("1"))]);
    write_run(dir.path(), 1, 200, &[("a", None)]);

    let catalog = Arc::new(Catalog::scan(dir.path()).unwrap());
    let worker = CompactionWorker::new(Arc::clone(&catalog), 2, 10, 60_000);
    worker.compact_once().unwrap();

    // Both candidates were the entire catalog, so the tombstone is safe to
    // drop and no run (and no entry) survives for "a".
    assert_eq!(catalog.count(), 0);
    assert!(catalog.get(b"a").unwrap().is_none());
}

#[test]
fn compact_once_keeps_tombstones_when_an_older_run_is_excluded() {
    let dir = TempDir::new().unwrap();
    write_run(dir.path(), 0, 100, &[("a", Some("1"))]);
    write_run(dir.path(), 1, 200, &[("a", None)]);
    write_run(dir.path(), 2, 300, &[("b", Some("2"))]);

    let catalog = Arc::new(Catalog::scan(dir.path()).unwrap());
    // max_compaction_files=2 only picks the oldest two runs out of the
    // tier (0 and 1); run 2 is excluded from this pass.
    let worker = CompactionWorker::new(Arc::clone(&catalog), 2, 2, 60_000);
    worker.compact_once().unwrap();

    let result = catalog.get(b"a").unwrap();
    assert!(result.is_some());
    assert!(result.unwrap().tombstone);
}

#[test]
fn trigger_coalesces_with_a_concurrent_pass() {
    let dir = TempDir::new().unwrap();
    write_run(dir.path(), 0, 100, &[("a", Some("1"))]);
    write_run(dir.path(), 1, 200, &[("b", Some("2"))]);

    let catalog = Arc::new(Catalog::scan(dir.path()).unwrap());
    let worker = CompactionWorker::new(catalog, 2, 10, 60_000);

    let _guard = worker.busy.try_lock().unwrap();
    assert!(!worker.trigger().unwrap());
}
