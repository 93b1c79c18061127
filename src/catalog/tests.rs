use super::*;
use crate::record::Record;
use crate::sstable::RunWriter;
use tempfile::tempdir;

fn publish_run(dir: &std::path::Path, id: u64, created_ms: i64, keys: &[&str]) -> RunMetadata {
    let mut writer = RunWriter::create(dir, id, created_ms).unwrap();
    for (i, key) in keys.iter().enumerate() {
        writer
            .write(&Record::put(key.as_bytes().to_vec(), format!("v{i}").into_bytes(), created_ms))
            .unwrap();
    }
    writer.finish().unwrap()
}

#[test]
fn scan_discovers_existing_runs_and_seeds_next_id() {
    let dir = tempdir().unwrap();
    publish_run(dir.path(), 0, 100, &["a", "b"]);
    publish_run(dir.path(), 1, 200, &["c"]);

    let catalog = Catalog::scan(dir.path()).unwrap();
    assert_eq!(catalog.count(), 2);
    assert_eq!(catalog.total_entries(), 3);

    let new_path = catalog.new_path();
    assert!(new_path.ends_with("run_000002.dat"));
}

#[test]
fn get_returns_newest_version_across_runs() {
    let dir = tempdir().unwrap();
    let meta_old = publish_run(dir.path(), 0, 100, &["k"]);
    let mut writer = RunWriter::create(dir.path(), 1, 200).unwrap();
    writer.write(&Record::put(b"k".to_vec(), b"new".to_vec(), 200)).unwrap();
    let meta_new = writer.finish().unwrap();

    let catalog = Catalog::scan(dir.path()).unwrap();
    assert_eq!(catalog.count(), 2);
    let record = catalog.get(b"k").unwrap().unwrap();
    assert_eq!(record.value, Some(b"new".to_vec()));
    let _ = (meta_old, meta_new);
}

#[test]
fn get_returns_none_for_missing_key() {
    let dir = tempdir().unwrap();
    publish_run(dir.path(), 0, 100, &["a"]);
    let catalog = Catalog::scan(dir.path()).unwrap();
    assert_eq!(catalog.get(b"zzz").unwrap(), None);
}

#[test]
fn publish_then_retire_removes_file_and_entry() {
    let dir = tempdir().unwrap();
    let catalog = Catalog::scan(dir.path()).unwrap();

    let path = catalog.new_path();
    let mut writer = RunWriter::create(dir.path(), 0, 100).unwrap();
    writer.write(&Record::put(b"a".to_vec(), b"1".to_vec(), 100)).unwrap();
    let meta = writer.finish().unwrap();
    assert_eq!(meta.path, path);
    catalog.publish(meta.clone()).unwrap();

    assert_eq!(catalog.count(), 1);
    assert!(meta.path.exists());

    catalog.retire(&meta).unwrap();
    assert_eq!(catalog.count(), 0);
    assert!(!meta.path.exists());
}

#[test]
fn select_for_compaction_requires_at_least_two_in_the_largest_tier() {
    let dir = tempdir().unwrap();
    publish_run(dir.path(), 0, 100, &["a"]);
    let catalog = Catalog::scan(dir.path()).unwrap();
    assert!(catalog.select_for_compaction(10).is_empty());
}

#[test]
fn select_for_compaction_picks_oldest_runs_in_the_largest_tier() {
    let dir = tempdir().unwrap();
    publish_run(dir.path(), 0, 100, &["a"]);
    publish_run(dir.path(), 1, 200, &["b"]);
    publish_run(dir.path(), 2, 300, &["c"]);

    let catalog = Catalog::scan(dir.path()).unwrap();
    let candidates = catalog.select_for_compaction(2);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].created_ms, 100);
    assert_eq!(candidates[1].created_ms, 200);
}

#[test]
fn group_by_tier_buckets_by_file_size() {
    let dir = tempdir().unwrap();
    publish_run(dir.path(), 0, 100, &["a"]);
    let catalog = Catalog::scan(dir.path()).unwrap();
    let tiers = catalog.group_by_tier();
    assert_eq!(tiers.get(&0).map(Vec::len), Some(1));
}
