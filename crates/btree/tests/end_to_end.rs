//! Exercises the full client → B+ tree → buffer pool → disk manager
//! path against a set of canonical scenarios (pool_size=10, k=2,
//! leaf_max=4, internal_max=4, 4-byte keys).

use btree::key::GenericKey;
use btree::BPlusTreeIndex;
use buffer::BufferPoolManager;
use common::{Config, PageId, RecordId};
use std::sync::Arc;
use storage::{FileDiskManager, NoopLogManager};
use tempfile::tempdir;

fn open_index(dir: &tempfile::TempDir) -> (BPlusTreeIndex<4>, Arc<BufferPoolManager>) {
    let dm = Arc::new(FileDiskManager::open(dir.path().join("pages.db")).unwrap());
    let lm = Arc::new(NoopLogManager);
    let pool = Arc::new(BufferPoolManager::new(10, 2, dm, lm));
    BPlusTreeIndex::<4>::init_header(&pool).unwrap();
    let config = Config::builder()
        .btree_leaf_max_size(4)
        .btree_internal_max_size(4)
        .build();
    let index = BPlusTreeIndex::<4>::open("primary", Arc::clone(&pool), &config).unwrap();
    (index, pool)
}

fn rid(slot: u16) -> RecordId {
    RecordId {
        page_id: PageId(0),
        slot,
    }
}

#[test]
fn scenario_1_fresh_tree_insert_search() {
    let dir = tempdir().unwrap();
    let (index, _pool) = open_index(&dir);

    let inputs = [3, 1, 4, 1, 5, 9, 2, 6];
    for (i, &k) in inputs.iter().enumerate() {
        let inserted = index.insert(GenericKey::from_i32(k), rid(i as u16)).unwrap();
        if k == 1 && i > 0 {
            assert!(!inserted, "second insert of key 1 must report a duplicate");
        }
    }

    assert_eq!(index.get_value(GenericKey::from_i32(1)).unwrap().len(), 1);
    assert!(!index.get_value(GenericKey::from_i32(9)).unwrap().is_empty());
    assert!(index.get_value(GenericKey::from_i32(7)).unwrap().is_empty());

    let seen: Vec<i32> = index.begin().unwrap().map(|(k, _)| k.to_i32()).collect();
    assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 9]);
}

#[test]
fn scenario_2_leaf_split_on_fifth_insert() {
    let dir = tempdir().unwrap();
    let (index, _pool) = open_index(&dir);

    let root_before = index.root_page_id();
    for (i, k) in [10, 20, 30, 40, 50].into_iter().enumerate() {
        index.insert(GenericKey::from_i32(k), rid(i as u16)).unwrap();
    }
    let root_after = index.root_page_id();

    assert_ne!(root_before, root_after, "root page id must change exactly once after the split");
    let seen: Vec<i32> = index.begin().unwrap().map(|(k, _)| k.to_i32()).collect();
    assert_eq!(seen, vec![10, 20, 30, 40, 50]);
}

#[test]
fn scenario_3_delete_with_borrow_from_right_sibling() {
    let dir = tempdir().unwrap();
    let (index, _pool) = open_index(&dir);
    for (i, k) in [10, 20, 30, 40, 50].into_iter().enumerate() {
        index.insert(GenericKey::from_i32(k), rid(i as u16)).unwrap();
    }

    assert!(index.remove(GenericKey::from_i32(10)).unwrap());

    let seen: Vec<i32> = index.begin().unwrap().map(|(k, _)| k.to_i32()).collect();
    assert_eq!(seen, vec![20, 30, 40, 50]);
}

#[test]
fn scenario_4_delete_with_merge_cascades_to_root_collapse() {
    let dir = tempdir().unwrap();
    let (index, _pool) = open_index(&dir);
    for (i, k) in [10, 20, 30, 40, 50].into_iter().enumerate() {
        index.insert(GenericKey::from_i32(k), rid(i as u16)).unwrap();
    }

    for k in [10, 20, 30] {
        assert!(index.remove(GenericKey::from_i32(k)).unwrap());
    }

    let seen: Vec<i32> = index.begin().unwrap().map(|(k, _)| k.to_i32()).collect();
    assert_eq!(seen, vec![40, 50]);
    // Root collapsed onto a single leaf holding the two survivors.
    assert!(index.root_page_id().is_valid());
}

#[test]
fn index_survives_a_flush_and_reopen_round_trip() {
    let dir = tempdir().unwrap();
    let (index, pool) = open_index(&dir);
    for (i, k) in (0..30).enumerate() {
        index.insert(GenericKey::from_i32(k), rid(i as u16)).unwrap();
    }
    pool.flush_all().unwrap();
    drop(index);

    let config = Config::builder()
        .btree_leaf_max_size(4)
        .btree_internal_max_size(4)
        .build();
    let reopened = BPlusTreeIndex::<4>::open("primary", Arc::clone(&pool), &config).unwrap();
    for k in 0..30 {
        assert_eq!(reopened.get_value(GenericKey::from_i32(k)).unwrap().len(), 1);
    }
}
