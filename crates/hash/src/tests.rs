use super::*;

#[test]
fn insert_then_find_round_trips() {
    let table = ExtendibleHashTable::new(4);
    table.insert("a", 1);
    table.insert("b", 2);
    assert_eq!(table.find(&"a"), Some(1));
    assert_eq!(table.find(&"b"), Some(2));
    assert_eq!(table.find(&"c"), None);
}

#[test]
fn insert_overwrites_existing_key() {
    let table = ExtendibleHashTable::new(4);
    table.insert("a", 1);
    table.insert("a", 2);
    assert_eq!(table.find(&"a"), Some(2));
}

#[test]
fn remove_reports_presence() {
    let table = ExtendibleHashTable::new(4);
    table.insert(1, "x");
    assert!(table.remove(&1));
    assert!(!table.remove(&1));
    assert_eq!(table.find(&1), None);
}

#[test]
fn directory_doubles_under_collision_pressure() {
    // bucket_size=2 forces splits quickly; insert enough distinct
    // keys that the directory must grow past global_depth 0.
    let table = ExtendibleHashTable::new(2);
    for i in 0..64i64 {
        table.insert(i, i * 10);
    }
    assert!(table.global_depth() >= 1);
    for i in 0..64i64 {
        assert_eq!(table.find(&i), Some(i * 10), "key {i} missing after splits");
    }
}

#[test]
fn local_depth_never_exceeds_global_depth() {
    let table = ExtendibleHashTable::new(2);
    for i in 0..200i64 {
        table.insert(i, i);
    }
    let global = table.global_depth();
    for dir_index in 0..(1usize << global) {
        assert!(table.local_depth(dir_index) <= global);
    }
}

#[test]
fn num_buckets_grows_with_directory() {
    let table = ExtendibleHashTable::new(1);
    assert_eq!(table.num_buckets(), 1);
    for i in 0..16i64 {
        table.insert(i, i);
    }
    assert!(table.num_buckets() > 1);
}

#[test]
fn every_inserted_key_survives_many_splits() {
    let table = ExtendibleHashTable::new(3);
    for i in 0..500i64 {
        table.insert(i, i.to_string());
    }
    for i in 0..500i64 {
        assert_eq!(table.find(&i), Some(i.to_string()));
    }
}
