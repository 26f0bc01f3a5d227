//! Extendible hash table: an in-memory key/value container whose
//! directory of bucket pointers doubles on demand instead of rehashing
//! the whole table.
//!
//! The buffer pool uses one of these as its page table (`PageId ->
//! FrameId`); nothing about the container is specific to that use, so
//! it is also usable as a general-purpose map.

#[cfg(test)]
mod tests;

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

struct Bucket<K, V> {
    local_depth: u32,
    entries: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: u32) -> Self {
        Self {
            local_depth,
            entries: Vec::new(),
        }
    }
}

struct Inner<K, V> {
    global_depth: u32,
    bucket_size: usize,
    /// directory[i] is an index into `buckets`.
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// A mutex-guarded extendible hash table.
///
/// One lock protects the whole table; every public operation acquires
/// it for the duration of the call. Internal helpers assume the lock
/// is already held and never re-acquire it.
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a table whose buckets hold at most `bucket_size` entries
    /// before splitting. Starts with a single bucket at global depth 0.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket_size must be positive");
        Self {
            inner: Mutex::new(Inner {
                global_depth: 0,
                bucket_size,
                directory: vec![0],
                buckets: vec![Bucket::new(0)],
            }),
        }
    }

    fn hash_of(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// `hash(key) & ((1 << global_depth) - 1)`, the directory slot a
    /// key currently resolves to.
    fn index_of(hash: u64, global_depth: u32) -> usize {
        let mask = (1u64 << global_depth) - 1;
        (hash & mask) as usize
    }

    /// Look up `key`. Returns `None` if absent.
    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let idx = Self::index_of(Self::hash_of(key), inner.global_depth);
        let bucket = &inner.buckets[inner.directory[idx]];
        bucket
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert or overwrite `key` with `value`.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        let hash = Self::hash_of(&key);

        loop {
            let idx = Self::index_of(hash, inner.global_depth);
            let bucket_id = inner.directory[idx];

            if let Some(slot) = inner.buckets[bucket_id]
                .entries
                .iter_mut()
                .find(|(k, _)| *k == key)
            {
                slot.1 = value;
                return;
            }

            let bucket_size = inner.bucket_size;
            if inner.buckets[bucket_id].entries.len() < bucket_size {
                inner.buckets[bucket_id].entries.push((key, value));
                return;
            }

            Self::split(&mut inner, bucket_id);
            // The target bucket may still be full if every colliding
            // key shares the new discriminating bit; loop and retry.
        }
    }

    /// Split the bucket at `bucket_id`, doubling the directory first
    /// if its local depth has caught up with the global depth.
    fn split(inner: &mut Inner<K, V>, bucket_id: usize) {
        let local_depth = inner.buckets[bucket_id].local_depth;

        if local_depth == inner.global_depth {
            let len = inner.directory.len();
            inner.directory.extend_from_within(0..len);
            inner.global_depth += 1;
        }

        let new_local_depth = local_depth + 1;
        let discriminating_bit = 1u64 << local_depth;

        let old_entries = std::mem::take(&mut inner.buckets[bucket_id].entries);
        inner.buckets[bucket_id].local_depth = new_local_depth;

        let mut sibling = Bucket::new(new_local_depth);
        for (k, v) in old_entries {
            if Self::hash_of(&k) & discriminating_bit == 0 {
                inner.buckets[bucket_id].entries.push((k, v));
            } else {
                sibling.entries.push((k, v));
            }
        }
        let sibling_id = inner.buckets.len();
        inner.buckets.push(sibling);

        for i in 0..inner.directory.len() {
            if inner.directory[i] == bucket_id && (i as u64) & discriminating_bit != 0 {
                inner.directory[i] = sibling_id;
            }
        }
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let idx = Self::index_of(Self::hash_of(key), inner.global_depth);
        let bucket_id = inner.directory[idx];
        let bucket = &mut inner.buckets[bucket_id];
        let before = bucket.entries.len();
        bucket.entries.retain(|(k, _)| k != key);
        bucket.entries.len() < before
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    /// Number of distinct buckets referenced from the directory.
    pub fn num_buckets(&self) -> usize {
        let inner = self.inner.lock();
        let mut seen: Vec<usize> = inner.directory.clone();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Local depth of the bucket referenced by directory slot `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let inner = self.inner.lock();
        inner.buckets[inner.directory[dir_index]].local_depth
    }
}
