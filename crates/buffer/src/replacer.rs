//! LRU-K frame replacer.
//!
//! Tracks, for every frame the buffer pool has touched, how many times
//! it has been accessed and whether it is currently evictable. The
//! frame chosen for eviction is the evictable one with the largest
//! backward k-distance: an entry seen fewer than `k` times has an
//! infinite backward distance and is preferred over any entry with a
//! full k-history, and ties within each group break by recency.

use common::FrameId;
use parking_lot::Mutex;
use std::collections::HashMap;

struct Entry {
    access_count: usize,
    evictable: bool,
}

struct Inner {
    k: usize,
    capacity: usize,
    evictable_count: usize,
    entries: HashMap<FrameId, Entry>,
    /// Frames with `access_count < k`, oldest-first-access at the front.
    history: Vec<FrameId>,
    /// Frames with `access_count >= k`, most-recently-accessed at the back.
    cache: Vec<FrameId>,
}

impl Inner {
    fn remove_from(queue: &mut Vec<FrameId>, frame_id: FrameId) {
        if let Some(pos) = queue.iter().position(|&f| f == frame_id) {
            queue.remove(pos);
        }
    }
}

/// A mutex-guarded LRU-K replacer.
pub struct LruKReplacer {
    inner: Mutex<Inner>,
}

impl LruKReplacer {
    /// Create a replacer tracking up to `capacity` frame ids, evicting
    /// by backward `k`-distance.
    pub fn new(capacity: usize, k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            inner: Mutex::new(Inner {
                k,
                capacity,
                evictable_count: 0,
                entries: HashMap::new(),
                history: Vec::new(),
                cache: Vec::new(),
            }),
        }
    }

    /// Record an access to `frame_id`. Faults if `frame_id` is outside
    /// the configured capacity — that indicates a caller bug, not a
    /// recoverable condition.
    pub fn record_access(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        assert!(
            frame_id < inner.capacity,
            "frame id {frame_id} exceeds replacer capacity {}",
            inner.capacity
        );

        let k = inner.k;
        let already_in_cache = inner
            .entries
            .get(&frame_id)
            .map(|e| e.access_count >= k)
            .unwrap_or(false);

        match inner.entries.get_mut(&frame_id) {
            None => {
                inner.entries.insert(
                    frame_id,
                    Entry {
                        access_count: 1,
                        evictable: false,
                    },
                );
                inner.history.push(frame_id);
            }
            Some(entry) => {
                entry.access_count += 1;
                if already_in_cache {
                    Inner::remove_from(&mut inner.cache, frame_id);
                    inner.cache.push(frame_id);
                } else if entry.access_count == k {
                    Inner::remove_from(&mut inner.history, frame_id);
                    inner.cache.push(frame_id);
                }
            }
        }
    }

    /// Mark `frame_id` evictable or pinned. Unknown frame ids are
    /// silently ignored; only an actual transition adjusts `size()`.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&frame_id) {
            if entry.evictable != evictable {
                entry.evictable = evictable;
                if evictable {
                    inner.evictable_count += 1;
                } else {
                    inner.evictable_count -= 1;
                }
            }
        }
    }

    /// Evict the frame with the largest backward k-distance: the
    /// earliest evictable entry in `history`, falling back to the
    /// earliest evictable entry in `cache`. Returns `None` if no
    /// tracked frame is currently evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();

        let victim = inner
            .history
            .iter()
            .copied()
            .find(|f| inner.entries[f].evictable)
            .or_else(|| {
                inner
                    .cache
                    .iter()
                    .copied()
                    .find(|f| inner.entries[f].evictable)
            })?;

        Inner::remove_from(&mut inner.history, victim);
        Inner::remove_from(&mut inner.cache, victim);
        inner.entries.remove(&victim);
        inner.evictable_count -= 1;
        Some(victim)
    }

    /// Drop all tracking for `frame_id`. A no-op for an untracked
    /// frame. Removing a pinned (non-evictable) frame is a fault: the
    /// caller must unpin before removing.
    pub fn remove(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get(&frame_id) else {
            return;
        };
        assert!(
            entry.evictable,
            "cannot remove pinned frame {frame_id} from replacer"
        );
        Inner::remove_from(&mut inner.history, frame_id);
        Inner::remove_from(&mut inner.cache, frame_id);
        inner.entries.remove(&frame_id);
        inner.evictable_count -= 1;
    }

    /// Number of frames currently marked evictable.
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_k_distance_prefers_infinite_over_finite() {
        let replacer = LruKReplacer::new(7, 2);
        for f in 1..=6 {
            replacer.record_access(f);
        }
        for f in 1..=5 {
            replacer.set_evictable(f, true);
        }
        replacer.set_evictable(6, false);
        assert_eq!(replacer.size(), 5);

        // Frame 1 now has a full k-history; 2..5 remain single-access
        // (infinite backward distance) and are evicted first.
        replacer.record_access(1);

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.evict(), Some(4));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn set_evictable_is_idempotent_on_count() {
        let replacer = LruKReplacer::new(2, 2);
        replacer.record_access(0);
        replacer.set_evictable(0, true);
        replacer.set_evictable(0, true);
        assert_eq!(replacer.size(), 1);
        replacer.set_evictable(0, false);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn unknown_frame_is_ignored_by_set_evictable() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.set_evictable(3, true);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn evict_returns_none_when_empty() {
        let replacer = LruKReplacer::new(4, 2);
        assert!(replacer.evict().is_none());
    }

    #[test]
    #[should_panic(expected = "cannot remove pinned frame")]
    fn remove_pinned_frame_faults() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(0);
        replacer.remove(0);
    }

    #[test]
    fn remove_untracked_frame_is_noop() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.remove(2);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    #[should_panic]
    fn record_access_out_of_range_faults() {
        let replacer = LruKReplacer::new(2, 2);
        replacer.record_access(5);
    }

    #[test]
    fn cache_entries_move_to_back_on_repeated_access() {
        let replacer = LruKReplacer::new(3, 2);
        replacer.record_access(0);
        replacer.record_access(0); // now in cache
        replacer.record_access(1);
        replacer.record_access(1); // now in cache, more recent than 0
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);

        replacer.record_access(0); // touch 0 again: 0 becomes most recent
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(0));
    }
}
