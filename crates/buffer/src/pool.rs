//! Buffer pool manager: a fixed array of page frames backed by a disk
//! manager, with eviction mediated by an extendible-hash page table
//! and an LRU-K replacer.

use crate::replacer::LruKReplacer;
use common::{DbResult, FrameId, PageId};
use hash::ExtendibleHashTable;
use parking_lot::{
    ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::collections::VecDeque;
use std::sync::Arc;
use storage::{DiskManager, LogManager, PAGE_SIZE};

/// Directory bucket size for the buffer pool's internal page table.
/// Small on purpose: this table is sized to the pool, not to a large
/// on-disk dataset.
const PAGE_TABLE_BUCKET_SIZE: usize = 4;

/// A single in-memory slot holding at most one page's bytes plus the
/// bookkeeping the pool needs to evict or flush it correctly.
pub struct Frame {
    page_id: PageId,
    pin_count: usize,
    dirty: bool,
    lsn: u32,
    /// Raw page bytes. Readable and writable directly through a
    /// `PageGuard`; the pool never interprets the contents.
    pub data: [u8; PAGE_SIZE],
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: PageId::INVALID,
            pin_count: 0,
            dirty: false,
            lsn: 0,
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Highest log sequence number the holder claims this page reflects.
    pub fn lsn(&self) -> u32 {
        self.lsn
    }

    pub fn set_lsn(&mut self, lsn: u32) {
        self.lsn = lsn;
    }
}

/// A pinned page: the frame stays resident and non-evictable for as
/// long as this handle is outstanding. Call `unpin_page` on the
/// owning pool when done — there is no automatic unpin on drop, since
/// the pool (not the guard) is the one that knows whether the access
/// dirtied the page.
pub struct PageGuard {
    page_id: PageId,
    frame: Arc<RwLock<Frame>>,
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Frame> {
        self.frame.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Frame> {
        self.frame.write()
    }

    /// Owned shared lock, detached from `self`'s lifetime so it can be
    /// stashed inside a struct and carried across a multi-step operation
    /// instead of only for the duration of one borrow.
    pub fn read_arc(&self) -> ArcRwLockReadGuard<RawRwLock, Frame> {
        self.frame.read_arc()
    }

    /// Owned exclusive lock; see [`Self::read_arc`].
    pub fn write_arc(&self) -> ArcRwLockWriteGuard<RawRwLock, Frame> {
        self.frame.write_arc()
    }
}

/// Fixed-capacity buffer pool manager.
///
/// Every public operation is linearized against every other: the free
/// list is guarded by a mutex that doubles as the pool's coarse latch,
/// held for the operation's full duration, matching the "one mutex
/// protects the frame array, page table, replacer interactions, and
/// free list" discipline. The page table and replacer carry their own
/// internal mutexes as independent components; nesting them inside the
/// pool latch is safe since neither is re-entered from within the
/// other.
pub struct BufferPoolManager {
    pool_size: usize,
    disk_manager: Arc<dyn DiskManager>,
    log_manager: Arc<dyn LogManager>,
    replacer: LruKReplacer,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    frames: Vec<Arc<RwLock<Frame>>>,
    free_list: Mutex<VecDeque<FrameId>>,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        k: usize,
        disk_manager: Arc<dyn DiskManager>,
        log_manager: Arc<dyn LogManager>,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self {
            pool_size,
            disk_manager,
            log_manager,
            replacer: LruKReplacer::new(pool_size, k),
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            frames: (0..pool_size)
                .map(|_| Arc::new(RwLock::new(Frame::empty())))
                .collect(),
            free_list: Mutex::new((0..pool_size).collect()),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Obtain a frame id to install a page into: prefer the free list,
    /// otherwise evict. Flushes the evicted frame first if dirty and
    /// drops its old page-table mapping. Returns `None` if nothing is
    /// free and nothing is evictable.
    fn get_frame(&self, free_list: &mut VecDeque<FrameId>) -> DbResult<Option<FrameId>> {
        if let Some(frame_id) = free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.evict() else {
            tracing::debug!(pool_size = self.pool_size, "buffer pool exhausted, nothing evictable");
            return Ok(None);
        };

        let mut frame = self.frames[frame_id].write();
        tracing::trace!(evicted = ?frame.page_id, frame_id, dirty = frame.dirty, "evicting frame");
        if frame.dirty {
            if frame.lsn > self.log_manager.persisted_lsn() {
                self.log_manager.flush_log_to(frame.lsn)?;
            }
            self.disk_manager.write_page(frame.page_id, &frame.data)?;
            frame.dirty = false;
        }
        self.page_table.remove(&frame.page_id);
        Ok(Some(frame_id))
    }

    /// Allocate a fresh page, pin it, and return a guard to its frame.
    /// Returns `Ok(None)` if the pool is exhausted (no free frame and
    /// nothing evictable) rather than blocking.
    pub fn new_page(&self) -> DbResult<Option<PageGuard>> {
        let mut free_list = self.free_list.lock();
        let Some(frame_id) = self.get_frame(&mut free_list)? else {
            return Ok(None);
        };

        let page_id = self.disk_manager.allocate_page()?;
        {
            let mut frame = self.frames[frame_id].write();
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = false;
            frame.lsn = 0;
            frame.data = [0u8; PAGE_SIZE];
        }
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        tracing::trace!(?page_id, frame_id, "allocated new page");
        Ok(Some(PageGuard {
            page_id,
            frame: Arc::clone(&self.frames[frame_id]),
        }))
    }

    /// Fetch `page_id`, pinning it. Reads from disk on a cold miss.
    /// Returns `Ok(None)` if the pool is exhausted.
    pub fn fetch_page(&self, page_id: PageId) -> DbResult<Option<PageGuard>> {
        let mut free_list = self.free_list.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            {
                let mut frame = self.frames[frame_id].write();
                frame.pin_count += 1;
            }
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(Some(PageGuard {
                page_id,
                frame: Arc::clone(&self.frames[frame_id]),
            }));
        }

        let Some(frame_id) = self.get_frame(&mut free_list)? else {
            return Ok(None);
        };

        tracing::trace!(?page_id, frame_id, "cold miss, reading page from disk");
        let mut buf = [0u8; PAGE_SIZE];
        self.disk_manager.read_page(page_id, &mut buf)?;
        {
            let mut frame = self.frames[frame_id].write();
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = false;
            frame.lsn = 0;
            frame.data = buf;
        }
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(Some(PageGuard {
            page_id,
            frame: Arc::clone(&self.frames[frame_id]),
        }))
    }

    /// Unpin `page_id`. `is_dirty` is OR'd into the frame's sticky
    /// dirty bit. Returns `false`, with no state change, if the page
    /// is absent or already unpinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _free_list = self.free_list.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };

        let mut frame = self.frames[frame_id].write();
        if frame.pin_count == 0 {
            return false;
        }
        frame.pin_count -= 1;
        frame.dirty |= is_dirty;
        if frame.pin_count == 0 {
            drop(frame);
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Write `page_id`'s frame to disk if resident and dirty. Ignores
    /// pin state. Returns `false` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> DbResult<bool> {
        let _free_list = self.free_list.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };

        let mut frame = self.frames[frame_id].write();
        if frame.dirty {
            self.disk_manager.write_page(page_id, &frame.data)?;
            frame.dirty = false;
        }
        Ok(true)
    }

    /// Flush every resident dirty page.
    pub fn flush_all(&self) -> DbResult<()> {
        let _free_list = self.free_list.lock();
        for frame_lock in &self.frames {
            let mut frame = frame_lock.write();
            if frame.page_id.is_valid() && frame.dirty {
                self.disk_manager.write_page(frame.page_id, &frame.data)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Remove `page_id` from the pool and deallocate it on disk.
    /// Absent pages return `true` (nothing to do); pinned pages return
    /// `false` and are left untouched. The page is not flushed first —
    /// it is being abandoned, not persisted.
    pub fn delete_page(&self, page_id: PageId) -> DbResult<bool> {
        let mut free_list = self.free_list.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };

        {
            let frame = self.frames[frame_id].read();
            if frame.pin_count > 0 {
                return Ok(false);
            }
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        {
            let mut frame = self.frames[frame_id].write();
            *frame = Frame::empty();
        }
        free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id)?;
        tracing::debug!(?page_id, frame_id, "deleted page");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{FileDiskManager, NoopLogManager};
    use tempfile::tempdir;

    fn pool(pool_size: usize, k: usize) -> (BufferPoolManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = Arc::new(FileDiskManager::open(dir.path().join("pages.db")).unwrap());
        let lm = Arc::new(NoopLogManager);
        (BufferPoolManager::new(pool_size, k, dm, lm), dir)
    }

    #[test]
    fn new_page_is_pinned_and_zeroed() {
        let (bpm, _dir) = pool(4, 2);
        let guard = bpm.new_page().unwrap().unwrap();
        assert!(guard.read().data.iter().all(|&b| b == 0));
        assert!(bpm.unpin_page(guard.page_id(), false));
    }

    #[test]
    fn unpin_on_zero_pin_count_returns_false_and_does_not_mutate() {
        let (bpm, _dir) = pool(4, 2);
        let guard = bpm.new_page().unwrap().unwrap();
        assert!(bpm.unpin_page(guard.page_id(), true));
        assert!(!bpm.unpin_page(guard.page_id(), true));
    }

    #[test]
    fn fetch_after_unpin_reuses_resident_frame() {
        let (bpm, _dir) = pool(4, 2);
        let guard = bpm.new_page().unwrap().unwrap();
        let page_id = guard.page_id();
        guard.write().data[0] = 7;
        assert!(bpm.unpin_page(page_id, true));

        let guard2 = bpm.fetch_page(page_id).unwrap().unwrap();
        assert_eq!(guard2.read().data[0], 7);
        bpm.unpin_page(page_id, false);
    }

    #[test]
    fn flush_page_persists_dirty_bytes_to_disk() {
        let (bpm, _dir) = pool(4, 2);
        let guard = bpm.new_page().unwrap().unwrap();
        let page_id = guard.page_id();
        guard.write().data[0] = 9;
        bpm.unpin_page(page_id, true);
        assert!(bpm.flush_page(page_id).unwrap());
        assert!(!guard.read().data.is_empty());
    }

    #[test]
    fn pool_exhaustion_returns_none_when_all_pinned() {
        let (bpm, _dir) = pool(2, 2);
        let _g1 = bpm.new_page().unwrap().unwrap();
        let _g2 = bpm.new_page().unwrap().unwrap();
        assert!(bpm.new_page().unwrap().is_none());
    }

    #[test]
    fn eviction_frees_a_frame_for_reuse() {
        let (bpm, _dir) = pool(2, 2);
        let g1 = bpm.new_page().unwrap().unwrap();
        let g2 = bpm.new_page().unwrap().unwrap();
        bpm.unpin_page(g1.page_id(), false);
        bpm.unpin_page(g2.page_id(), false);

        // Both unpinned and evictable; a third new_page must evict one.
        let g3 = bpm.new_page().unwrap();
        assert!(g3.is_some());
    }

    #[test]
    fn delete_page_returns_false_while_pinned() {
        let (bpm, _dir) = pool(4, 2);
        let guard = bpm.new_page().unwrap().unwrap();
        assert!(!bpm.delete_page(guard.page_id()).unwrap());
        bpm.unpin_page(guard.page_id(), false);
        assert!(bpm.delete_page(guard.page_id()).unwrap());
    }

    #[test]
    fn delete_page_on_absent_page_returns_true() {
        let (bpm, _dir) = pool(4, 2);
        assert!(bpm.delete_page(PageId(999)).unwrap());
    }

    #[test]
    fn deleted_frame_returns_to_free_list() {
        let (bpm, _dir) = pool(1, 2);
        let guard = bpm.new_page().unwrap().unwrap();
        let page_id = guard.page_id();
        bpm.unpin_page(page_id, false);
        assert!(bpm.delete_page(page_id).unwrap());

        // The only frame is free again; new_page must not report exhaustion.
        assert!(bpm.new_page().unwrap().is_some());
    }

    #[test]
    fn flush_all_clears_every_dirty_frame() {
        let (bpm, _dir) = pool(3, 2);
        let g1 = bpm.new_page().unwrap().unwrap();
        let g2 = bpm.new_page().unwrap().unwrap();
        g1.write().data[0] = 1;
        g2.write().data[0] = 2;
        bpm.unpin_page(g1.page_id(), true);
        bpm.unpin_page(g2.page_id(), true);
        assert!(bpm.flush_all().is_ok());
    }
}
