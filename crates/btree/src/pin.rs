//! RAII pin guard binding a buffer-pool [`PageGuard`] to the pool that
//! issued it.
//!
//! `BufferPoolManager::fetch_page`/`new_page` hand back a bare
//! `PageGuard` and leave the caller responsible for calling
//! `unpin_page` exactly once with the correct dirty bit — by design,
//! so the pool never has to guess whether a borrow was a read or a
//! write. A hand-tracked discipline like that is exactly the class of
//! bug-prone bookkeeping Rust's ownership model exists to remove, so
//! every page this crate touches is wrapped in a `Pinned` the moment
//! it is fetched: the unpin happens in `Drop`, on every return path,
//! including `?`-propagated errors.
//!
//! Eviction-pinning and latching are separate concerns here. A
//! `Pinned` always protects its frame from eviction, but by default
//! `read()`/`write()` take and release the underlying lock for just
//! one borrow, the same as any other `RwLock`. Crabbing needs more:
//! an ancestor has to stay genuinely locked across several borrows,
//! from the moment it is fetched until the descent proves it safe or
//! a split/merge finishes splicing into it. `latch_shared`/
//! `latch_exclusive` hold the lock open for that whole window, using
//! `parking_lot`'s owned `Arc*Guard` types so the lock can live inside
//! this struct rather than only for the scope of one call.
use buffer::{BufferPoolManager, Frame, PageGuard};
use common::PageId;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

enum Latch {
    Shared(ArcRwLockReadGuard<RawRwLock, Frame>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, Frame>),
}

pub struct Pinned {
    pool: Arc<BufferPoolManager>,
    guard: PageGuard,
    dirty: bool,
    latch: Option<Latch>,
}

impl Pinned {
    pub fn new(pool: Arc<BufferPoolManager>, guard: PageGuard) -> Self {
        Self {
            pool,
            guard,
            dirty: false,
            latch: None,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Acquire and hold a shared latch until [`Self::unlatch`] or drop.
    /// A no-op if a shared or exclusive latch is already held. Readonly
    /// descents call this at every step so a concurrent split/merge
    /// splicing into the same page has to wait, rather than racing past
    /// a transient borrow.
    pub fn latch_shared(&mut self) {
        if self.latch.is_none() {
            self.latch = Some(Latch::Shared(self.guard.read_arc()));
        }
    }

    /// Acquire and hold an exclusive latch, upgrading a held shared
    /// latch if necessary. A no-op if already held exclusively. Dropping
    /// the shared latch before re-acquiring (rather than upgrading in
    /// place) is what keeps this from deadlocking against itself.
    pub fn latch_exclusive(&mut self) {
        if matches!(self.latch, Some(Latch::Exclusive(_))) {
            return;
        }
        self.latch = None;
        self.latch = Some(Latch::Exclusive(self.guard.write_arc()));
    }

    /// Release a held latch early, ahead of drop — used once a descent
    /// proves a node safe and its ancestors no longer need protecting.
    pub fn unlatch(&mut self) {
        self.latch = None;
    }

    /// Borrow for reading. Reuses an already-held latch; otherwise takes
    /// a transient shared lock for just this borrow.
    pub fn read(&self) -> FrameRef<'_> {
        match &self.latch {
            Some(Latch::Shared(g)) => FrameRef::Latched(&**g),
            Some(Latch::Exclusive(g)) => FrameRef::Latched(&**g),
            None => FrameRef::Transient(self.guard.read()),
        }
    }

    /// Borrow for mutation. Marks the page dirty for the eventual
    /// unpin, regardless of whether the caller changes any bytes —
    /// matching the "dirty bit is sticky" rule, a conservative OR is
    /// always safe. Reuses an already-held exclusive latch; a held
    /// shared latch is dropped first (mutating through it would be
    /// unsound), falling back to a transient exclusive lock.
    pub fn write(&mut self) -> FrameRefMut<'_> {
        self.dirty = true;
        if matches!(self.latch, Some(Latch::Shared(_))) {
            self.latch = None;
        }
        match &mut self.latch {
            Some(Latch::Exclusive(g)) => FrameRefMut::Latched(&mut **g),
            Some(Latch::Shared(_)) => unreachable!("shared latch cleared above"),
            None => FrameRefMut::Transient(self.guard.write()),
        }
    }
}

impl Drop for Pinned {
    fn drop(&mut self) {
        self.latch = None;
        self.pool.unpin_page(self.guard.page_id(), self.dirty);
    }
}

/// Either a reference into a held latch or a transient lock guard;
/// transparent to callers via `Deref`.
pub enum FrameRef<'a> {
    Latched(&'a Frame),
    Transient(RwLockReadGuard<'a, Frame>),
}

impl Deref for FrameRef<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        match self {
            FrameRef::Latched(f) => f,
            FrameRef::Transient(g) => g,
        }
    }
}

/// Mutable counterpart of [`FrameRef`].
pub enum FrameRefMut<'a> {
    Latched(&'a mut Frame),
    Transient(RwLockWriteGuard<'a, Frame>),
}

impl Deref for FrameRefMut<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        match self {
            FrameRefMut::Latched(f) => f,
            FrameRefMut::Transient(g) => g,
        }
    }
}

impl DerefMut for FrameRefMut<'_> {
    fn deref_mut(&mut self) -> &mut Frame {
        match self {
            FrameRefMut::Latched(f) => f,
            FrameRefMut::Transient(g) => g,
        }
    }
}
