//! External collaborators consumed by the buffer pool: a disk manager
//! (byte-addressable page store) and a log manager (write-ahead record
//! sink gating dirty-page eviction).
//!
//! Neither is part of the buffer pool's correctness surface — both are
//! treated as interfaces the core consumes, so this crate provides one
//! concrete, file-backed implementation of each plus trivial stubs
//! usable in tests.

mod disk;
mod log;

#[cfg(test)]
mod tests;

pub use disk::FileDiskManager;
pub use log::NoopLogManager;

use common::{DbResult, PageId};

/// Fixed page size used by every page in the system, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Byte-addressable page store.
///
/// Implementors own the mapping from `PageId` to a 4096-byte slot on
/// durable storage and the allocation of fresh page ids. Page id 0 is
/// reserved for the header page (index-name -> root-page-id records);
/// callers outside this crate are responsible for treating it that way.
pub trait DiskManager: Send + Sync {
    /// Read `PAGE_SIZE` bytes for `page_id` into `buf`.
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> DbResult<()>;

    /// Write `buf` to `page_id`'s slot on disk.
    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> DbResult<()>;

    /// Allocate and return a fresh page id. Page-id allocation is the
    /// disk manager's responsibility, not the buffer pool's.
    fn allocate_page(&self) -> DbResult<PageId>;

    /// Release a page id. Implementations are not required to reclaim
    /// the underlying disk space; the id itself is not reused.
    fn deallocate_page(&self, page_id: PageId) -> DbResult<()>;
}

/// Write-ahead log sink consumed by the buffer pool's eviction path.
///
/// The buffer pool calls `flush_log_to(lsn)` before writing out a dirty
/// frame whose LSN exceeds the log manager's last-persisted LSN. A
/// no-op stub (`NoopLogManager`) is sufficient whenever the embedding
/// application has no durability requirements beyond the page writes
/// themselves.
pub trait LogManager: Send + Sync {
    /// Durably persist all log records up to and including `lsn`.
    fn flush_log_to(&self, lsn: u32) -> DbResult<()>;

    /// The highest LSN known to be durable.
    fn persisted_lsn(&self) -> u32;
}
