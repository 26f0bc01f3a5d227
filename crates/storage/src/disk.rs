//! File-backed `DiskManager`: a single paged file addressed by
//! `page_id * PAGE_SIZE` byte offsets.

use crate::{DiskManager, PAGE_SIZE};
use common::{DbError, DbResult, PageId};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};

/// A single-file, append-by-allocation disk manager.
///
/// Page ids are assigned monotonically starting at 0; `deallocate_page`
/// does not reclaim file space or reuse ids — it only exists so callers
/// can express "this page is no longer needed" without leaking a
/// `Result` through what is otherwise treated as an unconditional
/// operation.
#[derive(Debug)]
pub struct FileDiskManager {
    file: Mutex<File>,
    next_page_id: AtomicI32,
}

impl FileDiskManager {
    /// Open (creating if absent) the page file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())
            .map_err(|e| DbError::Storage(format!("failed to open page file: {e}")))?;

        let len = file
            .metadata()
            .map_err(|e| DbError::Storage(format!("failed to stat page file: {e}")))?
            .len();
        let next_page_id = (len / PAGE_SIZE as u64) as i32;
        tracing::debug!(path = %path.as_ref().display(), next_page_id, "opened page file");

        Ok(Self {
            file: Mutex::new(file),
            next_page_id: AtomicI32::new(next_page_id),
        })
    }

    fn offset(page_id: PageId) -> DbResult<u64> {
        if !page_id.is_valid() {
            return Err(DbError::Storage(format!(
                "cannot address invalid page id {}",
                page_id.0
            )));
        }
        Ok(page_id.0 as u64 * PAGE_SIZE as u64)
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> DbResult<()> {
        let offset = Self::offset(page_id)?;
        let mut file = self.file.lock();
        let file_len = file
            .metadata()
            .map_err(|e| DbError::Storage(format!("failed to stat page file: {e}")))?
            .len();

        if offset >= file_len {
            // Never-written page reads as zeroed — the disk manager
            // behaves as if the whole file were pre-allocated.
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::Storage(format!("seek failed reading page {}: {e}", page_id.0)))?;
        file.read_exact(buf)
            .map_err(|e| DbError::Storage(format!("read failed for page {}: {e}", page_id.0)))?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> DbResult<()> {
        let offset = Self::offset(page_id)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::Storage(format!("seek failed writing page {}: {e}", page_id.0)))?;
        file.write_all(buf)
            .map_err(|e| DbError::Storage(format!("write failed for page {}: {e}", page_id.0)))?;
        Ok(())
    }

    fn allocate_page(&self) -> DbResult<PageId> {
        let id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(page_id = id, "allocated page id");
        Ok(PageId(id))
    }

    fn deallocate_page(&self, _page_id: PageId) -> DbResult<()> {
        Ok(())
    }
}
