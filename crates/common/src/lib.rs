//! Shared identifiers, error type, and runtime configuration for the
//! storage core (buffer pool, extendible hash table, B+ tree index).


use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Logical identifier for a page in the storage layer.
///
/// `-1` (`PageId::INVALID`) means "no page" and is never assigned to a
/// resident page.
///
/// Examples:
/// - `let root = PageId(0);`
/// - `let leaf = PageId(42);`
/// - `let none = PageId::INVALID;`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub i32);

impl PageId {
    pub const INVALID: PageId = PageId(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Default for PageId {
    fn default() -> Self {
        PageId::INVALID
    }
}

/// In-pool slot index. Always `< pool_size`; unlike `PageId` it carries
/// no persistent meaning and is never written to disk.
pub type FrameId = usize;

/// Fully-qualified identifier for a record within a page: the page it
/// lives on plus its slot index within that page's body.
///
/// Examples:
/// - `let rid = RecordId { page_id: PageId(42), slot: 3 };`
/// - `let rid = RecordId { page_id: PageId(0), slot: 0 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    /// Pack into the 8-byte wire form used by B+ tree leaf entries
    /// (4-byte page id, 2-byte slot, 2 bytes padding).
    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.page_id.0.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: [u8; 8]) -> Self {
        let page_id = PageId(i32::from_le_bytes(buf[0..4].try_into().unwrap()));
        let slot = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        RecordId { page_id, slot }
    }
}

/// Canonical error type shared across the storage core.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("wal: {0}")]
    Wal(String),
    #[error("buffer pool exhausted: no frame available for {0}")]
    BufferPoolExhausted(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage core.
///
/// # Example
/// ```
/// use common::Config;
///
/// let config = Config::builder()
///     .buffer_pool_pages(64)
///     .lru_k(2)
///     .build();
/// assert_eq!(config.page_size, 4096);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory holding the database's page file and (optional) WAL.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// `k` for the LRU-K replacer's backward-distance policy.
    #[builder(default = 2)]
    pub lru_k: usize,
    /// Max entries per B+ tree leaf page. `0` means "derive from page_size".
    #[builder(default = 0)]
    pub btree_leaf_max_size: usize,
    /// Max children per B+ tree internal page. `0` means "derive from page_size".
    #[builder(default = 0)]
    pub btree_internal_max_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            buffer_pool_pages: 256,
            lru_k: 2,
            btree_leaf_max_size: 0,
            btree_internal_max_size: 0,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, FrameId, PageId, RecordId};
}
