//! Buffer pool: the frame-level cache every page access in the storage
//! core goes through.
//!
//! Two pieces, leaves first:
//! - [`replacer::LruKReplacer`] picks an eviction victim among
//!   currently-unpinned frames by backward k-distance.
//! - [`pool::BufferPoolManager`] owns the fixed frame array, a free
//!   list, a page table, and the replacer, and serves `new_page` /
//!   `fetch_page` / `unpin_page` / `flush_page` / `flush_all` /
//!   `delete_page` to callers such as the B+ tree index.

pub mod pool;
pub mod replacer;

pub use pool::{BufferPoolManager, Frame, PageGuard};
pub use replacer::LruKReplacer;
