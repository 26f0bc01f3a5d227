//! Ascending iteration over `(key, RecordId)` pairs, walking the leaf
//! chain via each page's `next_page_id` rather than re-descending from
//! the root for every step.
//!
//! Holds at most one leaf pinned at a time; moving past its last entry
//! unpins it (via `Pinned`'s `Drop`) and fetches the next leaf in the
//! chain. A buffer-pool error encountered while advancing ends the
//! iteration early rather than surfacing through `Iterator::next`'s
//! `Option`-shaped signature — callers wanting error visibility should
//! use `BPlusTreeIndex::get_value`/`remove` directly.

use crate::key::GenericKey;
use crate::page::LeafPage;
use crate::pin::Pinned;
use buffer::BufferPoolManager;
use common::RecordId;
use std::sync::Arc;

pub struct IndexIterator<const N: usize> {
    pool: Arc<BufferPoolManager>,
    leaf: Option<Pinned>,
    index: usize,
}

impl<const N: usize> IndexIterator<N> {
    pub(crate) fn new(pool: Arc<BufferPoolManager>, leaf: Option<Pinned>, index: usize) -> Self {
        Self { pool, leaf, index }
    }

    pub(crate) fn at_end(pool: Arc<BufferPoolManager>) -> Self {
        Self {
            pool,
            leaf: None,
            index: 0,
        }
    }
}

impl<const N: usize> Iterator for IndexIterator<N> {
    type Item = (GenericKey<N>, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.leaf.as_ref()?;
            let (size, next_page_id) = {
                let f = leaf.read();
                let lp = LeafPage::<N>::new(&f.data);
                (lp.size(), lp.next_page_id())
            };

            if self.index < size {
                let item = {
                    let f = leaf.read();
                    let lp = LeafPage::<N>::new(&f.data);
                    (lp.key_at(self.index), lp.value_at(self.index))
                };
                self.index += 1;
                return Some(item);
            }

            if !next_page_id.is_valid() {
                self.leaf = None;
                return None;
            }

            let guard = self.pool.fetch_page(next_page_id).ok()??;
            self.leaf = Some(Pinned::new(Arc::clone(&self.pool), guard));
            self.index = 0;
        }
    }
}
