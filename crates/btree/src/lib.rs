//! Disk-backed B+ tree index, latched and paged through a shared
//! [`buffer::BufferPoolManager`].
//!
//! Every operation pins the pages it touches through [`pin::Pinned`]
//! (an RAII guard unpinning on drop, rather than tracking pin/unpin
//! calls by hand) and performs pessimistic crabbing via
//! [`latch::Context`]: each descent holds every ancestor exclusively
//! latched until it reaches a node proven "safe" (an internal with
//! room to absorb a split, or a node with more than the minimum
//! entries for a delete), at which point the whole ancestor chain is
//! released at once.
//!
//! Page id 0 is reserved as a small header page (see [`header`])
//! mapping index names to root page ids, so several named indexes can
//! share one buffer pool and disk file and still find their roots
//! again after a reopen.

pub mod header;
pub mod iter;
pub mod key;
pub mod latch;
pub mod node;
pub mod page;
pub mod pin;


use buffer::BufferPoolManager;
use common::{Config, DbError, DbResult, PageId, RecordId};
use iter::IndexIterator;
use key::GenericKey;
use latch::Context;
use page::{
    header_parent_page_id, header_size, page_type, InternalPage, InternalPageMut, LeafPage,
    LeafPageMut, PageType, HEADER_SIZE, LEAF_HEADER_SIZE,
};
use parking_lot::RwLock;
use pin::Pinned;
use std::sync::Arc;

/// A named B+ tree index over fixed-width `N`-byte keys, backed by a
/// shared buffer pool.
pub struct BPlusTreeIndex<const N: usize> {
    name: String,
    pool: Arc<BufferPoolManager>,
    leaf_max_size: usize,
    internal_max_size: usize,
    root_page_id: RwLock<PageId>,
}

impl<const N: usize> BPlusTreeIndex<N> {
    /// Zero the header page and write an empty index-name table. Must
    /// run exactly once, as the very first page ever allocated from a
    /// fresh pool/disk file, before any [`Self::open`] call.
    pub fn init_header(pool: &BufferPoolManager) -> DbResult<()> {
        let guard = pool
            .new_page()?
            .ok_or_else(|| DbError::BufferPoolExhausted("header page".into()))?;
        assert_eq!(
            guard.page_id(),
            PageId(0),
            "the header page must be the first page ever allocated"
        );
        {
            let mut frame = guard.write();
            header::init(&mut frame.data);
        }
        pool.unpin_page(guard.page_id(), true);
        Ok(())
    }

    /// Open (or create, lazily, on first insert) the named index,
    /// reading its root page id from the header page if one was
    /// already persisted. `config`'s `btree_leaf_max_size`/
    /// `btree_internal_max_size` override the page-size-derived
    /// defaults when non-zero.
    pub fn open(name: impl Into<String>, pool: Arc<BufferPoolManager>, config: &Config) -> DbResult<Self> {
        let name = name.into();

        let leaf_max_size = if config.btree_leaf_max_size == 0 {
            (config.page_size - LEAF_HEADER_SIZE) / (N + 8)
        } else {
            config.btree_leaf_max_size
        };
        let internal_max_size = if config.btree_internal_max_size == 0 {
            (config.page_size - HEADER_SIZE) / (N + 4)
        } else {
            config.btree_internal_max_size
        };
        assert!(leaf_max_size >= 3, "page too small to hold a splittable leaf");
        assert!(
            internal_max_size >= 3,
            "page too small to hold a splittable internal node"
        );

        let header_guard = pool
            .fetch_page(PageId(0))?
            .ok_or_else(|| DbError::BufferPoolExhausted("header page".into()))?;
        let header = Pinned::new(Arc::clone(&pool), header_guard);
        let root = {
            let f = header.read();
            header::lookup(&f.data, &name)
        }
        .unwrap_or(PageId::INVALID);
        drop(header);

        Ok(Self {
            name,
            pool,
            leaf_max_size,
            internal_max_size,
            root_page_id: RwLock::new(root),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.read().is_valid()
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    /// Every record id stored under `key` (at most one — this index
    /// does not support duplicate keys).
    pub fn get_value(&self, key: GenericKey<N>) -> DbResult<Vec<RecordId>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let leaf = self.descend_to_leaf_readonly(key)?;
        let f = leaf.read();
        let lp = LeafPage::<N>::new(&f.data);
        Ok(match lp.find(key) {
            Ok(idx) => vec![lp.value_at(idx)],
            Err(_) => Vec::new(),
        })
    }

    /// Insert `(key, value)`. Returns `false` without modifying the
    /// tree if `key` is already present.
    pub fn insert(&self, key: GenericKey<N>, value: RecordId) -> DbResult<bool> {
        if self.is_empty() {
            return self.insert_into_empty_tree(key, value);
        }

        let root = *self.root_page_id.read();
        let mut ctx = Context::new();
        let mut current = self.fetch_pinned(root)?;
        current.latch_exclusive();

        loop {
            let (is_leaf, child_id) = {
                let f = current.read();
                match page_type(&f.data) {
                    PageType::Leaf => (true, None),
                    PageType::Internal => {
                        let ip = InternalPage::<N>::new(&f.data);
                        (false, Some(ip.child_at(ip.child_index_for(key))))
                    }
                    PageType::Invalid => unreachable!("page tagged invalid mid-tree"),
                }
            };
            if is_leaf {
                break;
            }
            let mut child = self.fetch_pinned(child_id.unwrap())?;
            child.latch_exclusive();
            let child_safe = {
                let f = child.read();
                header_size(&f.data) < page::header_max_size(&f.data)
            };
            ctx.push(std::mem::replace(&mut current, child));
            if child_safe {
                ctx.release_ancestors();
            }
        }

        let leaf_id = current.page_id();
        let overflowed = {
            let mut f = current.write();
            let mut lp = LeafPageMut::<N>::new(&mut f.data);
            match lp.find(key) {
                Ok(_) => return Ok(false),
                Err(idx) => {
                    lp.insert_at(idx, key, value);
                    lp.size() > lp.max_size()
                }
            }
        };

        if !overflowed {
            return Ok(true);
        }

        tracing::debug!(page_id = ?leaf_id, "leaf overflowed, splitting");
        let (separator, sibling_id) = self.split_leaf(&mut current)?;
        drop(current);
        self.insert_into_parent(ctx, leaf_id, separator, sibling_id)?;
        Ok(true)
    }

    /// Remove `key`. Returns `false` if it was not present.
    pub fn remove(&self, key: GenericKey<N>) -> DbResult<bool> {
        if self.is_empty() {
            return Ok(false);
        }

        let root = *self.root_page_id.read();
        let mut ctx = Context::new();
        let mut current = self.fetch_pinned(root)?;
        current.latch_exclusive();

        loop {
            let (is_leaf, child_id) = {
                let f = current.read();
                match page_type(&f.data) {
                    PageType::Leaf => (true, None),
                    PageType::Internal => {
                        let ip = InternalPage::<N>::new(&f.data);
                        (false, Some(ip.child_at(ip.child_index_for(key))))
                    }
                    PageType::Invalid => unreachable!("page tagged invalid mid-tree"),
                }
            };
            if is_leaf {
                break;
            }
            let mut child = self.fetch_pinned(child_id.unwrap())?;
            child.latch_exclusive();
            let child_safe = {
                let f = child.read();
                let size = header_size(&f.data);
                let max_size = page::header_max_size(&f.data);
                match page_type(&f.data) {
                    PageType::Leaf => size > node::leaf_min_size(max_size),
                    PageType::Internal => size > node::internal_min_size(max_size),
                    PageType::Invalid => unreachable!(),
                }
            };
            ctx.push(std::mem::replace(&mut current, child));
            if child_safe {
                ctx.release_ancestors();
            }
        }

        let leaf_id = current.page_id();
        let (removed, new_first_key) = {
            let mut f = current.write();
            let mut lp = LeafPageMut::<N>::new(&mut f.data);
            match lp.find(key) {
                Err(_) => (false, None),
                Ok(idx) => {
                    let was_first = idx == 0;
                    lp.remove_at(idx);
                    let new_first = if was_first && lp.size() > 0 {
                        Some(lp.key_at(0))
                    } else {
                        None
                    };
                    (true, new_first)
                }
            }
        };

        if !removed {
            return Ok(false);
        }

        if let Some(new_key) = new_first_key {
            self.replace_separator(leaf_id, new_key)?;
        }

        if *self.root_page_id.read() == leaf_id {
            let size = {
                let f = current.read();
                LeafPage::<N>::new(&f.data).size()
            };
            if size == 0 {
                drop(current);
                self.delete_page(leaf_id)?;
                self.persist_root(PageId::INVALID)?;
            }
            return Ok(true);
        }

        let (size, max_size) = {
            let f = current.read();
            let lp = LeafPage::<N>::new(&f.data);
            (lp.size(), lp.max_size())
        };
        if size >= node::leaf_min_size(max_size) {
            return Ok(true);
        }

        let parent = ctx
            .pop()
            .expect("an underflowed non-root leaf always has a latched parent");
        self.rebalance_leaf(parent, current)?;
        Ok(true)
    }

    /// Ascending iterator starting at the first entry of the tree.
    pub fn begin(&self) -> DbResult<IndexIterator<N>> {
        let leaf = self.leftmost_leaf()?;
        Ok(IndexIterator::new(Arc::clone(&self.pool), leaf, 0))
    }

    /// Ascending iterator starting at the first entry `>= key`.
    pub fn begin_at(&self, key: GenericKey<N>) -> DbResult<IndexIterator<N>> {
        if self.is_empty() {
            return Ok(IndexIterator::at_end(Arc::clone(&self.pool)));
        }
        let leaf = self.descend_to_leaf_readonly(key)?;
        let index = {
            let f = leaf.read();
            LeafPage::<N>::new(&f.data).find(key).unwrap_or_else(|e| e)
        };
        Ok(IndexIterator::new(Arc::clone(&self.pool), Some(leaf), index))
    }

    /// The past-the-end iterator position.
    pub fn end(&self) -> IndexIterator<N> {
        IndexIterator::at_end(Arc::clone(&self.pool))
    }

    // ---- internal plumbing ----

    fn new_pinned(&self) -> DbResult<Pinned> {
        let guard = self
            .pool
            .new_page()?
            .ok_or_else(|| DbError::BufferPoolExhausted(format!("index {}", self.name)))?;
        Ok(Pinned::new(Arc::clone(&self.pool), guard))
    }

    fn fetch_pinned(&self, page_id: PageId) -> DbResult<Pinned> {
        let guard = self
            .pool
            .fetch_page(page_id)?
            .ok_or_else(|| DbError::BufferPoolExhausted(format!("index {} page {:?}", self.name, page_id)))?;
        Ok(Pinned::new(Arc::clone(&self.pool), guard))
    }

    fn delete_page(&self, page_id: PageId) -> DbResult<()> {
        self.pool.delete_page(page_id)?;
        Ok(())
    }

    fn set_parent_page_id(&self, child: PageId, parent: PageId) -> DbResult<()> {
        let mut pinned = self.fetch_pinned(child)?;
        let mut f = pinned.write();
        page::header_set_parent_page_id(&mut f.data, parent);
        Ok(())
    }

    fn persist_root(&self, root: PageId) -> DbResult<()> {
        *self.root_page_id.write() = root;
        let mut header = self.fetch_pinned(PageId(0))?;
        let mut f = header.write();
        header::upsert(&mut f.data, &self.name, root);
        Ok(())
    }

    fn insert_into_empty_tree(&self, key: GenericKey<N>, value: RecordId) -> DbResult<bool> {
        let mut leaf = self.new_pinned()?;
        let page_id = leaf.page_id();
        {
            let mut f = leaf.write();
            let mut lp = LeafPageMut::<N>::new(&mut f.data);
            lp.init(page_id, self.leaf_max_size);
            lp.insert_at(0, key, value);
        }
        drop(leaf);
        self.persist_root(page_id)?;
        Ok(true)
    }

    fn descend_to_leaf_readonly(&self, key: GenericKey<N>) -> DbResult<Pinned> {
        let root = *self.root_page_id.read();
        let mut current = self.fetch_pinned(root)?;
        current.latch_shared();
        loop {
            let child_id = {
                let f = current.read();
                match page_type(&f.data) {
                    PageType::Leaf => None,
                    PageType::Internal => {
                        let ip = InternalPage::<N>::new(&f.data);
                        Some(ip.child_at(ip.child_index_for(key)))
                    }
                    PageType::Invalid => unreachable!("page tagged invalid mid-tree"),
                }
            };
            match child_id {
                None => return Ok(current),
                Some(id) => {
                    let mut next = self.fetch_pinned(id)?;
                    next.latch_shared();
                    // Only now, with the child locked, release the parent —
                    // a concurrent split/merge splicing into the parent
                    // blocks on `next`'s latch, not a stale read of it.
                    current = next;
                }
            }
        }
    }

    fn leftmost_leaf(&self) -> DbResult<Option<Pinned>> {
        let root = *self.root_page_id.read();
        if !root.is_valid() {
            return Ok(None);
        }
        let mut current = self.fetch_pinned(root)?;
        current.latch_shared();
        loop {
            let child_id = {
                let f = current.read();
                match page_type(&f.data) {
                    PageType::Leaf => None,
                    PageType::Internal => Some(InternalPage::<N>::new(&f.data).child_at(0)),
                    PageType::Invalid => unreachable!("page tagged invalid mid-tree"),
                }
            };
            match child_id {
                None => return Ok(Some(current)),
                Some(id) => {
                    let mut next = self.fetch_pinned(id)?;
                    next.latch_shared();
                    current = next;
                }
            }
        }
    }

    fn split_leaf(&self, left: &mut Pinned) -> DbResult<(GenericKey<N>, PageId)> {
        let (size, old_next) = {
            let f = left.read();
            let lp = LeafPage::<N>::new(&f.data);
            (lp.size(), lp.next_page_id())
        };
        let mid = size / 2;
        let moved: Vec<(GenericKey<N>, RecordId)> = {
            let f = left.read();
            let lp = LeafPage::<N>::new(&f.data);
            (mid..size).map(|i| (lp.key_at(i), lp.value_at(i))).collect()
        };
        {
            let mut f = left.write();
            LeafPageMut::<N>::new(&mut f.data).set_size(mid);
        }

        let mut right = self.new_pinned()?;
        let right_id = right.page_id();
        {
            let mut f = right.write();
            let mut lp = LeafPageMut::<N>::new(&mut f.data);
            lp.init(right_id, self.leaf_max_size);
            lp.set_next_page_id(old_next);
            for (i, (k, v)) in moved.iter().enumerate() {
                lp.insert_at(i, *k, *v);
            }
        }
        {
            let mut f = left.write();
            LeafPageMut::<N>::new(&mut f.data).set_next_page_id(right_id);
        }

        let separator = moved[0].0;
        Ok((separator, right_id))
    }

    fn split_internal(&self, left: &mut Pinned) -> DbResult<(GenericKey<N>, PageId)> {
        let size = {
            let f = left.read();
            InternalPage::<N>::new(&f.data).size()
        };
        // `size` is always `max_size + 1` here (the caller only splits on
        // overflow). The key at `min_size + 1` is lifted to the parent,
        // per spec.md's internal-split rule, leaving `min_size + 1`
        // entries on the left sibling rather than `min_size`.
        let mid = node::internal_min_size(self.internal_max_size) + 1;
        let (median_key, moved): (GenericKey<N>, Vec<(GenericKey<N>, PageId)>) = {
            let f = left.read();
            let ip = InternalPage::<N>::new(&f.data);
            (
                ip.key_at(mid),
                (mid..size).map(|i| (ip.key_at(i), ip.child_at(i))).collect(),
            )
        };
        {
            let mut f = left.write();
            InternalPageMut::<N>::new(&mut f.data).set_size(mid);
        }

        let mut right = self.new_pinned()?;
        let right_id = right.page_id();
        {
            let mut f = right.write();
            let mut ip = InternalPageMut::<N>::new(&mut f.data);
            ip.init(right_id, self.internal_max_size);
            for (i, (key, child)) in moved.iter().enumerate() {
                let key = if i == 0 { GenericKey::ZERO } else { *key };
                ip.insert_at(i, key, *child);
            }
        }
        for (_, child) in &moved {
            self.set_parent_page_id(*child, right_id)?;
        }

        tracing::debug!(left = ?left.page_id(), right = ?right_id, "internal node split");
        Ok((median_key, right_id))
    }

    fn insert_into_parent(
        &self,
        mut ctx: Context,
        mut left_id: PageId,
        mut separator: GenericKey<N>,
        mut right_id: PageId,
    ) -> DbResult<()> {
        loop {
            let Some(mut parent) = ctx.pop() else {
                let mut new_root = self.new_pinned()?;
                let new_root_id = new_root.page_id();
                {
                    let mut f = new_root.write();
                    let mut ip = InternalPageMut::<N>::new(&mut f.data);
                    ip.init(new_root_id, self.internal_max_size);
                    ip.insert_at(0, GenericKey::ZERO, left_id);
                    ip.insert_at(1, separator, right_id);
                }
                drop(new_root);
                self.set_parent_page_id(left_id, new_root_id)?;
                self.set_parent_page_id(right_id, new_root_id)?;
                self.persist_root(new_root_id)?;
                tracing::debug!(root = ?new_root_id, "created new root after split");
                return Ok(());
            };

            let parent_id = parent.page_id();
            let overflowed = {
                let mut f = parent.write();
                let mut ip = InternalPageMut::<N>::new(&mut f.data);
                let idx = ip
                    .index_of_child(left_id)
                    .expect("left half of a split must already be a child of its parent");
                ip.insert_at(idx + 1, separator, right_id);
                ip.size() > ip.max_size()
            };
            self.set_parent_page_id(right_id, parent_id)?;

            if !overflowed {
                return Ok(());
            }

            let (median, new_right_id) = self.split_internal(&mut parent)?;
            left_id = parent_id;
            separator = median;
            right_id = new_right_id;
        }
    }

    fn replace_separator(&self, mut child: PageId, new_key: GenericKey<N>) -> DbResult<()> {
        loop {
            let parent_id = {
                let pinned = self.fetch_pinned(child)?;
                let f = pinned.read();
                header_parent_page_id(&f.data)
            };
            if !parent_id.is_valid() {
                return Ok(());
            }
            let mut parent = self.fetch_pinned(parent_id)?;
            parent.latch_exclusive();
            let idx = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).index_of_child(child)
            };
            let Some(idx) = idx else { return Ok(()) };
            if idx > 0 {
                let mut f = parent.write();
                InternalPageMut::<N>::new(&mut f.data).set_entry(idx, new_key, child);
                return Ok(());
            }
            child = parent_id;
        }
    }

    fn rebalance_leaf(&self, mut parent: Pinned, mut leaf: Pinned) -> DbResult<()> {
        let leaf_id = leaf.page_id();
        let idx = {
            let f = parent.read();
            InternalPage::<N>::new(&f.data)
                .index_of_child(leaf_id)
                .expect("leaf must be a child of its latched parent")
        };

        if idx > 0 {
            let left_id = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).child_at(idx - 1)
            };
            let mut left = self.fetch_pinned(left_id)?;
            left.latch_exclusive();
            let (left_size, left_max) = {
                let f = left.read();
                let lp = LeafPage::<N>::new(&f.data);
                (lp.size(), lp.max_size())
            };
            if left_size > node::leaf_min_size(left_max) {
                let (k, v) = {
                    let f = left.read();
                    let lp = LeafPage::<N>::new(&f.data);
                    (lp.key_at(left_size - 1), lp.value_at(left_size - 1))
                };
                {
                    let mut f = left.write();
                    LeafPageMut::<N>::new(&mut f.data).remove_at(left_size - 1);
                }
                {
                    let mut f = leaf.write();
                    LeafPageMut::<N>::new(&mut f.data).insert_at(0, k, v);
                }
                {
                    let mut f = parent.write();
                    InternalPageMut::<N>::new(&mut f.data).set_entry(idx, k, leaf_id);
                }
                return Ok(());
            }
        }

        let parent_size = {
            let f = parent.read();
            InternalPage::<N>::new(&f.data).size()
        };
        if idx + 1 < parent_size {
            let right_id = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).child_at(idx + 1)
            };
            let mut right = self.fetch_pinned(right_id)?;
            right.latch_exclusive();
            let (right_size, right_max) = {
                let f = right.read();
                let lp = LeafPage::<N>::new(&f.data);
                (lp.size(), lp.max_size())
            };
            if right_size > node::leaf_min_size(right_max) {
                let (k, v) = {
                    let f = right.read();
                    let lp = LeafPage::<N>::new(&f.data);
                    (lp.key_at(0), lp.value_at(0))
                };
                {
                    let mut f = right.write();
                    LeafPageMut::<N>::new(&mut f.data).remove_at(0);
                }
                {
                    let mut f = leaf.write();
                    let mut lp = LeafPageMut::<N>::new(&mut f.data);
                    let sz = lp.size();
                    lp.insert_at(sz, k, v);
                }
                let new_right_first = {
                    let f = right.read();
                    LeafPage::<N>::new(&f.data).key_at(0)
                };
                {
                    let mut f = parent.write();
                    InternalPageMut::<N>::new(&mut f.data).set_entry(idx + 1, new_right_first, right_id);
                }
                return Ok(());
            }
        }

        tracing::debug!(leaf = ?leaf_id, "merging underflowed leaf");
        if idx > 0 {
            let left_id = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).child_at(idx - 1)
            };
            let mut left = self.fetch_pinned(left_id)?;
            left.latch_exclusive();
            self.merge_leaves(&mut left, &leaf)?;
            {
                let mut f = parent.write();
                InternalPageMut::<N>::new(&mut f.data).remove_at(idx);
            }
            drop(leaf);
            self.delete_page(leaf_id)?;
        } else {
            let right_id = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).child_at(idx + 1)
            };
            let mut right = self.fetch_pinned(right_id)?;
            right.latch_exclusive();
            self.merge_leaves(&mut leaf, &right)?;
            {
                let mut f = parent.write();
                InternalPageMut::<N>::new(&mut f.data).remove_at(idx + 1);
            }
            drop(right);
            self.delete_page(right_id)?;
        }

        self.handle_internal_deficiency(parent)
    }

    fn merge_leaves(&self, left: &mut Pinned, right: &Pinned) -> DbResult<()> {
        let (entries, right_next) = {
            let f = right.read();
            let rp = LeafPage::<N>::new(&f.data);
            let entries: Vec<(GenericKey<N>, RecordId)> =
                (0..rp.size()).map(|i| (rp.key_at(i), rp.value_at(i))).collect();
            (entries, rp.next_page_id())
        };
        let mut f = left.write();
        let mut lp = LeafPageMut::<N>::new(&mut f.data);
        let mut size = lp.size();
        for (k, v) in entries {
            lp.insert_at(size, k, v);
            size += 1;
        }
        lp.set_next_page_id(right_next);
        Ok(())
    }

    fn handle_internal_deficiency(&self, mut node: Pinned) -> DbResult<()> {
        let node_id = node.page_id();

        if *self.root_page_id.read() == node_id {
            let size = {
                let f = node.read();
                InternalPage::<N>::new(&f.data).size()
            };
            if size == 1 {
                let only_child = {
                    let f = node.read();
                    InternalPage::<N>::new(&f.data).child_at(0)
                };
                drop(node);
                self.delete_page(node_id)?;
                self.set_parent_page_id(only_child, PageId::INVALID)?;
                self.persist_root(only_child)?;
                tracing::debug!(new_root = ?only_child, "root collapsed after merge");
            }
            return Ok(());
        }

        let (size, max_size) = {
            let f = node.read();
            let ip = InternalPage::<N>::new(&f.data);
            (ip.size(), ip.max_size())
        };
        if size >= node::internal_min_size(max_size) {
            return Ok(());
        }

        let parent_id = {
            let f = node.read();
            header_parent_page_id(&f.data)
        };
        let mut parent = self.fetch_pinned(parent_id)?;
        parent.latch_exclusive();
        let idx = {
            let f = parent.read();
            InternalPage::<N>::new(&f.data)
                .index_of_child(node_id)
                .expect("internal node must be a child of its own parent")
        };

        if idx > 0 {
            let left_id = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).child_at(idx - 1)
            };
            let mut left = self.fetch_pinned(left_id)?;
            left.latch_exclusive();
            let (left_size, left_max) = {
                let f = left.read();
                let ip = InternalPage::<N>::new(&f.data);
                (ip.size(), ip.max_size())
            };
            if left_size > node::internal_min_size(left_max) {
                self.borrow_internal_from_left(&mut parent, idx, &mut node, &mut left)?;
                return Ok(());
            }
        }

        let parent_size = {
            let f = parent.read();
            InternalPage::<N>::new(&f.data).size()
        };
        if idx + 1 < parent_size {
            let right_id = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).child_at(idx + 1)
            };
            let mut right = self.fetch_pinned(right_id)?;
            right.latch_exclusive();
            let (right_size, right_max) = {
                let f = right.read();
                let ip = InternalPage::<N>::new(&f.data);
                (ip.size(), ip.max_size())
            };
            if right_size > node::internal_min_size(right_max) {
                self.borrow_internal_from_right(&mut parent, idx, &mut node, &mut right)?;
                return Ok(());
            }
        }

        tracing::debug!(node = ?node_id, "merging underflowed internal node");
        if idx > 0 {
            let left_id = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).child_at(idx - 1)
            };
            let mut left = self.fetch_pinned(left_id)?;
            left.latch_exclusive();
            let separator = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).key_at(idx)
            };
            self.merge_internals(&mut left, &node, separator)?;
            {
                let mut f = parent.write();
                InternalPageMut::<N>::new(&mut f.data).remove_at(idx);
            }
            drop(node);
            self.delete_page(node_id)?;
        } else {
            let right_id = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).child_at(idx + 1)
            };
            let mut right = self.fetch_pinned(right_id)?;
            right.latch_exclusive();
            let separator = {
                let f = parent.read();
                InternalPage::<N>::new(&f.data).key_at(idx + 1)
            };
            self.merge_internals(&mut node, &right, separator)?;
            {
                let mut f = parent.write();
                InternalPageMut::<N>::new(&mut f.data).remove_at(idx + 1);
            }
            drop(right);
            self.delete_page(right_id)?;
        }

        self.handle_internal_deficiency(parent)
    }

    fn borrow_internal_from_left(
        &self,
        parent: &mut Pinned,
        idx: usize,
        node: &mut Pinned,
        left: &mut Pinned,
    ) -> DbResult<()> {
        let node_id = node.page_id();
        let left_size = {
            let f = left.read();
            InternalPage::<N>::new(&f.data).size()
        };
        let (borrowed_key, borrowed_child) = {
            let f = left.read();
            let ip = InternalPage::<N>::new(&f.data);
            (ip.key_at(left_size - 1), ip.child_at(left_size - 1))
        };
        {
            let mut f = left.write();
            InternalPageMut::<N>::new(&mut f.data).remove_at(left_size - 1);
        }

        let separator = {
            let f = parent.read();
            InternalPage::<N>::new(&f.data).key_at(idx)
        };
        let old_child0 = {
            let f = node.read();
            InternalPage::<N>::new(&f.data).child_at(0)
        };
        {
            let mut f = node.write();
            let mut ip = InternalPageMut::<N>::new(&mut f.data);
            ip.insert_at(0, GenericKey::ZERO, borrowed_child);
            ip.set_entry(1, separator, old_child0);
        }
        {
            let mut f = parent.write();
            InternalPageMut::<N>::new(&mut f.data).set_entry(idx, borrowed_key, node_id);
        }

        self.set_parent_page_id(borrowed_child, node_id)
    }

    fn borrow_internal_from_right(
        &self,
        parent: &mut Pinned,
        idx: usize,
        node: &mut Pinned,
        right: &mut Pinned,
    ) -> DbResult<()> {
        let node_id = node.page_id();
        let right_id = right.page_id();
        let (right_child0, new_sep) = {
            let f = right.read();
            let ip = InternalPage::<N>::new(&f.data);
            (ip.child_at(0), ip.key_at(1))
        };
        {
            let mut f = right.write();
            InternalPageMut::<N>::new(&mut f.data).remove_at(0);
            let child0_after = InternalPage::<N>::new(&f.data).child_at(0);
            InternalPageMut::<N>::new(&mut f.data).set_entry(0, GenericKey::ZERO, child0_after);
        }

        let separator = {
            let f = parent.read();
            InternalPage::<N>::new(&f.data).key_at(idx + 1)
        };
        let node_size = {
            let f = node.read();
            InternalPage::<N>::new(&f.data).size()
        };
        {
            let mut f = node.write();
            InternalPageMut::<N>::new(&mut f.data).insert_at(node_size, separator, right_child0);
        }
        {
            let mut f = parent.write();
            InternalPageMut::<N>::new(&mut f.data).set_entry(idx + 1, new_sep, right_id);
        }

        self.set_parent_page_id(right_child0, node_id)
    }

    fn merge_internals(&self, left: &mut Pinned, right: &Pinned, separator: GenericKey<N>) -> DbResult<()> {
        let entries: Vec<(GenericKey<N>, PageId)> = {
            let f = right.read();
            let ip = InternalPage::<N>::new(&f.data);
            (0..ip.size()).map(|i| (ip.key_at(i), ip.child_at(i))).collect()
        };
        let left_id = left.page_id();
        let mut size = {
            let f = left.read();
            InternalPage::<N>::new(&f.data).size()
        };
        {
            let mut f = left.write();
            let mut ip = InternalPageMut::<N>::new(&mut f.data);
            for (i, (key, child)) in entries.iter().enumerate() {
                let key = if i == 0 { separator } else { *key };
                ip.insert_at(size, key, *child);
                size += 1;
            }
        }
        for (_, child) in &entries {
            self.set_parent_page_id(*child, left_id)?;
        }
        Ok(())
    }
}
