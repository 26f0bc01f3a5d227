//! Crabbing bookkeeping: the queue of ancestor pages a descent is
//! still holding latched, released as soon as a safer descendant is
//! reached.
//!
//! This is the per-transaction queue that tracks pages to be unlatched
//! at commit/abort of the logical operation. This crate has no
//! transaction manager of its own — `Transaction` is threaded through
//! opaquely by callers — so the queue lives here, scoped to one tree
//! operation instead of one transaction. Every [`crate::pin::Pinned`]
//! pushed here is expected to already be holding a real latch (via
//! `latch_shared`/`latch_exclusive`, not just the eviction pin), so
//! that a concurrent descent actually blocks on it instead of racing
//! past; `release_ancestors`/drop let each `Pinned` unlatch itself.

use crate::pin::Pinned;

/// Ancestor pages held from the root down to (but not including) the
/// node currently being examined, in descent order.
#[derive(Default)]
pub struct Context {
    held: Vec<Pinned>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch one more level down.
    pub fn push(&mut self, page: Pinned) {
        self.held.push(page);
    }

    /// Release every ancestor latch held so far — the child just
    /// reached is "safe" (an internal with room to absorb a split, or
    /// a node with size above its minimum for deletes), so nothing
    /// above it can still be touched by this operation.
    pub fn release_ancestors(&mut self) {
        self.held.clear();
    }

    /// Ancestors still held, nearest-parent-last.
    pub fn ancestors(&self) -> &[Pinned] {
        &self.held
    }

    /// Take back the nearest still-held ancestor (the immediate parent
    /// of the node currently being examined), for the upward pass of an
    /// insert split or delete rebalance.
    pub fn pop(&mut self) -> Option<Pinned> {
        self.held.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}
