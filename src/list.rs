//! Index-addressed circular list over a fixed arena of slots.
//!
//! The list is a single contiguous `Vec` of `capacity + 1` nodes. Node `0` is
//! a sentinel that never holds cache data; its `next` is the front (most
//! recently used) and its `prev` is the back (least recently used). Links are
//! plain array offsets, so relocating a node is integer surgery with no
//! allocation and no raw pointers.
//!
//! ```text
//!        ┌──────────────────────────────────────────────────┐
//!        ▼                                                  │
//!   [0: sentinel] ──▶ [1] ──▶ [2] ──▶ ... ──▶ [capacity] ───┘
//!     next = front                            prev(0) = back
//! ```
//!
//! The list is always full: every slot is linked into the ring from
//! construction on. Whether a slot holds a live entry is a property of the
//! slot itself, not of its list membership.

use crate::entry::Slot;
use core::fmt;
use core::num::NonZeroUsize;

/// Offset of the sentinel node.
pub(crate) const SENTINEL: usize = 0;

struct Node<K, V> {
    slot: Slot<K, V>,
    prev: usize,
    next: usize,
}

/// A fixed-capacity circular doubly linked list addressed by slot index.
pub(crate) struct ArenaList<K, V> {
    nodes: Vec<Node<K, V>>,
}

impl<K, V> ArenaList<K, V> {
    /// Creates a list with `cap` empty slots linked in index order.
    ///
    /// Slot `1` starts at the front and slot `cap` at the back, so the first
    /// slots handed out for reuse are the highest-numbered ones.
    pub(crate) fn new(cap: NonZeroUsize) -> Self {
        let last = cap.get();
        let nodes = (0..=last)
            .map(|i| Node {
                slot: Slot::empty(i),
                prev: if i == SENTINEL { last } else { i - 1 },
                next: if i == last { SENTINEL } else { i + 1 },
            })
            .collect();
        ArenaList { nodes }
    }

    /// Number of data slots (the sentinel is not counted).
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Index of the most recently used slot.
    #[inline]
    pub(crate) fn front(&self) -> usize {
        self.nodes[SENTINEL].next
    }

    /// Index of the least recently used slot.
    #[inline]
    pub(crate) fn back(&self) -> usize {
        self.nodes[SENTINEL].prev
    }

    #[inline]
    pub(crate) fn entry(&self, idx: usize) -> &Slot<K, V> {
        debug_assert_eq!(self.nodes[idx].slot.index(), idx);
        &self.nodes[idx].slot
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, idx: usize) -> &mut Slot<K, V> {
        &mut self.nodes[idx].slot
    }

    /// Unlinks a node and leaves it pointing at itself.
    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[idx].prev = idx;
        self.nodes[idx].next = idx;
    }

    /// Links a detached node right after the sentinel.
    pub(crate) fn push_front(&mut self, idx: usize) {
        let first = self.nodes[SENTINEL].next;
        self.nodes[idx].prev = SENTINEL;
        self.nodes[idx].next = first;
        self.nodes[first].prev = idx;
        self.nodes[SENTINEL].next = idx;
    }

    /// Links a detached node right before the sentinel.
    pub(crate) fn push_back(&mut self, idx: usize) {
        let last = self.nodes[SENTINEL].prev;
        self.nodes[idx].next = SENTINEL;
        self.nodes[idx].prev = last;
        self.nodes[last].next = idx;
        self.nodes[SENTINEL].prev = idx;
    }

    /// Makes `idx` the most recently used slot.
    pub(crate) fn move_to_front(&mut self, idx: usize) {
        debug_assert!(idx != SENTINEL && idx < self.nodes.len());
        if self.nodes[SENTINEL].next == idx {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    /// Makes `idx` the least recently used slot, i.e. the next one reused.
    pub(crate) fn move_to_back(&mut self, idx: usize) {
        debug_assert!(idx != SENTINEL && idx < self.nodes.len());
        if self.nodes[SENTINEL].prev == idx {
            return;
        }
        self.detach(idx);
        self.push_back(idx);
    }

    /// Empties every slot in place. Link order is left as is.
    pub(crate) fn reset_all(&mut self) {
        for node in self.nodes.iter_mut().skip(1) {
            node.slot.reset();
        }
    }

    /// Slot indices from front (MRU) to back (LRU).
    #[cfg(test)]
    pub(crate) fn order(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.capacity());
        let mut idx = self.front();
        while idx != SENTINEL {
            out.push(idx);
            idx = self.nodes[idx].next;
        }
        out
    }
}

impl<K, V> fmt::Debug for ArenaList<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaList")
            .field("capacity", &self.capacity())
            .field("front", &self.front())
            .field("back", &self.back())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(cap: usize) -> ArenaList<u32, u32> {
        ArenaList::new(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn test_construct_in_index_order() {
        let list = list(4);
        assert_eq!(list.capacity(), 4);
        assert_eq!(list.order(), vec![1, 2, 3, 4]);
        assert_eq!(list.front(), 1);
        assert_eq!(list.back(), 4);
        assert!((1..=4).all(|i| list.entry(i).is_empty()));
    }

    #[test]
    fn test_single_slot_list() {
        let mut list = list(1);
        assert_eq!(list.front(), 1);
        assert_eq!(list.back(), 1);
        list.move_to_front(1);
        list.move_to_back(1);
        assert_eq!(list.order(), vec![1]);
    }

    #[test]
    fn test_move_to_front() {
        let mut list = list(3);
        list.move_to_front(3);
        assert_eq!(list.order(), vec![3, 1, 2]);
        list.move_to_front(2);
        assert_eq!(list.order(), vec![2, 3, 1]);
        // Already at the front
        list.move_to_front(2);
        assert_eq!(list.order(), vec![2, 3, 1]);
        assert_eq!(list.back(), 1);
    }

    #[test]
    fn test_move_to_back() {
        let mut list = list(3);
        list.move_to_back(1);
        assert_eq!(list.order(), vec![2, 3, 1]);
        list.move_to_back(3);
        assert_eq!(list.order(), vec![2, 1, 3]);
        list.move_to_back(3);
        assert_eq!(list.order(), vec![2, 1, 3]);
        assert_eq!(list.front(), 2);
    }

    #[test]
    fn test_push_after_detach() {
        let mut list = list(3);
        list.detach(2);
        assert_eq!(list.order(), vec![1, 3]);
        list.push_back(2);
        assert_eq!(list.order(), vec![1, 3, 2]);
        list.detach(1);
        list.push_front(1);
        assert_eq!(list.order(), vec![1, 3, 2]);
    }

    #[test]
    fn test_ring_stays_consistent() {
        let mut list = list(8);
        for i in [5, 2, 8, 1, 5, 7, 3] {
            list.move_to_front(i);
        }
        for i in [4, 6] {
            list.move_to_back(i);
        }

        let order = list.order();
        assert_eq!(order.len(), 8);
        assert_eq!(&order[..3], &[3, 7, 5]);
        assert_eq!(&order[6..], &[4, 6]);

        // prev links mirror next links all the way round
        let mut idx = list.back();
        let mut reversed = Vec::new();
        while idx != SENTINEL {
            reversed.push(idx);
            idx = list.nodes[idx].prev;
        }
        reversed.reverse();
        assert_eq!(reversed, order);
    }

    #[test]
    fn test_entries_survive_relocation() {
        let mut list = list(3);
        list.entry_mut(2).fill(20, 200, None);
        list.move_to_front(2);
        list.move_to_back(2);
        assert_eq!(list.entry(2).key(), Some(&20));
        assert_eq!(list.entry(2).value(), Some(&200));

        list.reset_all();
        assert!(list.entry(2).is_empty());
        assert_eq!(list.back(), 2);
    }
}
