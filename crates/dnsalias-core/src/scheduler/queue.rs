//! Ready queue ordered by due time
//!
//! Binary min-heap keyed by `(due, sequence)`. Entries are never removed
//! from the middle; stale ones are dropped by the dispatcher when they
//! reach the head.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tokio::time::Instant;

struct Slot<T> {
    due: Instant,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

pub(crate) struct ReadyQueue<T> {
    heap: BinaryHeap<Reverse<Slot<T>>>,
    next_seq: u64,
}

impl<T> ReadyQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert an item; returns `true` if it became the head
    pub(crate) fn push(&mut self, due: Instant, item: T) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Slot { due, seq, item }));

        matches!(self.heap.peek(), Some(Reverse(head)) if head.seq == seq)
    }

    pub(crate) fn peek_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(slot)| slot.due)
    }

    pub(crate) fn pop(&mut self) -> Option<(Instant, T)> {
        self.heap.pop().map(|Reverse(slot)| (slot.due, slot.item))
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}
