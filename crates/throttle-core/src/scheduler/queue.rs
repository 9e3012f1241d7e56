//! Priority queue of pending tasks.
//!
//! Higher priority pops first; within one priority, lower sequence number
//! (earlier insertion) pops first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Entry<I> {
    priority: i32,
    seq: u64,
    item: I,
}

impl<I> PartialEq for Entry<I> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<I> Eq for Entry<I> {}

impl<I> PartialOrd for Entry<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I> Ord for Entry<I> {
    // BinaryHeap is a max-heap: larger priority wins, then smaller seq.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority-ordered, insertion-stable queue.
pub struct TaskQueue<I> {
    heap: BinaryHeap<Entry<I>>,
    next_seq: u64,
}

impl<I> Default for TaskQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> TaskQueue<I> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert a new item; returns the sequence number it was assigned.
    pub fn push(&mut self, priority: i32, item: I) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            priority,
            seq,
            item,
        });
        seq
    }

    /// Re-insert an item under a sequence number it was assigned earlier, so
    /// it keeps its place relative to items pushed after it.
    pub fn push_with_seq(&mut self, priority: i32, seq: u64, item: I) {
        self.heap.push(Entry {
            priority,
            seq,
            item,
        });
    }

    /// Remove the highest-priority, earliest-inserted item.
    pub fn pop(&mut self) -> Option<(i32, u64, I)> {
        self.heap.pop().map(|e| (e.priority, e.seq, e.item))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every item, in dispatch order.
    pub fn drain(&mut self) -> Vec<I> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some((_, _, item)) = self.pop() {
            items.push(item);
        }
        items
    }
}
