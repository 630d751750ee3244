// Binary min-heap with decrease-key support, used by the A* open set.
//
// A plain `BinaryHeap` cannot update the priority of an element already in
// the queue, so A* over it accumulates stale duplicates. This queue pairs
// the heap vector with a value → heap-index table: `insert` on a value that
// is already queued first removes the old entry (swap with the last slot,
// then sift the replacement up or down depending on how its priority
// compares to the removed one), so each value appears at most once.
//
// The index table is used only for point lookups, never iterated, so a
// `HashMap` does not threaten determinism.
//
// See also: `pathfinding.rs`, the sole consumer.

use std::collections::HashMap;
use std::hash::Hash;

struct HeapEntry<V, P> {
    value: V,
    priority: P,
}

/// Min-heap keyed by `P` where re-inserting a queued value replaces its
/// priority. Pop order for equal priorities follows the heap's internal
/// layout, so callers that need total determinism must encode their own
/// tie-break into `P`.
pub struct PriorityQueueWithRemove<V, P> {
    heap: Vec<HeapEntry<V, P>>,
    index: HashMap<V, usize>,
}

impl<V, P> PriorityQueueWithRemove<V, P>
where
    V: Clone + Eq + Hash,
    P: PartialOrd + Copy,
{
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn contains(&self, v: &V) -> bool {
        self.index.contains_key(v)
    }

    /// Queue `v` at priority `p`, evicting any earlier entry for `v`.
    pub fn insert(&mut self, v: V, p: P) {
        self.remove(&v);
        self.heap.push(HeapEntry {
            value: v.clone(),
            priority: p,
        });
        self.index.insert(v, self.heap.len() - 1);
        self.sift_up(self.heap.len() - 1);
        debug_assert_eq!(self.index.len(), self.heap.len());
    }

    /// Remove `v` from the queue if present.
    pub fn remove(&mut self, v: &V) {
        let Some(&i) = self.index.get(v) else {
            return;
        };
        let removed_priority = self.heap[i].priority;
        let last = self.heap.len() - 1;
        self.heap.swap(i, last);
        self.heap.pop();
        self.index.remove(v);

        if i < self.heap.len() {
            self.index.insert(self.heap[i].value.clone(), i);
            // The replacement came from the bottom of the heap; which way it
            // must sift depends on how it compares to what was removed.
            if removed_priority < self.heap[i].priority {
                self.sift_down(i);
            } else {
                self.sift_up(i);
            }
        }
        debug_assert_eq!(self.index.len(), self.heap.len());
    }

    /// Remove and return the minimum-priority entry.
    pub fn pop(&mut self) -> Option<(V, P)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let entry = self.heap.pop().expect("heap is non-empty");
        self.index.remove(&entry.value);
        if !self.heap.is_empty() {
            self.index.insert(self.heap[0].value.clone(), 0);
            self.sift_down(0);
        }
        debug_assert_eq!(self.index.len(), self.heap.len());
        Some((entry.value, entry.priority))
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.heap[a].priority < self.heap[b].priority
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap_entries(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let l = 2 * i + 1;
            let r = 2 * i + 2;
            if l >= self.heap.len() {
                break;
            }
            let child = if r < self.heap.len() && self.less(r, l) {
                r
            } else {
                l
            };
            if !self.less(child, i) {
                break;
            }
            self.swap_entries(i, child);
            i = child;
        }
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        self.index.insert(self.heap[a].value.clone(), b);
        self.index.insert(self.heap[b].value.clone(), a);
        self.heap.swap(a, b);
    }
}

impl<V, P> Default for PriorityQueueWithRemove<V, P>
where
    V: Clone + Eq + Hash,
    P: PartialOrd + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}
