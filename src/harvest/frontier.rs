//! Pending prefixes and the set of prefixes already dispatched.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet, VecDeque};

/// Heap key: shorter prefixes first, then lexicographic.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PrefixKey {
    len: usize,
    prefix: String,
}

impl PrefixKey {
    fn new(prefix: String) -> Self {
        Self {
            len: prefix.chars().count(),
            prefix,
        }
    }
}

impl Ord for PrefixKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len
            .cmp(&other.len)
            .then_with(|| self.prefix.cmp(&other.prefix))
    }
}

impl PartialOrd for PrefixKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-priority queue of prefixes still to query, plus the queried set.
///
/// A prefix lives in at most one of `pending` and `queried`. Retries bypass
/// that rule through a separate lane that is only drained once the main heap
/// is empty.
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<Reverse<PrefixKey>>,
    pending: HashSet<String>,
    queried: HashSet<String>,
    retry_lane: VecDeque<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prefix unless it was already queried or is already pending.
    pub fn push(&mut self, prefix: String) -> bool {
        if prefix.is_empty() || self.queried.contains(&prefix) || self.pending.contains(&prefix)
        {
            return false;
        }
        self.pending.insert(prefix.clone());
        self.heap.push(Reverse(PrefixKey::new(prefix)));
        true
    }

    /// Take the next prefix to dispatch and record it as queried.
    pub fn pop(&mut self) -> Option<String> {
        while let Some(Reverse(key)) = self.heap.pop() {
            self.pending.remove(&key.prefix);
            let fresh = self.queried.insert(key.prefix.clone());
            debug_assert!(fresh, "prefix {:?} was pending and queried", key.prefix);
            if fresh {
                return Some(key.prefix);
            }
        }
        self.retry_lane.pop_front()
    }

    /// Queue an already-dispatched prefix for one more attempt.
    pub fn requeue_retry(&mut self, prefix: String) {
        debug_assert!(self.queried.contains(&prefix));
        self.retry_lane.push_back(prefix);
    }

    pub fn is_queried(&self, prefix: &str) -> bool {
        self.queried.contains(prefix)
    }

    pub fn is_pending(&self, prefix: &str) -> bool {
        self.pending.contains(prefix)
    }

    /// Pending prefixes, including queued retries.
    pub fn len(&self) -> usize {
        self.heap.len() + self.retry_lane.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty() && self.retry_lane.is_empty()
    }

    pub fn queried_count(&self) -> usize {
        self.queried.len()
    }
}
