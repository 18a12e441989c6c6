//! Bounded memory of already-answered statuses.
//!
//! A restart forgets this set on purpose; the idempotency key attached
//! to each post keeps a crash-loop from double-posting in the gap.

use std::collections::{HashSet, VecDeque};

/// Fixed-capacity set with FIFO eviction.
#[derive(Debug)]
pub struct RepliedCache {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl RepliedCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records an id, evicting the oldest entry when full. Returns
    /// `false` when the id was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.seen.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
