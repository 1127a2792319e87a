//! Bounded FIFO of recent accepted hits.

use std::collections::VecDeque;

use card_types::Hit;

/// Most recent hits, newest last. Oldest entries are evicted first once
/// `capacity` is reached.
#[derive(Debug, Clone)]
pub struct HitHistory {
    capacity: usize,
    hits: VecDeque<Hit>,
}

impl HitHistory {
    /// Create a history holding at most `capacity` hits (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            hits: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, hit: Hit) {
        if self.hits.len() == self.capacity {
            self.hits.pop_front();
        }
        self.hits.push_back(hit);
    }

    /// The newest `n` hits in temporal order, or `None` if fewer are held.
    pub fn last(&self, n: usize) -> Option<impl Iterator<Item = &Hit>> {
        if n == 0 || n > self.hits.len() {
            return None;
        }
        Some(self.hits.iter().skip(self.hits.len() - n))
    }

    pub fn newest(&self) -> Option<&Hit> {
        self.hits.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter()
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
