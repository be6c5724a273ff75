use std::collections::VecDeque;

/// FIFO log with a hard cap. Once the cap is exceeded the oldest entries are
/// dropped in one step so only the newest `keep` remain.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    cap: usize,
    keep: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(cap: usize, keep: usize) -> Self {
        let cap = cap.max(1);
        let keep = keep.clamp(1, cap);
        Self {
            items: VecDeque::with_capacity(cap.min(1024) + 1),
            cap,
            keep,
        }
    }

    /// Returns how many entries were evicted.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        if self.items.len() > self.cap {
            let excess = self.items.len() - self.keep;
            self.items.drain(..excess);
            return excess;
        }
        0
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.items.back_mut()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip)
    }

    pub fn retain<F: FnMut(&T) -> bool>(&mut self, f: F) -> usize {
        let before = self.items.len();
        self.items.retain(f);
        before - self.items.len()
    }

    /// Drops the oldest entries until at most `max` remain.
    pub fn truncate_front(&mut self, max: usize) -> usize {
        let excess = self.items.len().saturating_sub(max);
        self.items.drain(..excess);
        excess
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> BoundedHistory<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn recent_vec(&self, n: usize) -> Vec<T> {
        self.recent(n).cloned().collect()
    }
}
