//! Bounded ranked collections
//!
//! Both the routing table and the inference ledger keep at most K items per
//! destination. [`BoundedRanked`] makes that limit structural: every
//! re-rank sorts and truncates, handing back whatever fell off the end.

use std::cmp::Ordering;

/// Small vector kept sorted by an external ranking and capped at `capacity`
#[derive(Debug, Clone)]
pub(crate) struct BoundedRanked<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> BoundedRanked<T> {
    /// Create an empty collection holding at most `capacity` items
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// First item matching `pred`
    pub(crate) fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| pred(*item))
    }

    /// Mutable access to the first item matching `pred`
    pub(crate) fn find_mut(&mut self, pred: impl Fn(&T) -> bool) -> Option<&mut T> {
        self.items.iter_mut().find(|item| pred(&**item))
    }

    /// Append an item; call [`rerank`](Self::rerank) afterwards
    pub(crate) fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Sort by `cmp` (best first) and drop everything past capacity
    ///
    /// Returns the evicted items, worst last.
    pub(crate) fn rerank(&mut self, cmp: impl FnMut(&T, &T) -> Ordering) -> Vec<T> {
        self.items.sort_by(cmp);
        if self.items.len() > self.capacity {
            self.items.split_off(self.capacity)
        } else {
            Vec::new()
        }
    }

    /// Remove and return every item matching `pred`
    pub(crate) fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if pred(&item) {
                removed.push(item);
            } else {
                kept.push(item);
            }
        }
        self.items = kept;
        removed
    }

    /// Items in rank order
    pub(crate) fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Mutable items in rank order
    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
