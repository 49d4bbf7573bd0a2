//! Bounded in-memory run buffer.
//!
//! A [`RunBuffer`] owns the storage a sorter fills with one bounded run.
//! Its capacity is fixed by an explicit [`allocate`](RunBuffer::allocate)
//! call driven by an external memory-budget decision; the buffer never grows
//! during a sort. The same buffer is reused across repeated sort calls and
//! released with [`deallocate`](RunBuffer::deallocate) once the caller is
//! done with it.

/// Fixed-capacity item buffer reused across sort calls.
pub struct RunBuffer<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> RunBuffer<T> {
    /// Creates an unallocated buffer with capacity 0.
    pub fn new() -> Self {
        RunBuffer {
            items: Vec::new(),
            capacity: 0,
        }
    }

    /// Ensures storage for exactly `item_count` items.
    pub fn allocate(&mut self, item_count: usize) {
        self.capacity = item_count;
        self.items = Vec::with_capacity(item_count);
    }

    /// Releases the storage. The capacity becomes 0.
    pub fn deallocate(&mut self) {
        self.capacity = 0;
        self.items = Vec::new();
    }

    /// Allocated capacity in items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if [`allocate`](RunBuffer::allocate) has been called.
    pub fn is_allocated(&self) -> bool {
        self.capacity > 0
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn push(&mut self, item: T) {
        debug_assert!(self.items.len() < self.capacity);
        self.items.push(item);
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<T> Default for RunBuffer<T> {
    fn default() -> Self {
        RunBuffer::new()
    }
}

/// Number of items that fit in `budget` bytes given the per-item cost and the
/// fixed overhead, or 0 if the budget cannot cover the overhead and at least
/// one item.
pub(crate) fn max_item_count(budget: usize, per_item: usize, overhead: usize) -> usize {
    let available = match budget.checked_sub(overhead) {
        Some(available) => available,
        None => return 0,
    };
    if available < per_item {
        return 0;
    }
    return available / per_item;
}

#[cfg(test)]
mod test {
    use super::{max_item_count, RunBuffer};

    #[test]
    fn test_allocate_and_deallocate() {
        let mut buffer: RunBuffer<i32> = RunBuffer::new();
        assert!(!buffer.is_allocated());

        buffer.allocate(8);
        assert!(buffer.is_allocated());
        assert_eq!(buffer.capacity(), 8);

        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.as_slice(), &[1, 2]);

        buffer.clear();
        assert_eq!(buffer.capacity(), 8);
        assert!(buffer.as_slice().is_empty());

        buffer.deallocate();
        assert!(!buffer.is_allocated());
        assert_eq!(buffer.capacity(), 0);
    }

    #[test]
    fn test_max_item_count() {
        assert_eq!(max_item_count(100, 10, 0), 10);
        assert_eq!(max_item_count(105, 10, 0), 10);
        assert_eq!(max_item_count(100, 10, 25), 7);
        // budget below the fixed overhead
        assert_eq!(max_item_count(20, 10, 25), 0);
        // budget below a single item
        assert_eq!(max_item_count(9, 10, 0), 0);
    }
}
