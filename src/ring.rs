//! Fixed-capacity ring buffer with oldest-overwritten eviction.
//!
//! Backs the L-BFGS curvature history and Powell's direction set. Slots are
//! allocated once; pushing into a full buffer overwrites the oldest element.

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    cap: usize,
    // Index of the oldest element once the buffer is full.
    head: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            slots: Vec::with_capacity(cap),
            cap,
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }

    /// Appends `value`, returning the evicted oldest element when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.slots.len() < self.cap {
            self.slots.push(value);
            None
        } else {
            let old = std::mem::replace(&mut self.slots[self.head], value);
            self.head = (self.head + 1) % self.cap;
            Some(old)
        }
    }

    /// Element `i` counted from the oldest.
    pub fn get(&self, i: usize) -> Option<&T> {
        if i >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + i) % self.slots.len())
    }

    pub fn newest(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        (0..self.slots.len()).filter_map(move |i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;

    #[test]
    fn keeps_insertion_order_until_full() {
        let mut ring = RingBuffer::new(3);
        assert!(ring.is_empty());
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(ring.newest(), Some(&2));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut ring = RingBuffer::new(3);
        for v in 1..=3 {
            assert_eq!(ring.push(v), None);
        }
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.iter().rev().copied().collect::<Vec<_>>(), vec![5, 4, 3]);
        assert_eq!(ring.newest(), Some(&5));
    }

    #[test]
    fn zero_capacity_is_promoted_to_one() {
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push('a');
        assert_eq!(ring.push('b'), Some('a'));
    }

    #[test]
    fn clear_resets_the_head() {
        let mut ring = RingBuffer::new(2);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.clear();
        ring.push(7);
        assert_eq!(ring.get(0), Some(&7));
        assert_eq!(ring.get(1), None);
    }
}
