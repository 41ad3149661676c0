//! Fixed-capacity ring buffer used for pose windows and quality histories.

/// Index-rotated ring buffer.
///
/// Storage is allocated once; pushes grow the buffer until it reaches
/// capacity (warm-up), after which each push overwrites the oldest slot.
/// Logical index 0 is always the oldest sample.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    head: usize,
}

impl<T: Copy> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Append a sample, returning the evicted oldest one once full.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            return None;
        }
        let evicted = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    /// Sample at logical index `i` (0 = oldest).
    pub fn get(&self, i: usize) -> Option<&T> {
        if i >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + i) % self.slots.len())
    }

    /// Sample `i` steps back from the newest (0 = newest).
    pub fn get_back(&self, i: usize) -> Option<&T> {
        let len = self.slots.len();
        if i >= len {
            return None;
        }
        self.get(len - 1 - i)
    }

    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn newest(&self) -> Option<&T> {
        self.get_back(0)
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.slots.len()).filter_map(move |i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warm_up_grows_until_full() {
        let mut buf = RingBuffer::new(3);
        assert!(buf.is_empty());
        assert_eq!(buf.push(1), None);
        assert_eq!(buf.push(2), None);
        assert!(!buf.is_full());
        assert_eq!(buf.push(3), None);
        assert!(buf.is_full());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buf = RingBuffer::new(3);
        for v in 1..=3 {
            buf.push(v);
        }
        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.push(5), Some(2));
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(buf.oldest(), Some(&3));
        assert_eq!(buf.newest(), Some(&5));
        assert_eq!(buf.get_back(1), Some(&4));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_index_bounds() {
        let mut buf = RingBuffer::new(4);
        buf.push(10);
        buf.push(20);
        assert_eq!(buf.get(1), Some(&20));
        assert_eq!(buf.get(2), None);
        assert_eq!(buf.get_back(2), None);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut buf = RingBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push(1);
        assert_eq!(buf.push(2), Some(1));
        assert_eq!(buf.newest(), Some(&2));
    }
}
