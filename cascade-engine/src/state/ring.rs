/// Fixed capacity ring buffer overwriting the oldest entry on overflow.
///
/// Storage is allocated once up front, so pushes never allocate or fail.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Index the next push writes to.
    head: usize,
    len: usize,
    /// Entries overwritten since construction.
    overwritten: u64,
}

impl<T: Copy> RingBuffer<T> {
    /// Create a ring holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            head: 0,
            len: 0,
            overwritten: 0,
        }
    }

    /// Push an entry, returning the overwritten oldest entry if the ring was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.slots[self.head].replace(item);
        self.head = (self.head + 1) % self.slots.len();

        if evicted.is_some() {
            self.overwritten += 1;
        } else {
            self.len += 1;
        }

        evicted
    }

    /// Get the configured capacity
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Get number of entries held
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get number of entries lost to overflow
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Get the most recently pushed entry
    pub fn latest(&self) -> Option<&T> {
        let capacity = self.slots.len();
        self.slots[(self.head + capacity - 1) % capacity].as_ref()
    }

    /// Iterate entries oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let capacity = self.slots.len();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |offset| self.slots[(start + offset) % capacity].as_ref())
    }

    /// Copy out the held entries oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_push() {
        struct TestCase {
            capacity: usize,
            pushes: u32,
            expected_len: usize,
            expected_items: Vec<u32>,
            expected_overwritten: u64,
        }

        let tests = vec![
            TestCase {
                // TC0: empty
                capacity: 3,
                pushes: 0,
                expected_len: 0,
                expected_items: vec![],
                expected_overwritten: 0,
            },
            TestCase {
                // TC1: partially filled
                capacity: 3,
                pushes: 2,
                expected_len: 2,
                expected_items: vec![0, 1],
                expected_overwritten: 0,
            },
            TestCase {
                // TC2: exactly full
                capacity: 3,
                pushes: 3,
                expected_len: 3,
                expected_items: vec![0, 1, 2],
                expected_overwritten: 0,
            },
            TestCase {
                // TC3: wrapped several times keeps the newest
                capacity: 3,
                pushes: 10,
                expected_len: 3,
                expected_items: vec![7, 8, 9],
                expected_overwritten: 7,
            },
            TestCase {
                // TC4: zero capacity is clamped to one
                capacity: 0,
                pushes: 4,
                expected_len: 1,
                expected_items: vec![3],
                expected_overwritten: 3,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut ring = RingBuffer::new(test.capacity);
            for item in 0..test.pushes {
                ring.push(item);
                assert!(ring.len() <= ring.capacity(), "TC{} failed", index);
            }

            assert_eq!(ring.len(), test.expected_len, "TC{} failed", index);
            assert_eq!(ring.to_vec(), test.expected_items, "TC{} failed", index);
            assert_eq!(ring.overwritten(), test.expected_overwritten, "TC{} failed", index);
            assert_eq!(
                ring.latest().copied(),
                test.expected_items.last().copied(),
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_ring_buffer_push_returns_evicted() {
        let mut ring = RingBuffer::new(2);
        assert_eq!(ring.push('a'), None);
        assert_eq!(ring.push('b'), None);
        assert_eq!(ring.push('c'), Some('a'));
        assert_eq!(ring.iter().rev().copied().collect::<Vec<_>>(), vec!['c', 'b']);
    }
}
