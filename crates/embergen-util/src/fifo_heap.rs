use std::collections::BTreeSet;

/// A min-heap that preserves insertion order among equal elements.
#[derive(Clone, Debug)]
pub struct FifoHeap<T> {
    seq: usize,
    heap: BTreeSet<(T, usize)>,
}

impl<T: Ord> Default for FifoHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> FifoHeap<T> {
    pub fn new() -> Self {
        FifoHeap {
            seq: usize::MIN,
            heap: BTreeSet::new(),
        }
    }

    pub fn push(&mut self, val: T) {
        let seq = self.seq.checked_add(1).unwrap();
        self.seq = seq;
        self.heap.insert((val, seq));
    }

    /// Removes and returns the smallest element. Elements that compare equal
    /// come out in the order they went in.
    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop_first().map(|(val, _)| val)
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.first().map(|(val, _)| val)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.heap.iter().map(|(val, _)| val)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<T: Ord> FromIterator<T> for FifoHeap<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut ret = FifoHeap::new();
        for i in iter {
            ret.push(i);
        }
        ret
    }
}

#[cfg(test)]
mod test {
    use super::FifoHeap;
    use std::cmp::Ordering;

    #[derive(Debug)]
    struct Item(i32, &'static str);

    impl PartialEq for Item {
        fn eq(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }

    impl Eq for Item {}

    impl PartialOrd for Item {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Item {
        fn cmp(&self, other: &Self) -> Ordering {
            self.0.cmp(&other.0)
        }
    }

    #[test]
    fn pops_in_priority_order() {
        let mut heap: FifoHeap<i32> = [3, 1, 2].into_iter().collect();
        assert_eq!(heap.pop(), Some(1));
        assert_eq!(heap.pop(), Some(2));
        assert_eq!(heap.pop(), Some(3));
        assert_eq!(heap.pop(), None);
    }

    #[test]
    fn equal_elements_keep_insertion_order() {
        let mut heap = FifoHeap::new();
        heap.push(Item(1, "first"));
        heap.push(Item(1, "second"));
        heap.push(Item(0, "third"));

        assert_eq!(heap.pop().unwrap().1, "third");
        assert_eq!(heap.pop().unwrap().1, "first");
        assert_eq!(heap.pop().unwrap().1, "second");
    }

    #[test]
    fn interleaved_push_pop() {
        let mut heap = FifoHeap::new();
        heap.push(5);
        heap.push(1);
        assert_eq!(heap.pop(), Some(1));
        heap.push(3);
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.peek(), Some(&3));
        assert_eq!(heap.pop(), Some(3));
        assert_eq!(heap.pop(), Some(5));
        assert!(heap.is_empty());
    }
}
