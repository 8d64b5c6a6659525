use std::ops::Index;

/// A circular buffer that has a fixed capacity and current size.
/// Once full, new values overwrite the oldest ones.
pub struct CircularBucket<T> {
    data: Vec<T>,
    write_index: usize,
    length: usize,
}

#[allow(unused)]
impl<T> CircularBucket<T> {
    /// Resets to an empty buffer starting at the zero index
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.length = 0;
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn is_full(&self) -> bool {
        self.length == self.capacity()
    }

    fn start_index(&self) -> usize {
        let capacity = self.capacity();
        (self.write_index + capacity - self.length) % capacity
    }

    /// Returns iterator from the oldest to the newest value.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            data: &self.data,
            index: self.start_index(),
            remain_length: self.length,
        }
    }
}

impl<T: Default + Copy> CircularBucket<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Circular bucket must have a non-zero capacity");
        Self {
            data: vec![T::default(); capacity],
            write_index: 0,
            length: 0,
        }
    }

    /// Copies an entire array into the buffer, overwriting the oldest values once full.
    /// Returns the number of values that were overwritten.
    pub fn consume(&mut self, buf: &[T]) -> usize {
        let capacity = self.capacity();
        // Only the tail of an oversized array survives
        let skip = buf.len().saturating_sub(capacity);
        for x in &buf[skip..] {
            self.data[self.write_index] = *x;
            self.write_index = (self.write_index + 1) % capacity;
        }
        let total_overwritten = (self.length + buf.len()).saturating_sub(capacity);
        self.length = usize::min(capacity, self.length + buf.len());
        total_overwritten
    }
}

pub struct Iter<'a, T> {
    data: &'a [T],
    index: usize,
    remain_length: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;
    fn next(&mut self) -> Option<Self::Item> {
        if self.remain_length == 0 {
            return None;
        }

        let value = &self.data[self.index];
        self.index = (self.index + 1) % self.data.len();
        self.remain_length -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remain_length, Some(self.remain_length))
    }
}

impl<'a, T> ExactSizeIterator for Iter<'a, T> {}

/// Index 0 is the oldest value.
impl<T> Index<usize> for CircularBucket<T> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        assert!(index < self.length);
        let wrapped_index = (self.start_index() + index) % self.capacity();
        &self.data[wrapped_index]
    }
}
