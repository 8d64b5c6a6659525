use std::ops::Index;
use std::slice::SliceIndex;

/// A linear buffer that has a fixed capacity and a current size.
/// Values past the capacity are not accepted until it is reset.
pub struct LinearBucket<T> {
    data: Vec<T>,
    length: usize,
}

#[allow(unused)]
impl<T> LinearBucket<T> {
    /// Resets it to being empty
    pub fn reset(&mut self) {
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

    /// Returns immutable slice to valid data.
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.length]
    }
}

impl<T: Default + Copy> LinearBucket<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity],
            length: 0,
        }
    }

    /// Appends a single value if there is space. Returns whether it was stored.
    #[inline(always)]
    pub fn push(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.data[self.length] = value;
        self.length += 1;
        true
    }

    /// Copies a array until the capacity has been reached.
    /// Returns the number of samples read from the array.
    pub fn consume(&mut self, buf: &[T]) -> usize {
        let remain = self.capacity() - self.length;
        let total_read = buf.len().min(remain);
        self.data[self.length..self.length+total_read].copy_from_slice(&buf[..total_read]);
        self.length += total_read;
        total_read
    }
}

impl<T, U> Index<U> for LinearBucket<T> 
where U: SliceIndex<[T]> 
{
    type Output = U::Output;
    fn index(&self, index: U) -> &Self::Output {
        &self.as_slice()[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_capacity() {
        let mut bucket = LinearBucket::<i16>::new(4);
        assert_eq!(bucket.consume(&[1, 2, 3]), 3);
        assert!(bucket.push(4));
        assert!(!bucket.push(5));
        assert_eq!(bucket.consume(&[6]), 0);
        assert!(bucket.is_full());
        assert_eq!(&bucket[..], &[1, 2, 3, 4]);

        bucket.reset();
        assert_eq!(bucket.length(), 0);
        assert_eq!(bucket.as_slice(), &[] as &[i16]);
    }
}
