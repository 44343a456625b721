//! Fixed-capacity circular (ring) buffer for audio samples.
//!
//! When the buffer is full, new samples **overwrite** the oldest data so that
//! the most-recent `capacity` samples are always available.  The listening
//! engine keeps the last minute of idle audio here so that, when the wake
//! word fires, there is enough ambient context to estimate the noise floor.
//!
//! # Example
//!
//! ```rust
//! use ami_runtime::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1_i16, 2, 3, 4, 5]); // 5 items → capacity 4 → oldest dropped
//! assert_eq!(buf.to_vec(), vec![2, 3, 4, 5]);
//! ```

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular buffer.
///
/// ## Overflow behaviour
///
/// When [`push_slice`](Self::push_slice) would exceed `capacity`, the oldest
/// samples are silently overwritten.  The buffer never allocates beyond its
/// initial capacity.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    /// Append `data` to the buffer, overwriting the oldest samples once full.
    pub fn push_slice(&mut self, data: &[T]) {
        // Only the tail can survive when `data` alone overflows the buffer.
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };
        for &item in data {
            self.buf[self.write_pos] = item;
            self.write_pos = (self.write_pos + 1) % self.capacity;
            if self.len < self.capacity {
                self.len += 1;
            }
        }
    }

    /// Iterate the stored samples oldest-first without consuming them.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        // Before the first overflow valid data starts at 0; afterwards the
        // oldest sample sits where the next write would go.
        let read_pos = if self.len < self.capacity {
            0
        } else {
            self.write_pos
        };
        (0..self.len).map(move |i| self.buf[(read_pos + i) % self.capacity])
    }

    /// Copy the stored samples out in chronological order.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Discard all samples and reset the write position.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    /// Number of valid samples currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` once the oldest sample is being overwritten.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Stored duration in seconds, assuming `sample_rate` Hz mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.len as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_within_capacity_keeps_order() {
        let mut buf = RingBuffer::new(8);
        buf.push_slice(&[1_i16, 2, 3]);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_full());
        assert_eq!(buf.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn overflow_by_one_drops_oldest() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1_i16, 2, 3, 4, 5]);
        assert_eq!(buf.len(), 4);
        assert!(buf.is_full());
        assert_eq!(buf.to_vec(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn overflow_across_separate_pushes() {
        let mut buf = RingBuffer::new(3);
        buf.push_slice(&[1_i16, 2, 3]);
        buf.push_slice(&[4, 5]);
        assert_eq!(buf.to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn single_push_larger_than_capacity_keeps_tail() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&(1_i16..=10).collect::<Vec<_>>());
        assert_eq!(buf.to_vec(), vec![7, 8, 9, 10]);
    }

    #[test]
    fn iter_does_not_consume() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[7_i16, 8]);
        let first: Vec<_> = buf.iter().collect();
        let second: Vec<_> = buf.iter().collect();
        assert_eq!(first, second);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn clear_resets_state() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1_i16, 2, 3, 4, 5]);
        buf.clear();
        assert!(buf.is_empty());

        buf.push_slice(&[9_i16]);
        assert_eq!(buf.to_vec(), vec![9]);
    }

    #[test]
    fn duration_secs_calculation() {
        let mut buf = RingBuffer::new(16_000);
        buf.push_slice(&vec![0_i16; 8_000]);
        assert_eq!(buf.capacity(), 16_000);
        assert!((buf.duration_secs(16_000) - 0.5).abs() < 1e-6);
        assert_eq!(buf.duration_secs(0), 0.0);
    }

    #[test]
    #[should_panic(expected = "RingBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _buf: RingBuffer<i16> = RingBuffer::new(0);
    }
}
