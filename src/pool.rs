//! Reusable buffers for bulk loads.
//!
//! A [`VecPool`] hands out empty vectors that keep the capacity they grew
//! to, so repeated `get_many` style calls stop reallocating. Buffers are
//! cleared on the way in and on the way out.

use parking_lot::Mutex;

/// Initial capacity of a freshly allocated buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;
/// Buffers retained when idle.
pub const DEFAULT_MAX_POOLED: usize = 64;

// == Vec Pool ==
/// Mutex-guarded stack of idle buffers.
pub struct VecPool<T> {
    buffers: Mutex<Vec<Vec<T>>>,
    buffer_capacity: usize,
    max_pooled: usize,
}

impl<T> Default for VecPool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_POOLED)
    }
}

impl<T> VecPool<T> {
    // == Constructor ==
    /// Creates an empty pool.
    ///
    /// # Arguments
    /// * `buffer_capacity` - Capacity of buffers allocated on an empty pool
    /// * `max_pooled` - Idle buffers kept; extra returns are dropped
    pub fn new(buffer_capacity: usize, max_pooled: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            buffer_capacity,
            max_pooled,
        }
    }

    // == Get ==
    /// Takes an empty buffer, reusing a returned one when available.
    pub fn get(&self) -> Vec<T> {
        match self.buffers.lock().pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::with_capacity(self.buffer_capacity),
        }
    }

    // == Put ==
    /// Returns a buffer. Its elements are dropped now; the buffer itself is
    /// dropped too if the pool is full.
    pub fn put(&self, mut buf: Vec<T>) {
        buf.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_pooled {
            buffers.push(buf);
        }
    }

    /// Number of idle buffers.
    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Returns true when no idle buffer is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
