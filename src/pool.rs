//! Buffer pool for chunk read operations
//!
//! Pre-allocates a fixed number of chunk-sized buffers and recycles them
//! through a lock-free queue, avoiding a fresh allocation per chunk during
//! sustained transfers. If the pool is exhausted, `acquire` falls back to
//! allocating so reads never block on the pool.

use crossbeam_queue::ArrayQueue;
use std::sync::Arc;

/// A lock-free pool of pre-allocated chunk buffers
///
/// Cheap to clone; clones share the same underlying pool. All buffers have
/// the fixed size given at construction, which matches the uniform chunk
/// sizes produced by the adaptive sizer.
pub struct BufferPool {
    pool: Arc<ArrayQueue<Vec<u8>>>,
    buffer_size: usize,
}

impl BufferPool {
    /// Create a pool of `pool_size` buffers of `buffer_size` bytes each
    pub fn new(buffer_size: usize, pool_size: usize) -> Self {
        let pool = Arc::new(ArrayQueue::new(pool_size));
        for _ in 0..pool_size {
            // Push cannot fail while filling to capacity
            let _ = pool.push(vec![0u8; buffer_size]);
        }
        Self { pool, buffer_size }
    }

    /// Acquire a buffer, allocating a fresh one if the pool is empty
    pub fn acquire(&self) -> Vec<u8> {
        self.pool.pop().unwrap_or_else(|| vec![0u8; self.buffer_size])
    }

    /// Return a buffer to the pool for reuse
    ///
    /// The buffer is cleared and resized back to the pool's standard size.
    /// If the pool is already full the buffer is dropped.
    pub fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        buffer.resize(self.buffer_size, 0);
        let _ = self.pool.push(buffer);
    }

    /// Number of buffers currently available
    pub fn available(&self) -> usize {
        self.pool.len()
    }

    /// Fixed size of each buffer in the pool
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Maximum number of buffers the pool can hold
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            buffer_size: self.buffer_size,
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.buffer_size)
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release_roundtrip() {
        let pool = BufferPool::new(4096, 4);
        assert_eq!(pool.available(), 4);

        let buf = pool.acquire();
        assert_eq!(buf.len(), 4096);
        assert_eq!(pool.available(), 3);

        pool.release(buf);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_exhaustion_falls_back_to_allocation() {
        let pool = BufferPool::new(1024, 1);
        let _held = pool.acquire();
        assert_eq!(pool.available(), 0);

        let extra = pool.acquire();
        assert_eq!(extra.len(), 1024);
    }

    #[test]
    fn test_release_resizes_short_final_chunk() {
        let pool = BufferPool::new(1024, 2);
        let mut buf = pool.acquire();
        buf.truncate(100); // short final chunk
        pool.release(buf);

        let buf = pool.acquire();
        assert_eq!(buf.len(), 1024);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clone_shares_pool() {
        let a = BufferPool::new(512, 2);
        let b = a.clone();
        let _buf = a.acquire();
        assert_eq!(b.available(), 1);
    }
}
