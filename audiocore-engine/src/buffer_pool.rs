//! Fixed-size scratch buffer pool.
//!
//! The mixer pump rents a buffer per source per period and returns it
//! immediately after accumulating into the master bus, so steady-state
//! operation never calls the allocator. Renting past `max_pool_size` still
//! succeeds (it just allocates), matching the pool's task: bound allocation
//! in the common case without ever blocking or failing the caller.

use parking_lot::Mutex;
use std::sync::Arc;

/// A pool of `Vec<f32>` scratch buffers, all of a single fixed length.
pub struct BufferPool {
    buffer_len: usize,
    max_pool_size: usize,
    free: Mutex<Vec<Vec<f32>>>,
}

/// A rented buffer. Returned to its pool automatically on drop.
pub struct PooledBuffer {
    buf: Vec<f32>,
    pool: Arc<BufferPool>,
}

impl BufferPool {
    pub fn new(buffer_len: usize, max_pool_size: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_len,
            max_pool_size,
            free: Mutex::new(Vec::with_capacity(max_pool_size)),
        })
    }

    /// Rent a zero-filled buffer of `buffer_len` samples. Reuses a returned
    /// buffer if one is free; otherwise allocates a new one.
    pub fn rent(self: &Arc<Self>) -> PooledBuffer {
        let mut buf = {
            let mut free = self.free.lock();
            free.pop().unwrap_or_else(|| vec![0.0; self.buffer_len])
        };
        buf.iter_mut().for_each(|s| *s = 0.0);
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    fn give_back(&self, buf: Vec<f32>) {
        debug_assert_eq!(buf.len(), self.buffer_len);
        let mut free = self.free.lock();
        if free.len() < self.max_pool_size {
            free.push(buf);
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [f32];
    fn deref(&self) -> &[f32] {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.give_back(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rented_buffer_is_zeroed() {
        let pool = BufferPool::new(16, 4);
        let buf = pool.rent();
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn returned_buffer_is_reused() {
        let pool = BufferPool::new(4, 2);
        {
            let mut buf = pool.rent();
            buf[0] = 7.0;
        }
        let buf2 = pool.rent();
        // Reused buffers are re-zeroed on rent, not left dirty.
        assert_eq!(buf2[0], 0.0);
        assert_eq!(pool.free.lock().len(), 0);
    }

    #[test]
    fn rent_past_cap_still_succeeds() {
        let pool = BufferPool::new(4, 1);
        let a = pool.rent();
        let b = pool.rent();
        assert_eq!(a.len(), 4);
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn excess_returns_are_dropped_not_hoarded() {
        let pool = BufferPool::new(4, 1);
        let a = pool.rent();
        let b = pool.rent();
        drop(a);
        drop(b);
        assert_eq!(pool.free.lock().len(), 1);
    }
}
