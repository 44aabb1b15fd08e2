//! # Buffer Pool
//!
//! Object pool for the replacement buffers allocated on the pipeline's slow
//! rewrite path (non-growable inbound buffer, packet re-serialized into a
//! fresh one). Backing storage returns to the pool when the owning
//! [`ByteBuf`]'s reference count reaches zero.

use crate::core::buffer::{ByteBuf, PoolHandle};
use bytes::BytesMut;
use std::sync::{Arc, Mutex};

/// Buffers above this capacity are deallocated instead of pooled.
pub(crate) const MAX_POOLED_CAPACITY: usize = 64 * 1024;

/// Default capacity of pre-allocated buffers.
const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Thread-safe pool of buffer backing storage.
pub struct BufferPool {
    pool: PoolHandle,
    initial_capacity: usize,
}

impl BufferPool {
    /// Create a pool with `pool_size` pre-allocated buffers.
    pub fn new(pool_size: usize) -> Self {
        let mut pool = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            pool.push(BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY));
        }
        BufferPool {
            pool: Arc::new(Mutex::new(pool)),
            initial_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Take a growable buffer with at least `min_capacity` bytes of storage.
    /// Its backing memory returns here once the buffer is fully released.
    pub fn acquire(&self, min_capacity: usize) -> ByteBuf {
        let mut data = {
            let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
            pool.pop()
                .unwrap_or_else(|| BytesMut::with_capacity(self.initial_capacity.max(min_capacity)))
        };
        data.clear();
        data.resize(min_capacity, 0);
        ByteBuf::from_bytes_mut(data, usize::MAX, Some(Arc::clone(&self.pool)))
    }

    /// Number of idle buffers currently held.
    pub fn available(&self) -> usize {
        self.pool.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(50)
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        BufferPool {
            pool: Arc::clone(&self.pool),
            initial_capacity: self.initial_capacity,
        }
    }
}
