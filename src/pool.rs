//! Payload buffer pooling
//!
//! Payload storage is borrowed from a [`BufferPool`] and handed back when the
//! owning [`PooledBuffer`] is dropped, so every exit path (delivery, discard,
//! error, task abort) releases its buffer.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Acquire/release capability for payload buffers
pub trait BufferPool: Send + Sync {
    /// Hand out an empty buffer with at least `size` bytes of capacity
    fn acquire(&self, size: usize) -> Vec<u8>;

    /// Take back a buffer previously handed out by [`BufferPool::acquire`]
    fn release(&self, buffer: Vec<u8>);
}

pub type SharedPool = Arc<dyn BufferPool>;

/// Allocates a fresh buffer every time and lets released buffers drop
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPool;

impl BufferPool for NoPool {
    fn acquire(&self, size: usize) -> Vec<u8> {
        Vec::with_capacity(size)
    }

    fn release(&self, _buffer: Vec<u8>) {}
}

/// Keeps a bounded free list of released buffers for reuse
pub struct RecyclingPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    max_buffer_size: usize,
    outstanding: AtomicUsize,
}

impl RecyclingPool {
    /// `max_retained` buffers of at most `max_buffer_size` bytes are kept
    pub fn new(max_retained: usize, max_buffer_size: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_retained)),
            max_retained,
            max_buffer_size,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Buffers acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Buffers sitting in the free list
    pub fn retained(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for RecyclingPool {
    fn default() -> Self {
        Self::new(64, 64 * 1024)
    }
}

impl fmt::Debug for RecyclingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecyclingPool")
            .field("max_retained", &self.max_retained)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl BufferPool for RecyclingPool {
    fn acquire(&self, size: usize) -> Vec<u8> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);

        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        match free.iter().position(|buf| buf.capacity() >= size) {
            Some(index) => {
                let mut buffer = free.swap_remove(index);
                buffer.clear();
                buffer
            }
            None => Vec::with_capacity(size),
        }
    }

    fn release(&self, mut buffer: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);

        if buffer.capacity() > self.max_buffer_size {
            return;
        }
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.max_retained {
            buffer.clear();
            free.push(buffer);
        }
    }
}

/// Owned payload bytes that return to their pool on drop
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Option<SharedPool>,
}

impl PooledBuffer {
    pub fn acquire(pool: &SharedPool, size: usize) -> Self {
        Self {
            data: pool.acquire(size),
            pool: Some(Arc::clone(pool)),
        }
    }

    /// Wrap bytes that did not come from any pool
    pub fn unpooled(data: Vec<u8>) -> Self {
        Self { data, pool: None }
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Give the buffer back to its pool now
    pub fn release(self) {
        drop(self);
    }

    /// Make room for `additional` bytes, doubling capacity but not past `limit`
    pub(crate) fn reserve_within(&mut self, additional: usize, limit: usize) {
        let needed = self.data.len() + additional;
        if needed <= self.data.capacity() {
            return;
        }
        let target = self
            .data
            .capacity()
            .saturating_mul(2)
            .min(limit)
            .max(needed);
        self.data.reserve_exact(target - self.data.len());
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}

/// Cloning copies the bytes into an unpooled buffer
impl Clone for PooledBuffer {
    fn clone(&self) -> Self {
        Self::unpooled(self.data.clone())
    }
}

impl PartialEq for PooledBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for PooledBuffer {}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_pooled_buffer_releases_it() {
        let recycling = Arc::new(RecyclingPool::new(4, 1024));
        let pool: SharedPool = recycling.clone();

        let mut buffer = PooledBuffer::acquire(&pool, 16);
        buffer.extend_from_slice(b"payload");
        assert_eq!(recycling.outstanding(), 1);

        drop(buffer);
        assert_eq!(recycling.outstanding(), 0);
        assert_eq!(recycling.retained(), 1);
    }

    #[test]
    fn recycled_buffers_come_back_empty() {
        let recycling = Arc::new(RecyclingPool::new(4, 1024));
        let pool: SharedPool = recycling.clone();

        let mut first = PooledBuffer::acquire(&pool, 32);
        first.extend_from_slice(&[1, 2, 3]);
        first.release();

        let second = PooledBuffer::acquire(&pool, 8);
        assert!(second.is_empty());
        assert_eq!(recycling.retained(), 0);
    }

    #[test]
    fn oversized_buffers_are_not_retained() {
        let recycling = Arc::new(RecyclingPool::new(4, 64));
        let pool: SharedPool = recycling.clone();

        PooledBuffer::acquire(&pool, 4096).release();
        assert_eq!(recycling.retained(), 0);
        assert_eq!(recycling.outstanding(), 0);
    }

    #[test]
    fn clone_detaches_from_pool() {
        let recycling = Arc::new(RecyclingPool::default());
        let pool: SharedPool = recycling.clone();

        let mut buffer = PooledBuffer::acquire(&pool, 4);
        buffer.extend_from_slice(b"abcd");
        let copy = buffer.clone();

        assert!(!copy.is_pooled());
        assert_eq!(copy, buffer);
        drop(buffer);
        assert_eq!(recycling.outstanding(), 0);
        assert_eq!(&copy[..], b"abcd");
    }
}
