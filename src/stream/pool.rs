//! Pool of reusable block buffers
//!
//! The pool hands out at most `max_buffers` buffers at a time, `acquire`
//! waits while they are all in use. This is what bounds the memory held by
//! blocks that are still being uploaded.
//!
//! A [`PooledBuffer`] goes back to the pool when it is released or dropped,
//! so a buffer owned by a failed or cancelled upload is never lost and can
//! not be returned twice.

use crate::stream::error::{Result, StreamError};
use bytes::BytesMut;
use std::{
    fmt,
    ops::Deref,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
struct Inner {
    permits: Arc<Semaphore>,
    free: Mutex<Vec<BytesMut>>,
    max_buffers: usize,
    max_buffer_size: usize,
    outstanding: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    /// `max_buffers` is at least 1
    #[must_use]
    pub fn new(max_buffers: usize, max_buffer_size: usize) -> Self {
        let max_buffers = max_buffers.max(1);

        log::debug!("buffer pool: {max_buffers} buffers of up to {max_buffer_size} bytes");

        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(max_buffers)),
                free: Mutex::new(Vec::with_capacity(max_buffers)),
                max_buffers,
                max_buffer_size,
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Pool holding `capacity` bytes split in buffers of `buffer_size`.
    #[must_use]
    pub fn with_capacity(capacity: u64, buffer_size: usize) -> Self {
        let buffers = usize::try_from(capacity / buffer_size.max(1) as u64).unwrap_or(usize::MAX);
        Self::new(buffers, buffer_size)
    }

    /// Get a buffer able to hold `size` bytes, waiting for one to be
    /// released if the pool is exhausted.
    ///
    /// # Errors
    /// Will return an error if `size` is bigger than the pool buffers or if
    /// the pool was closed
    pub async fn acquire(&self, size: usize) -> Result<PooledBuffer> {
        if size > self.inner.max_buffer_size {
            return Err(StreamError::ResourceExhausted {
                size,
                reason: format!(
                    "the pool serves buffers of at most {} bytes",
                    self.inner.max_buffer_size
                ),
            });
        }

        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| StreamError::ResourceExhausted {
                size,
                reason: String::from("the buffer pool is closed"),
            })?;

        let mut buffer = self
            .inner
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default();

        buffer.clear();
        buffer.reserve(size);

        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);

        Ok(PooledBuffer {
            buffer,
            limit: size,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Stop handing out buffers, pending and future `acquire` calls fail.
    /// Buffers already out can still be released.
    pub fn close(&self) {
        self.inner.permits.close();
    }

    /// Buffers currently held by streams or uploads
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Buffers that can be acquired without waiting
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    #[must_use]
    pub fn max_buffers(&self) -> usize {
        self.inner.max_buffers
    }
}

/// Buffer owned by exactly one holder at a time.
pub struct PooledBuffer {
    buffer: BytesMut,
    limit: usize,
    pool: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledBuffer {
    /// Bytes this buffer accepts
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.buffer.len())
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Append as much of `bytes` as fits, returns the number of bytes taken.
    pub fn put(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        if let Some(chunk) = bytes.get(..n) {
            self.buffer.extend_from_slice(chunk);
        }
        n
    }

    /// Give the buffer back to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buffer
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buffer.len())
            .field("capacity", &self.limit)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();

        if let Ok(mut free) = self.pool.free.lock() {
            if free.len() < self.pool.max_buffers {
                free.push(buffer);
            }
        }

        self.pool.outstanding.fetch_sub(1, Ordering::SeqCst);
        // the permit is dropped after this, waiters find the buffer in the free list
    }
}
