//! Shared pool of byte allocations.
//!
//! This module provides the memory pool that backs every log buffer. Formatting
//! a record rents an allocation, grows it by renting a larger one, and hands it
//! back when the record is done, so a steady stream of similarly sized records
//! never touches the global allocator.
//!
//! # Thread Safety
//!
//! Buffers themselves are never shared between threads, but all threads rent
//! from the same pool. Each size bucket is a bounded lock-free queue, so rent
//! and return never block, and a full bucket simply drops the array.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use lazy_static::lazy_static;
use tracing::trace;

use crate::error::CapacityError;

/// Largest allocation the platform allows, in bytes.
pub const MAX_ALLOCATION_SIZE: usize = isize::MAX as usize;

/// Smallest bucket holds 16-byte arrays.
const MIN_BUCKET_SHIFT: u32 = 4;
/// Largest bucket holds 1 GiB arrays.
const MAX_BUCKET_SHIFT: u32 = 30;
const BUCKET_COUNT: usize = (MAX_BUCKET_SHIFT - MIN_BUCKET_SHIFT + 1) as usize;
const DEFAULT_ARRAYS_PER_BUCKET: usize = 32;

lazy_static! {
    /// The process-wide pool used by default for every pooled buffer.
    static ref SHARED_POOL: Arc<BytePool> = Arc::new(BytePool::new());
}

/// A thread-safe pool of byte arrays bucketed by power-of-two length.
///
/// # Examples
///
/// ```
/// # use json_logger::byte_pool::BytePool;
/// let pool = BytePool::new();
///
/// // Requests are rounded up to the bucket size
/// let buffer = pool.rent(1000).unwrap();
/// assert_eq!(buffer.len(), 1024);
///
/// // Returned arrays are handed out again
/// pool.give_back(buffer);
/// assert_eq!(pool.pooled_count(), 1);
/// let again = pool.rent(600).unwrap();
/// assert_eq!(again.len(), 1024);
/// assert_eq!(pool.pooled_count(), 0);
/// ```
pub struct BytePool {
    buckets: Vec<ArrayQueue<Box<[u8]>>>,
    counters: PoolCounters,
}

#[derive(Debug, Default)]
struct PoolCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    returns: AtomicU64,
    drops: AtomicU64,
}

/// Point-in-time counts of pool traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Rents served from a bucket
    pub hits: u64,
    /// Rents that had to allocate
    pub misses: u64,
    /// Arrays accepted back into a bucket
    pub returns: u64,
    /// Returned arrays dropped (bucket full or no matching bucket)
    pub drops: u64,
}

impl PoolStats {
    /// Share of rents served without allocating; 1.0 before any rent.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 1.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

impl BytePool {
    /// Creates an empty pool retaining up to 32 arrays per size bucket.
    pub fn new() -> Self {
        Self::with_arrays_per_bucket(DEFAULT_ARRAYS_PER_BUCKET)
    }

    /// Creates an empty pool retaining at most `arrays_per_bucket` arrays of
    /// each size (at least one). Surplus returns are dropped.
    pub fn with_arrays_per_bucket(arrays_per_bucket: usize) -> Self {
        let per_bucket = arrays_per_bucket.max(1);
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| ArrayQueue::new(per_bucket)).collect(),
            counters: PoolCounters::default(),
        }
    }

    /// Returns the process-wide shared pool.
    pub fn shared() -> Arc<BytePool> {
        Arc::clone(&SHARED_POOL)
    }

    /// Rents an array of at least `min_len` bytes.
    ///
    /// Requests are rounded up to the next power of two (at least 16 bytes).
    /// Requests beyond the largest bucket are allocated directly at their
    /// exact size.
    ///
    /// # Errors
    ///
    /// Returns a [`CapacityError`] when `min_len` exceeds
    /// [`MAX_ALLOCATION_SIZE`] or the allocator cannot satisfy the request.
    pub fn rent(&self, min_len: usize) -> Result<Box<[u8]>, CapacityError> {
        match bucket_for_request(min_len) {
            Some(index) => {
                if let Some(buffer) = self.buckets[index].pop() {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(buffer);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                allocate(bucket_len(index))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                allocate(min_len)
            }
        }
    }

    /// Returns an array to the pool.
    ///
    /// Arrays whose length is not one of the bucket sizes (including empty
    /// arrays) are dropped, as are returns to a bucket that is already full.
    pub fn give_back(&self, buffer: Box<[u8]>) {
        if buffer.is_empty() {
            return;
        }
        let accepted = match bucket_for_array(buffer.len()) {
            Some(index) => self.buckets[index].push(buffer).is_ok(),
            None => {
                trace!(len = buffer.len(), "dropping array that fits no pool bucket");
                false
            }
        };
        let counter = if accepted { &self.counters.returns } else { &self.counters.drops };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of arrays currently held by the pool, across all buckets.
    pub fn pooled_count(&self) -> usize {
        self.buckets.iter().map(ArrayQueue::len).sum()
    }

    /// Traffic counts since the pool was created.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            returns: self.counters.returns.load(Ordering::Relaxed),
            drops: self.counters.drops.load(Ordering::Relaxed),
        }
    }
}

impl Default for BytePool {
    fn default() -> Self {
        Self::new()
    }
}

/// A rented array that goes back to its pool when dropped.
///
/// Used for short-lived scratch space such as transcoding buffers, where the
/// array must be returned on every exit path.
pub struct RentedBuffer {
    pool: Arc<BytePool>,
    bytes: Box<[u8]>,
}

impl RentedBuffer {
    /// Rents at least `min_len` bytes from `pool`.
    pub fn rent(pool: Arc<BytePool>, min_len: usize) -> Result<Self, CapacityError> {
        let bytes = pool.rent(min_len)?;
        Ok(Self { pool, bytes })
    }
}

impl Deref for RentedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for RentedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for RentedBuffer {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.bytes));
    }
}

/// Allocates a zeroed, unpooled array of exactly `len` bytes.
///
/// Allocation failure is reported instead of aborting the process.
pub fn allocate(len: usize) -> Result<Box<[u8]>, CapacityError> {
    let too_large = CapacityError {
        requested: len,
        max: MAX_ALLOCATION_SIZE,
    };
    if len > MAX_ALLOCATION_SIZE {
        return Err(too_large);
    }
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len).map_err(|_| too_large)?;
    bytes.resize(len, 0);
    Ok(bytes.into_boxed_slice())
}

fn bucket_for_request(min_len: usize) -> Option<usize> {
    let size = min_len.max(1 << MIN_BUCKET_SHIFT).checked_next_power_of_two()?;
    let shift = size.trailing_zeros();
    (shift <= MAX_BUCKET_SHIFT).then(|| (shift - MIN_BUCKET_SHIFT) as usize)
}

fn bucket_for_array(len: usize) -> Option<usize> {
    if !len.is_power_of_two() {
        return None;
    }
    let shift = len.trailing_zeros();
    (MIN_BUCKET_SHIFT..=MAX_BUCKET_SHIFT)
        .contains(&shift)
        .then(|| (shift - MIN_BUCKET_SHIFT) as usize)
}

fn bucket_len(index: usize) -> usize {
    1 << (index as u32 + MIN_BUCKET_SHIFT)
}
