//! Sliding-window byte storage backing every log buffer.
//!
//! A buffer holds one contiguous allocation split into two regions:
//!
//! ```text
//!  0          active_start      available_start        capacity
//!  |  consumed  |     active      |     available        |
//! ```
//!
//! * The **active** region holds bytes that were written but not yet
//!   discarded (flushed). They are preserved, and copied if necessary, by
//!   every call to [`SlidingBuffer::ensure_available`].
//! * The **available** region is the writable space past the active bytes.
//!
//! [`SlidingBuffer::commit`] extends the active region into the available
//! one; [`SlidingBuffer::discard`] drops bytes from the front of the active
//! region.
//!
//! Invariant: `0 <= active_start <= available_start <= capacity`.

use std::mem;
use std::sync::Arc;

use crate::byte_pool::{self, BytePool, MAX_ALLOCATION_SIZE};
use crate::error::CapacityError;

/// Where a buffer's allocation came from, and so where it goes back to.
#[derive(Clone)]
pub enum Ownership {
    /// The buffer owns its allocation; it is freed on release.
    Owned,
    /// The allocation was rented from this pool and is returned to it.
    Pooled(Arc<BytePool>),
}

impl Ownership {
    /// Pooled ownership backed by the process-wide pool.
    pub fn shared_pool() -> Self {
        Ownership::Pooled(BytePool::shared())
    }

    fn allocate(&self, len: usize) -> Result<Box<[u8]>, CapacityError> {
        match self {
            Ownership::Owned => byte_pool::allocate(len),
            Ownership::Pooled(pool) => pool.rent(len),
        }
    }

    /// The single place allocations leave a buffer.
    fn release(&self, bytes: Box<[u8]>) {
        match self {
            Ownership::Owned => drop(bytes),
            Ownership::Pooled(pool) => pool.give_back(bytes),
        }
    }
}

/// A growable, poolable sliding-window byte buffer.
///
/// The buffer is a move-only handle: views into it are ordinary borrows, so
/// any growth (which may shift or reallocate the storage) statically
/// invalidates them, and disposing it consumes the handle.
///
/// # Examples
///
/// ```
/// # use json_logger::sliding_buffer::SlidingBuffer;
/// let mut buffer = SlidingBuffer::pooled(16).unwrap();
///
/// buffer.ensure_available(5).unwrap();
/// buffer.available_mut()[..5].copy_from_slice(b"hello");
/// buffer.commit(5);
/// assert_eq!(buffer.active(), b"hello");
///
/// // Consume part of it, as a flush would
/// buffer.discard(2);
/// assert_eq!(buffer.active(), b"llo");
///
/// // Draining completely rewinds both offsets
/// buffer.discard(3);
/// assert_eq!(buffer.active_start(), 0);
/// ```
pub struct SlidingBuffer {
    bytes: Box<[u8]>,
    active_start: usize,
    available_start: usize,
    ownership: Ownership,
}

impl SlidingBuffer {
    /// Creates a buffer with at least `initial_size` bytes of capacity.
    ///
    /// An `initial_size` of zero creates an empty buffer that allocates on its
    /// first write.
    pub fn new(initial_size: usize, ownership: Ownership) -> Result<Self, CapacityError> {
        let bytes = if initial_size == 0 {
            Box::default()
        } else {
            ownership.allocate(initial_size)?
        };
        Ok(Self {
            bytes,
            active_start: 0,
            available_start: 0,
            ownership,
        })
    }

    /// Creates an empty buffer that rents from `ownership` on first use.
    pub fn empty(ownership: Ownership) -> Self {
        Self {
            bytes: Box::default(),
            active_start: 0,
            available_start: 0,
            ownership,
        }
    }

    /// Creates a buffer backed by the shared pool.
    pub fn pooled(initial_size: usize) -> Result<Self, CapacityError> {
        Self::new(initial_size, Ownership::shared_pool())
    }

    /// Wraps a caller-supplied allocation. The whole vector length becomes
    /// writable capacity and the buffer owns it outright.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
            active_start: 0,
            available_start: 0,
            ownership: Ownership::Owned,
        }
    }

    /// Bytes written but not yet discarded.
    #[inline]
    pub fn active_len(&self) -> usize {
        self.available_start - self.active_start
    }

    /// Read-only view of the active region.
    #[inline]
    pub fn active(&self) -> &[u8] {
        &self.bytes[self.active_start..self.available_start]
    }

    /// Writable capacity remaining past the active region.
    #[inline]
    pub fn available_len(&self) -> usize {
        self.bytes.len() - self.available_start
    }

    /// Write-only view of the available region.
    ///
    /// Bytes written here become part of the active region only after
    /// [`SlidingBuffer::commit`].
    #[inline]
    pub fn available_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.available_start..]
    }

    /// Total size of the current allocation.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Offset of the first active byte within the allocation.
    #[inline]
    pub fn active_start(&self) -> usize {
        self.active_start
    }

    /// Whether the allocation will be returned to a pool.
    pub fn is_pooled(&self) -> bool {
        matches!(self.ownership, Ownership::Pooled(_))
    }

    /// Drops `byte_count` bytes from the front of the active region.
    ///
    /// Draining the region completely rewinds both offsets to zero so the next
    /// write can use the whole allocation.
    ///
    /// # Panics
    ///
    /// Panics if `byte_count` exceeds the active length.
    pub fn discard(&mut self, byte_count: usize) {
        assert!(
            byte_count <= self.active_len(),
            "discard of {} bytes exceeds active length {}",
            byte_count,
            self.active_len()
        );
        self.active_start += byte_count;

        if self.active_start == self.available_start {
            self.active_start = 0;
            self.available_start = 0;
        }
    }

    /// Extends the active region by `byte_count` bytes already written into
    /// the available region.
    ///
    /// # Panics
    ///
    /// Panics if `byte_count` exceeds the available length.
    pub fn commit(&mut self, byte_count: usize) {
        assert!(
            byte_count <= self.available_len(),
            "commit of {} bytes exceeds available length {}",
            byte_count,
            self.available_len()
        );
        self.available_start += byte_count;
    }

    /// Guarantees at least `byte_count` writable bytes.
    ///
    /// Active bytes are preserved byte-for-byte. When the space already
    /// consumed at the front suffices, the active region is shifted down
    /// instead of reallocating; otherwise the buffer grows to at least double
    /// its capacity.
    ///
    /// # Errors
    ///
    /// Returns a [`CapacityError`] if the required capacity exceeds the
    /// platform maximum or cannot be allocated. The buffer is left exactly as
    /// it was.
    #[inline]
    pub fn ensure_available(&mut self, byte_count: usize) -> Result<(), CapacityError> {
        if byte_count > self.available_len() {
            self.ensure_available_core(byte_count)?;
        }
        Ok(())
    }

    fn ensure_available_core(&mut self, byte_count: usize) -> Result<(), CapacityError> {
        debug_assert!(self.available_len() < byte_count);

        if self.bytes.is_empty() {
            debug_assert!(self.active_start == 0 && self.available_start == 0);
            self.bytes = self.ownership.allocate(byte_count)?;
            return Ok(());
        }

        let active_len = self.active_len();
        let total_free = self.active_start + self.available_len();
        if byte_count <= total_free {
            self.bytes
                .copy_within(self.active_start..self.available_start, 0);
            self.active_start = 0;
            self.available_start = active_len;
            return Ok(());
        }

        let desired_size = active_len
            .checked_add(byte_count)
            .filter(|&size| size <= MAX_ALLOCATION_SIZE)
            .ok_or(CapacityError {
                requested: active_len.saturating_add(byte_count),
                max: MAX_ALLOCATION_SIZE,
            })?;
        let doubled = self.bytes.len().saturating_mul(2).min(MAX_ALLOCATION_SIZE);
        let new_size = desired_size.max(doubled);

        let mut new_bytes = self.ownership.allocate(new_size)?;
        new_bytes[..active_len].copy_from_slice(self.active());

        let old_bytes = mem::replace(&mut self.bytes, new_bytes);
        self.active_start = 0;
        self.available_start = active_len;
        self.ownership.release(old_bytes);

        debug_assert!(byte_count <= self.available_len());
        Ok(())
    }

    /// Forces the buffer to make room for one byte more than is currently
    /// available.
    pub fn grow(&mut self) -> Result<(), CapacityError> {
        self.ensure_available_core(self.available_len() + 1)
    }

    /// Returns the allocation to its pool and leaves an empty buffer behind.
    ///
    /// Unlike [`SlidingBuffer::dispose`] the buffer stays usable; the next
    /// write rents a fresh allocation.
    pub fn clear_and_return(&mut self) {
        self.active_start = 0;
        self.available_start = 0;
        let bytes = mem::take(&mut self.bytes);
        self.ownership.release(bytes);
    }

    /// Releases the allocation and consumes the buffer.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for SlidingBuffer {
    fn drop(&mut self) {
        self.clear_and_return();
    }
}
