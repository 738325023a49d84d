//! Byte sink backed by a pooled sliding buffer.
//!
//! This module provides [`PooledBufferWriter`], the `io::Write` implementation
//! the JSON writer emits into. The writer operates in one of two modes,
//! selected by type:
//!
//! * [`Capture`] keeps every byte in memory until the caller reads them with
//!   [`PooledBufferWriter::written`]. Flushing is a no-op.
//! * [`Stream`] is bound to an `io::Write` destination. Flushing writes the
//!   whole active region to the destination and rewinds the buffer, keeping
//!   its capacity for the next batch of bytes.

use std::io;

use crate::error::CapacityError;
use crate::sliding_buffer::{Ownership, SlidingBuffer};

/// Initial capacity that covers a typical log line without growing.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Span size handed out when a caller asks for "some" room.
pub const MINIMUM_BUFFER_SIZE: usize = 256;

/// What happens to buffered bytes when the writer is flushed.
pub trait FlushMode {
    /// Delivers `bytes`. Returns `true` when the bytes were consumed and the
    /// buffer should be cleared.
    fn deliver(&mut self, bytes: &[u8]) -> io::Result<bool>;
}

/// Capture mode: bytes stay in memory for direct reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct Capture;

impl FlushMode for Capture {
    fn deliver(&mut self, _bytes: &[u8]) -> io::Result<bool> {
        Ok(false)
    }
}

/// Stream mode: bytes are written to the wrapped destination on flush.
#[derive(Debug)]
pub struct Stream<W> {
    destination: W,
}

impl<W: io::Write> FlushMode for Stream<W> {
    fn deliver(&mut self, bytes: &[u8]) -> io::Result<bool> {
        self.destination.write_all(bytes)?;
        self.destination.flush()?;
        Ok(true)
    }
}

/// An `io::Write` sink whose storage is rented from the shared byte pool.
///
/// Each writer owns its buffer outright, so concurrent log calls using
/// separate writers never need to synchronize. The buffer goes back to the
/// pool when the writer is dropped.
///
/// # Examples
///
/// Capture mode, reading the bytes back directly:
///
/// ```
/// # use json_logger::pooled_writer::PooledBufferWriter;
/// use std::io::Write;
///
/// let mut writer = PooledBufferWriter::new(64).unwrap();
/// writer.write_all(b"{\"EventId\":1}").unwrap();
/// assert_eq!(writer.written(), b"{\"EventId\":1}");
/// ```
///
/// Stream mode, delivering to a destination on flush:
///
/// ```
/// # use json_logger::pooled_writer::PooledBufferWriter;
/// use std::io::Write;
///
/// let mut writer = PooledBufferWriter::with_destination(64, Vec::new()).unwrap();
/// writer.write_all(b"first").unwrap();
/// writer.flush().unwrap();
/// assert_eq!(writer.unflushed_bytes(), 0);
/// assert_eq!(writer.destination(), b"first");
/// ```
pub struct PooledBufferWriter<M = Capture> {
    buffer: SlidingBuffer,
    mode: M,
}

impl PooledBufferWriter<Capture> {
    /// Creates a capture-mode writer with at least `initial_capacity` bytes.
    pub fn new(initial_capacity: usize) -> Result<Self, CapacityError> {
        Ok(Self {
            buffer: SlidingBuffer::pooled(initial_capacity)?,
            mode: Capture,
        })
    }

    /// Creates a writer with no storage, for callers that keep one writer
    /// around and call [`PooledBufferWriter::initialize_empty`] before each
    /// use.
    pub fn empty_for_caching() -> Self {
        Self {
            buffer: SlidingBuffer::empty(Ownership::shared_pool()),
            mode: Capture,
        }
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        self.buffer.active()
    }
}

impl<W: io::Write> PooledBufferWriter<Stream<W>> {
    /// Creates a stream-mode writer that delivers to `destination` on flush.
    pub fn with_destination(initial_capacity: usize, destination: W) -> Result<Self, CapacityError> {
        Ok(Self {
            buffer: SlidingBuffer::pooled(initial_capacity)?,
            mode: Stream { destination },
        })
    }

    /// The destination bytes are delivered to.
    pub fn destination(&self) -> &W {
        &self.mode.destination
    }

    /// Releases the buffer and hands back the destination. Unflushed bytes
    /// are dropped.
    pub fn into_destination(self) -> W {
        let Self { buffer, mode } = self;
        buffer.dispose();
        mode.destination
    }
}

impl<M> PooledBufferWriter<M> {
    /// Bytes written but not yet delivered or cleared.
    pub fn unflushed_bytes(&self) -> usize {
        self.buffer.active_len()
    }

    /// Current size of the underlying allocation.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Drops every buffered byte, keeping the allocation.
    pub fn clear(&mut self) {
        self.buffer.discard(self.buffer.active_len());
    }

    /// Drops every buffered byte and returns the allocation to the pool.
    /// The writer stays usable.
    pub fn clear_and_return_buffers(&mut self) {
        self.buffer.clear_and_return();
    }

    /// Prepares a cached, empty writer for another use.
    pub fn initialize_empty(&mut self, initial_capacity: usize) -> Result<(), CapacityError> {
        debug_assert!(initial_capacity > 0);
        debug_assert_eq!(self.buffer.active_len(), 0);
        self.buffer.ensure_available(initial_capacity)
    }

    /// Returns a writable span of at least `size_hint` bytes
    /// ([`MINIMUM_BUFFER_SIZE`] when the hint is zero).
    ///
    /// Bytes written into the span count only after
    /// [`PooledBufferWriter::advance`].
    pub fn get_span(&mut self, size_hint: usize) -> Result<&mut [u8], CapacityError> {
        let size_hint = if size_hint == 0 { MINIMUM_BUFFER_SIZE } else { size_hint };
        self.buffer.ensure_available(size_hint)?;
        Ok(self.buffer.available_mut())
    }

    /// Marks `count` bytes of the last span as written.
    pub fn advance(&mut self, count: usize) {
        self.buffer.commit(count);
    }

    /// Releases the buffer back to the pool.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<M: FlushMode> io::Write for PooledBufferWriter<M> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let span = self.get_span(buf.len())?;
        span[..buf.len()].copy_from_slice(buf);
        self.advance(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.active_len() == 0 {
            return Ok(());
        }
        if self.mode.deliver(self.buffer.active())? {
            self.clear();
        }
        Ok(())
    }
}
