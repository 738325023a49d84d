//! Character destinations for finished log lines.
//!
//! The formatter produces UTF-8. A [`TextSink`] receives each finished line
//! and converts it to whatever the destination stores: nothing for a `String`
//! or a UTF-8 stream, UTF-16LE code units for [`Utf16TextSink`].

use std::io;
use std::sync::Arc;

use crate::byte_pool::{BytePool, RentedBuffer};
use crate::error::Result;

/// Terminator written after every record.
#[cfg(windows)]
pub const LINE_TERMINATOR: &str = "\r\n";
/// Terminator written after every record.
#[cfg(not(windows))]
pub const LINE_TERMINATOR: &str = "\n";

/// A destination for text.
pub trait TextSink {
    /// Writes `text` in the destination's native representation.
    fn write_text(&mut self, text: &str) -> io::Result<()>;

    /// Writes UTF-8 encoded bytes, rejecting invalid input.
    fn write_utf8(&mut self, bytes: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(bytes)?;
        self.write_text(text)?;
        Ok(())
    }
}

impl TextSink for String {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.push_str(text);
        Ok(())
    }
}

impl<T: TextSink + ?Sized> TextSink for &mut T {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        (**self).write_text(text)
    }

    fn write_utf8(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_utf8(bytes)
    }
}

/// Writes UTF-8 text to an `io::Write` such as stderr or a file.
#[derive(Debug)]
pub struct IoTextSink<W> {
    inner: W,
}

impl<W: io::Write> IoTextSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> TextSink for IoTextSink<W> {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_all(text.as_bytes())
    }

    // Bytes from the formatter are already UTF-8 and go out unchanged.
    fn write_utf8(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }
}

/// Writes text as UTF-16LE, for destinations that store wide characters.
///
/// Each write transcodes through a conversion buffer rented from the byte
/// pool and returned before the write completes, whether or not the
/// destination accepted the bytes.
///
/// # Examples
///
/// ```
/// # use json_logger::text_sink::{TextSink, Utf16TextSink};
/// let mut sink = Utf16TextSink::new(Vec::new());
/// sink.write_text("hé").unwrap();
/// assert_eq!(sink.into_inner(), [0x68, 0x00, 0xE9, 0x00]);
/// ```
pub struct Utf16TextSink<W> {
    inner: W,
    pool: Arc<BytePool>,
}

impl<W: io::Write> Utf16TextSink<W> {
    /// Creates a sink that rents conversion buffers from the shared pool.
    pub fn new(inner: W) -> Self {
        Self::with_pool(inner, BytePool::shared())
    }

    pub fn with_pool(inner: W, pool: Arc<BytePool>) -> Self {
        Self { inner, pool }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> TextSink for Utf16TextSink<W> {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        // Each UTF-8 byte yields at most one UTF-16 unit.
        let mut scratch = RentedBuffer::rent(Arc::clone(&self.pool), text.len().saturating_mul(2))?;
        let mut len = 0;
        for unit in text.encode_utf16() {
            scratch[len..len + 2].copy_from_slice(&unit.to_le_bytes());
            len += 2;
        }
        self.inner.write_all(&scratch[..len])
    }
}
