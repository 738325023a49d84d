//! Error types for the JSON line logger.
//!
//! Everything fallible in the crate funnels into [`Error`]. Buffer growth
//! failures travel through `std::io::Write` boundaries wrapped in an
//! `io::Error` and are unwrapped back into [`Error::Capacity`] when they
//! reach the crate boundary, so callers always see the original cause.

use std::io;
use thiserror::Error;

/// Result type for formatter operations
pub type Result<T> = std::result::Result<T, Error>;

/// A buffer could not grow to the requested size.
///
/// Raised when the required capacity exceeds the platform's maximum
/// allocation size, or when the allocator refuses the request. The write
/// that triggered it must be treated as failed as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot grow buffer to {requested} bytes (maximum is {max} bytes)")]
pub struct CapacityError {
    /// Capacity that was required (saturated at `usize::MAX`)
    pub requested: usize,
    /// Largest allocation the platform allows
    pub max: usize,
}

impl From<CapacityError> for io::Error {
    fn from(err: CapacityError) -> Self {
        io::Error::new(io::ErrorKind::OutOfMemory, err)
    }
}

/// Errors produced while configuring the formatter or writing a record
#[derive(Debug, Error)]
pub enum Error {
    /// Buffer growth failed
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// A numeric severity outside the known range
    #[error("unknown log level {0}")]
    UnknownLevel(i32),

    /// The configured timestamp format description does not parse
    #[error("invalid timestamp format {format:?}: {source}")]
    InvalidTimestampFormat {
        /// The rejected format description
        format: String,
        /// Parser diagnostic
        #[source]
        source: time::error::InvalidFormatDescription,
    },

    /// The timestamp could not be rendered with the configured format
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),

    /// Malformed configuration document
    #[error("invalid formatter configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The encoded record is not valid UTF-8
    #[error("encoded record is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The destination rejected the write
    #[error("failed to write log record: {0}")]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let capacity = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<CapacityError>())
            .copied();
        match capacity {
            Some(capacity) => Error::Capacity(capacity),
            None => Error::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_survives_io_round_trip() {
        let original = CapacityError { requested: usize::MAX, max: isize::MAX as usize };
        let io_err: io::Error = original.into();
        assert_eq!(io_err.kind(), io::ErrorKind::OutOfMemory);

        match Error::from(io_err) {
            Error::Capacity(err) => assert_eq!(err, original),
            other => panic!("expected capacity error, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "closed");
        match Error::from(io_err) {
            Error::Io(err) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected io error, got {:?}", other),
        }
    }
}
