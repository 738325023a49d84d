//! # JSON Logger
//!
//! A structured log formatter that writes each record as one line of JSON,
//! without allocating on the hot path:
//!
//! ```text
//! {"EventId":5,"LogLevel":"Information","Category":"Test","Message":"hello","count":3}
//! ```
//!
//! ## Key Features
//!
//! * Pooled, growable output buffers: records are encoded into memory rented
//!   from a shared pool and returned after every write
//! * Exact typed values: every integer width (including `u64` above 2^63) is
//!   written as an integer literal, never through a float
//! * Hot-reloadable options: timestamp format, UTC or local time, scopes,
//!   indentation and escaping can change while other threads are logging
//! * Adapters for both `log` and `tracing`
//!
//! ## Main Components
//!
//! * `byte_pool`: process-wide pool of byte arrays bucketed by size
//! * `sliding_buffer`: growable buffer with an active and an available region
//! * `pooled_writer`: `io::Write` over a sliding buffer, in capture or stream mode
//! * `json_writer`: streaming JSON token writer
//! * `json_formatter`: turns a `LogRecord` into one JSON line
//! * `log_bridge` / `tracing_layer`: facade integrations
//!
//! ## Quick Start
//!
//! ```
//! use json_logger::{Attribute, FormatterOptions, JsonConsoleFormatter, LogLevel, LogRecord};
//!
//! let formatter = JsonConsoleFormatter::new(FormatterOptions::default()).unwrap();
//!
//! let attributes = [Attribute::new("count", 3), Attribute::new("flag", true)];
//! let record = LogRecord::new(LogLevel::Information, "Test")
//!     .with_event_id(5)
//!     .with_message("hello")
//!     .with_attributes(&attributes);
//!
//! let mut line = String::new();
//! formatter.write(&record, &mut line).unwrap();
//! assert_eq!(
//!     line.trim_end(),
//!     r#"{"EventId":5,"LogLevel":"Information","Category":"Test","Message":"hello","count":3,"flag":true}"#
//! );
//! ```

pub mod byte_pool;
pub mod error;
pub mod formatter_options;
pub mod json_formatter;
pub mod json_writer;
pub mod log_bridge;
pub mod log_record;
pub mod log_value;
pub mod pooled_writer;
pub mod sliding_buffer;
pub mod text_sink;
pub mod tracing_layer;

pub use byte_pool::{BytePool, PoolStats};
pub use error::{CapacityError, Error, Result};
pub use formatter_options::{FormatterOptions, OptionsMonitor};
pub use json_formatter::JsonConsoleFormatter;
pub use json_writer::{JsonWriter, JsonWriterOptions};
pub use log_bridge::JsonLogger;
pub use log_record::{LogLevel, LogRecord, Scope, ScopeProvider};
pub use log_value::{Attribute, Decimal, LogValue};
pub use pooled_writer::PooledBufferWriter;
pub use text_sink::{IoTextSink, TextSink, Utf16TextSink, LINE_TERMINATOR};
pub use tracing_layer::JsonLayer;
