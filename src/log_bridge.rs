//! `log` facade integration.
//!
//! [`JsonLogger`] implements [`log::Log`], writing one JSON line per record.
//! Key-values attached to a record become attributes, except for two
//! reserved keys:
//!
//! * `event_id` fills the `EventId` field,
//! * `exception` (or `error`) fills the `Exception` field.
//!
//! # Examples
//!
//! ```no_run
//! use json_logger::formatter_options::FormatterOptions;
//! use json_logger::log_bridge::JsonLogger;
//!
//! JsonLogger::stderr(FormatterOptions::default())
//!     .unwrap()
//!     .with_max_level(log::LevelFilter::Info)
//!     .init()
//!     .unwrap();
//!
//! log::info!(target: "app", count = 3; "started");
//! ```

use std::borrow::Cow;
use std::io;

use log::kv::{self, VisitSource};
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::formatter_options::FormatterOptions;
use crate::json_formatter::JsonConsoleFormatter;
use crate::log_record::{LogLevel, LogRecord};
use crate::log_value::{OwnedFields, OwnedValue};
use crate::pooled_writer::{PooledBufferWriter, Stream, DEFAULT_BUFFER_SIZE};

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Info => LogLevel::Information,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Trace,
        }
    }
}

/// A [`log::Log`] that writes JSON lines to `W`.
///
/// # Thread Safety
///
/// Encoding and delivery happen under one lock, so each record reaches the
/// destination as one uninterrupted write.
pub struct JsonLogger<W: io::Write + Send> {
    formatter: JsonConsoleFormatter,
    output: Mutex<PooledBufferWriter<Stream<W>>>,
    max_level: LevelFilter,
}

impl JsonLogger<io::Stderr> {
    /// A logger writing to standard error.
    pub fn stderr(options: FormatterOptions) -> Result<Self> {
        Self::new(JsonConsoleFormatter::new(options)?, io::stderr())
    }
}

impl<W: io::Write + Send + 'static> JsonLogger<W> {
    /// Installs this logger as the global `log` logger.
    pub fn init(self) -> std::result::Result<(), log::SetLoggerError> {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl<W: io::Write + Send> JsonLogger<W> {
    /// A logger writing to `destination`, passing every level.
    pub fn new(formatter: JsonConsoleFormatter, destination: W) -> Result<Self> {
        Ok(Self {
            formatter,
            output: Mutex::new(PooledBufferWriter::with_destination(DEFAULT_BUFFER_SIZE, destination)?),
            max_level: LevelFilter::Trace,
        })
    }

    /// Drops records more verbose than `max_level`; `init` also applies it
    /// to the `log` facade.
    pub fn with_max_level(mut self, max_level: LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    /// The formatter, for reloading options.
    pub fn formatter(&self) -> &JsonConsoleFormatter {
        &self.formatter
    }

    /// Consumes the logger and returns its destination.
    pub fn into_destination(self) -> W {
        self.output.into_inner().into_destination()
    }
}

impl<W: io::Write + Send> Log for JsonLogger<W> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let message = match record.args().as_str() {
            Some(message) => Cow::Borrowed(message),
            None => Cow::Owned(record.args().to_string()),
        };

        let mut fields = OwnedFields::new();
        if let Err(err) = record.key_values().visit(&mut FieldCollector(&mut fields)) {
            debug!(error = %err, "failed to collect log key-values");
        }
        let event_id = fields.take("event_id").and_then(|id| id.to_i32()).unwrap_or(0);
        let exception = fields
            .take("exception")
            .or_else(|| fields.take("error"))
            .map(OwnedValue::into_text);
        let attributes = fields.attributes();

        let mut entry = LogRecord::new(record.level().into(), record.target())
            .with_event_id(event_id)
            .with_message(&message)
            .with_attributes(&attributes);
        if let Some(exception) = &exception {
            entry = entry.with_exception(exception);
        }

        let mut output = self.output.lock();
        if let Err(err) = self.formatter.write_to_stream(&entry, &mut output) {
            debug!(error = %err, target = record.target(), "dropped log record");
        }
    }

    fn flush(&self) {
        use std::io::Write;

        if let Err(err) = self.output.lock().flush() {
            debug!(error = %err, "failed to flush log destination");
        }
    }
}

struct FieldCollector<'a>(&'a mut OwnedFields);

impl<'kvs> VisitSource<'kvs> for FieldCollector<'_> {
    fn visit_pair(&mut self, key: kv::Key<'kvs>, value: kv::Value<'kvs>) -> std::result::Result<(), kv::Error> {
        let value = if let Some(v) = value.to_bool() {
            OwnedValue::Bool(v)
        } else if let Some(v) = value.to_i64() {
            OwnedValue::I64(v)
        } else if let Some(v) = value.to_u64() {
            OwnedValue::U64(v)
        } else if let Some(v) = value.to_f64() {
            OwnedValue::F64(v)
        } else if let Some(v) = value.to_borrowed_str() {
            OwnedValue::Text(v.to_owned())
        } else {
            OwnedValue::Text(value.to_string())
        };
        self.0.push(key.as_str().to_owned(), value);
        Ok(())
    }
}
