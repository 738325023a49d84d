//! The record handed to the formatter, and the scope chain around it.

use std::fmt;

use time::OffsetDateTime;

use crate::error::Error;
use crate::log_value::Attribute;

/// Severity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// The name written to the `LogLevel` field.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Critical => "Critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts a numeric severity (0 = `Trace` through 5 = `Critical`).
impl TryFrom<i32> for LogLevel {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        Ok(match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Information,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            5 => LogLevel::Critical,
            other => return Err(Error::UnknownLevel(other)),
        })
    }
}

/// One entry of a scope chain.
#[derive(Clone, Copy)]
pub enum Scope<'a> {
    /// Named pairs, written like record attributes
    Attributes(&'a [Attribute<'a>]),
    /// An opaque value, written as its `Display` text
    Value(&'a dyn fmt::Display),
}

/// Yields the scopes that enclose a record.
///
/// The formatter writes scopes in exactly the order they are visited. The
/// providers in this crate visit the outermost scope first.
pub trait ScopeProvider {
    fn for_each_scope(&self, visit: &mut dyn FnMut(Scope<'_>));
}

impl ScopeProvider for Vec<Scope<'_>> {
    fn for_each_scope(&self, visit: &mut dyn FnMut(Scope<'_>)) {
        self.iter().for_each(|scope| visit(*scope));
    }
}

impl<const N: usize> ScopeProvider for [Scope<'_>; N] {
    fn for_each_scope(&self, visit: &mut dyn FnMut(Scope<'_>)) {
        self.iter().for_each(|scope| visit(*scope));
    }
}

/// A log entry, borrowed from the caller for the duration of one write.
///
/// # Examples
///
/// ```
/// # use json_logger::log_record::{LogLevel, LogRecord};
/// # use json_logger::log_value::Attribute;
/// let attributes = [Attribute::new("count", 3), Attribute::new("flag", true)];
/// let record = LogRecord::new(LogLevel::Information, "Test")
///     .with_event_id(5)
///     .with_message("hello")
///     .with_attributes(&attributes);
///
/// assert_eq!(record.attributes.len(), 2);
/// ```
#[derive(Clone, Copy)]
pub struct LogRecord<'a> {
    pub level: LogLevel,
    pub category: &'a str,
    pub event_id: i32,
    pub message: Option<&'a str>,
    pub exception: Option<&'a dyn fmt::Display>,
    pub attributes: &'a [Attribute<'a>],
    /// When the event happened; the formatter uses the current time if unset
    pub timestamp: Option<OffsetDateTime>,
    pub scopes: Option<&'a dyn ScopeProvider>,
}

impl<'a> LogRecord<'a> {
    /// A record with event id 0 and nothing else set. It produces no output
    /// until a message or an exception is added.
    pub fn new(level: LogLevel, category: &'a str) -> Self {
        Self {
            level,
            category,
            event_id: 0,
            message: None,
            exception: None,
            attributes: &[],
            timestamp: None,
            scopes: None,
        }
    }

    /// Sets the numeric `EventId`.
    pub fn with_event_id(mut self, event_id: i32) -> Self {
        self.event_id = event_id;
        self
    }

    /// Sets the message text.
    pub fn with_message(mut self, message: &'a str) -> Self {
        self.message = Some(message);
        self
    }

    /// Attaches an error, written through `Display` as `Exception`.
    pub fn with_exception(mut self, exception: &'a dyn fmt::Display) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Named values written after the message, in slice order.
    pub fn with_attributes(mut self, attributes: &'a [Attribute<'a>]) -> Self {
        self.attributes = attributes;
        self
    }

    /// Uses `timestamp` instead of the current time.
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The enclosing scopes, written only when scopes are enabled.
    pub fn with_scopes(mut self, scopes: &'a dyn ScopeProvider) -> Self {
        self.scopes = Some(scopes);
        self
    }
}

impl fmt::Debug for LogRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("level", &self.level)
            .field("category", &self.category)
            .field("event_id", &self.event_id)
            .field("message", &self.message)
            .field("exception", &self.exception.map(|e| e.to_string()))
            .field("attributes", &self.attributes)
            .field("timestamp", &self.timestamp)
            .field("has_scopes", &self.scopes.is_some())
            .finish()
    }
}
