//! The JSON line formatter.
//!
//! [`JsonConsoleFormatter`] turns one [`LogRecord`] into one line of JSON:
//!
//! ```text
//! {"Timestamp":"..","EventId":5,"LogLevel":"Information","Category":"Test","Message":"hello",<attributes>,<scopes>}
//! ```
//!
//! `Timestamp` appears only when a timestamp format is configured. A record
//! with neither a message nor an exception produces no output at all.
//!
//! Each write encodes into a buffer rented from the shared byte pool and
//! hands the finished line to the destination in a single call, so lines from
//! concurrent writers never interleave inside the formatter.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;

use time::{OffsetDateTime, UtcOffset};

use crate::error::{Error, Result};
use crate::formatter_options::{FormatterOptions, FormatterSnapshot, OptionsMonitor};
use crate::json_writer::JsonWriter;
use crate::log_record::{LogRecord, Scope, ScopeProvider};
use crate::pooled_writer::{PooledBufferWriter, Stream, DEFAULT_BUFFER_SIZE};
use crate::text_sink::{TextSink, LINE_TERMINATOR};

/// Name of the array holding scopes that carry no named pairs.
pub const SCOPES_FIELD: &str = "Scopes";

const TIMESTAMP_STACK_LEN: usize = 128;

thread_local! {
    // One writer per thread, holding no memory between calls.
    static CACHED_OUTPUT: RefCell<Option<PooledBufferWriter>> = const { RefCell::new(None) };
}

/// Formats log records as single-line JSON objects.
///
/// The formatter is `Sync`; share it behind an `Arc` and call
/// [`JsonConsoleFormatter::write`] from any number of threads.
///
/// # Examples
///
/// ```
/// # use json_logger::json_formatter::JsonConsoleFormatter;
/// # use json_logger::formatter_options::FormatterOptions;
/// # use json_logger::log_record::{LogLevel, LogRecord};
/// let formatter = JsonConsoleFormatter::new(FormatterOptions::default()).unwrap();
/// let record = LogRecord::new(LogLevel::Information, "Test")
///     .with_event_id(5)
///     .with_message("hello");
///
/// let mut line = String::new();
/// formatter.write(&record, &mut line).unwrap();
/// assert_eq!(
///     line.trim_end(),
///     r#"{"EventId":5,"LogLevel":"Information","Category":"Test","Message":"hello"}"#
/// );
/// ```
#[derive(Debug, Clone)]
pub struct JsonConsoleFormatter {
    monitor: Arc<OptionsMonitor>,
}

impl JsonConsoleFormatter {
    /// Name under which hosts register this formatter.
    pub const NAME: &'static str = "json";

    /// Creates a formatter with its own options monitor.
    ///
    /// # Errors
    ///
    /// Fails if the timestamp format description does not parse.
    pub fn new(options: FormatterOptions) -> Result<Self> {
        Ok(Self::with_monitor(Arc::new(OptionsMonitor::new(options)?)))
    }

    /// Creates a formatter that follows a shared options monitor.
    pub fn with_monitor(monitor: Arc<OptionsMonitor>) -> Self {
        Self { monitor }
    }

    /// The monitor this formatter reads its options from.
    pub fn monitor(&self) -> &Arc<OptionsMonitor> {
        &self.monitor
    }

    /// Swaps in new options. Writes already in progress finish with the
    /// options they started with.
    pub fn reload(&self, options: FormatterOptions) -> Result<()> {
        self.monitor.reload(options)
    }

    /// The options the next write will use.
    pub fn options(&self) -> Arc<FormatterSnapshot> {
        self.monitor.snapshot()
    }

    /// Formats `record` and writes the line, terminator included, to `sink`
    /// in one call.
    ///
    /// # Errors
    ///
    /// Capacity errors and sink failures are returned unchanged. Nothing
    /// reaches the sink when encoding fails.
    pub fn write<S: TextSink + ?Sized>(&self, record: &LogRecord<'_>, sink: &mut S) -> Result<()> {
        if is_empty(record) {
            return Ok(());
        }
        let snapshot = self.monitor.snapshot();

        let mut output = rent_output()?;
        encode_line(&snapshot, record, &mut output)?;
        output.flush()?;
        sink.write_utf8(output.written())?;
        return_output(output);
        Ok(())
    }

    /// Formats `record` into a stream-mode writer and flushes it, delivering
    /// the line to the writer's destination in one write.
    ///
    /// On failure the writer is cleared, so a later record never carries
    /// leftovers of this one.
    pub fn write_to_stream<W: io::Write>(
        &self,
        record: &LogRecord<'_>,
        output: &mut PooledBufferWriter<Stream<W>>,
    ) -> Result<()> {
        if is_empty(record) {
            return Ok(());
        }
        let snapshot = self.monitor.snapshot();

        let result = encode_line(&snapshot, record, &mut *output)
            .and_then(|()| output.flush().map_err(Error::from));
        if result.is_err() {
            output.clear();
        }
        result
    }
}

fn is_empty(record: &LogRecord<'_>) -> bool {
    record.message.is_none() && record.exception.is_none()
}

// The cache slot is unreachable while thread-locals are being destroyed, so
// records logged from destructors at thread exit use a fresh writer.
fn rent_output() -> Result<PooledBufferWriter> {
    let mut output = CACHED_OUTPUT
        .try_with(|cached| cached.borrow_mut().take())
        .ok()
        .flatten()
        .unwrap_or_else(PooledBufferWriter::empty_for_caching);
    output.initialize_empty(DEFAULT_BUFFER_SIZE)?;
    Ok(output)
}

fn return_output(mut output: PooledBufferWriter) {
    output.clear_and_return_buffers();
    // On teardown the writer is simply dropped.
    let _ = CACHED_OUTPUT.try_with(move |cached| *cached.borrow_mut() = Some(output));
}

/// Writes the JSON object and the line terminator.
fn encode_line<W: io::Write>(snapshot: &FormatterSnapshot, record: &LogRecord<'_>, mut out: W) -> Result<()> {
    let options = snapshot.options();
    let mut writer = JsonWriter::new(&mut out, options.json_writer_options);
    writer.write_start_object()?;

    if let Some(format) = snapshot.timestamp_format() {
        let timestamp = resolve_timestamp(record.timestamp, options.use_utc_timestamp);
        let mut stack = [0u8; TIMESTAMP_STACK_LEN];
        let mut cursor = io::Cursor::new(&mut stack[..]);
        match timestamp.format_into(&mut cursor, format) {
            Ok(len) => {
                let text = std::str::from_utf8(&stack[..len])?;
                writer.write_string("Timestamp", text)?;
            }
            // Longer than the stack buffer
            Err(time::error::Format::StdIo(_)) => {
                writer.write_string("Timestamp", &timestamp.format(format)?)?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    writer.write_number("EventId", record.event_id)?;
    writer.write_string("LogLevel", record.level.as_str())?;
    writer.write_string("Category", record.category)?;
    match record.message {
        Some(message) => writer.write_string("Message", message)?,
        None => writer.write_null("Message")?,
    }
    if let Some(exception) = record.exception {
        writer.write_display("Exception", exception)?;
    }

    for attribute in record.attributes {
        attribute.value.write_property(attribute.name, &mut writer)?;
    }

    if options.include_scopes {
        if let Some(scopes) = record.scopes {
            write_scopes(&mut writer, scopes)?;
        }
    }

    writer.write_end_object()?;
    drop(writer);
    out.write_all(LINE_TERMINATOR.as_bytes())?;
    Ok(())
}

/// Picks the instant to print: the record's own timestamp if it has one,
/// otherwise now, in UTC or the local offset.
fn resolve_timestamp(timestamp: Option<OffsetDateTime>, use_utc: bool) -> OffsetDateTime {
    match (timestamp, use_utc) {
        (Some(timestamp), true) => timestamp.to_offset(UtcOffset::UTC),
        (Some(timestamp), false) => match UtcOffset::local_offset_at(timestamp) {
            Ok(offset) => timestamp.to_offset(offset),
            Err(_) => timestamp,
        },
        (None, true) => OffsetDateTime::now_utc(),
        (None, false) => OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
    }
}

/// Writes the scope chain in visiting order: named pairs inline, then the
/// remaining scopes as strings under [`SCOPES_FIELD`].
fn write_scopes<W: io::Write>(writer: &mut JsonWriter<W>, scopes: &dyn ScopeProvider) -> io::Result<()> {
    let mut result = Ok(());
    // Opaque scopes rendered back to back; `ends` marks where each one stops.
    let mut opaque = String::new();
    let mut ends = Vec::new();
    scopes.for_each_scope(&mut |scope| {
        if result.is_err() {
            return;
        }
        match scope {
            Scope::Attributes(attributes) => {
                for attribute in attributes {
                    if let Err(err) = attribute.value.write_property(attribute.name, writer) {
                        result = Err(err);
                        return;
                    }
                }
            }
            Scope::Value(value) => match write!(opaque, "{}", value) {
                Ok(()) => ends.push(opaque.len()),
                Err(err) => result = Err(io::Error::other(err)),
            },
        }
    });
    result?;
    if ends.is_empty() {
        return Ok(());
    }

    writer.write_start_array(SCOPES_FIELD)?;
    let mut start = 0;
    for end in ends {
        writer.write_string_value(&opaque[start..end])?;
        start = end;
    }
    writer.write_end_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_record::LogLevel;
    use crate::log_value::Attribute;
    use std::cell::Cell;

    /// Yields a fixed chain and counts how often it was walked.
    struct CountingScopes {
        walks: Cell<usize>,
    }

    impl ScopeProvider for CountingScopes {
        fn for_each_scope(&self, visit: &mut dyn FnMut(Scope<'_>)) {
            self.walks.set(self.walks.get() + 1);
            let tenant = [Attribute::new("Tenant", "acme")];
            visit(Scope::Value(&"outer"));
            visit(Scope::Attributes(&tenant));
            visit(Scope::Value(&"inner \"quoted\""));
        }
    }

    fn format(formatter: &JsonConsoleFormatter, record: &LogRecord<'_>) -> String {
        let mut line = String::new();
        formatter.write(record, &mut line).unwrap();
        line
    }

    #[test]
    fn test_exception_without_message() {
        let formatter = JsonConsoleFormatter::new(FormatterOptions::default()).unwrap();
        let error = "disk full";
        let record = LogRecord::new(LogLevel::Error, "Io").with_exception(&error);
        assert_eq!(
            format(&formatter, &record),
            format!(
                "{}{}",
                r#"{"EventId":0,"LogLevel":"Error","Category":"Io","Message":null,"Exception":"disk full"}"#,
                LINE_TERMINATOR
            )
        );
    }

    #[test]
    fn test_fixed_timestamp_in_utc() {
        let formatter = JsonConsoleFormatter::new(FormatterOptions {
            timestamp_format: Some("[year]-[month]-[day]T[hour]:[minute]:[second]".to_string()),
            use_utc_timestamp: true,
            ..Default::default()
        })
        .unwrap();
        let at = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let record = LogRecord::new(LogLevel::Debug, "Clock").with_message("tick").with_timestamp(at);
        assert!(format(&formatter, &record).starts_with(r#"{"Timestamp":"1970-01-01T00:00:00","EventId":0"#));
    }

    #[test]
    fn test_long_timestamp_falls_back_to_heap() {
        let long_format = "[year]-[month]-[day] ".repeat(20);
        let formatter = JsonConsoleFormatter::new(FormatterOptions {
            timestamp_format: Some(long_format),
            use_utc_timestamp: true,
            ..Default::default()
        })
        .unwrap();
        let at = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let record = LogRecord::new(LogLevel::Debug, "Clock").with_message("tick").with_timestamp(at);
        let line = format(&formatter, &record);
        assert!(line.contains(&"1970-01-01 ".repeat(20)));
    }

    #[test]
    fn test_scopes_named_and_opaque() {
        let formatter = JsonConsoleFormatter::new(FormatterOptions {
            include_scopes: true,
            ..Default::default()
        })
        .unwrap();
        let request = [Attribute::new("RequestId", "r-1")];
        let operation = "checkout";
        let scopes = [Scope::Attributes(&request), Scope::Value(&operation)];
        let record = LogRecord::new(LogLevel::Information, "Shop")
            .with_message("paid")
            .with_scopes(&scopes);
        assert_eq!(
            format(&formatter, &record).trim_end(),
            r#"{"EventId":0,"LogLevel":"Information","Category":"Shop","Message":"paid","RequestId":"r-1","Scopes":["checkout"]}"#
        );
    }

    #[test]
    fn test_scopes_ignored_when_disabled() {
        let formatter = JsonConsoleFormatter::new(FormatterOptions::default()).unwrap();
        let operation = "checkout";
        let scopes = [Scope::Value(&operation)];
        let record = LogRecord::new(LogLevel::Information, "Shop")
            .with_message("paid")
            .with_scopes(&scopes);
        assert!(!format(&formatter, &record).contains("Scopes"));
    }

    #[test]
    fn test_stream_mode_single_delivery() {
        let formatter = JsonConsoleFormatter::new(FormatterOptions::default()).unwrap();
        let mut output = PooledBufferWriter::with_destination(DEFAULT_BUFFER_SIZE, Vec::new()).unwrap();
        let record = LogRecord::new(LogLevel::Warning, "Disk").with_message("low");
        formatter.write_to_stream(&record, &mut output).unwrap();
        formatter.write_to_stream(&record, &mut output).unwrap();

        assert_eq!(output.unflushed_bytes(), 0);
        let text = String::from_utf8(output.into_destination()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_scope_chain_is_walked_once() {
        let formatter = JsonConsoleFormatter::new(FormatterOptions {
            include_scopes: true,
            ..Default::default()
        })
        .unwrap();
        let scopes = CountingScopes { walks: Cell::new(0) };
        let record = LogRecord::new(LogLevel::Information, "Shop")
            .with_message("paid")
            .with_scopes(&scopes);

        assert_eq!(
            format(&formatter, &record).trim_end(),
            r#"{"EventId":0,"LogLevel":"Information","Category":"Shop","Message":"paid","Tenant":"acme","Scopes":["outer","inner \"quoted\""]}"#
        );
        assert_eq!(scopes.walks.get(), 1);
    }

    #[test]
    fn test_local_timestamp_keeps_the_instant() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(resolve_timestamp(Some(at), false), at, "Changing offset must not move the instant");

        let before = OffsetDateTime::now_utc();
        let now = resolve_timestamp(None, false);
        assert!(now >= before - time::Duration::seconds(1));
    }

    #[test]
    fn test_local_timestamp_is_written() {
        let formatter = JsonConsoleFormatter::new(FormatterOptions {
            timestamp_format: Some("[year]".to_string()),
            use_utc_timestamp: false,
            ..Default::default()
        })
        .unwrap();
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let record = LogRecord::new(LogLevel::Information, "Clock").with_message("tick").with_timestamp(at);
        assert!(format(&formatter, &record).starts_with(r#"{"Timestamp":"2023","#));
    }
}
