//! `tracing` integration.
//!
//! [`JsonLayer`] is a `tracing_subscriber` layer that writes one JSON line per
//! event. Event fields become attributes, with three reserved names:
//!
//! * `message` fills the `Message` field,
//! * `exception` (or `error`) fills the `Exception` field,
//! * `event_id` fills the `EventId` field.
//!
//! When scopes are enabled, the spans around the event form the scope chain,
//! outermost first. A span with fields contributes them as named pairs; a
//! span without fields contributes its name.
//!
//! # Examples
//!
//! ```
//! use json_logger::formatter_options::FormatterOptions;
//! use json_logger::json_formatter::JsonConsoleFormatter;
//! use json_logger::tracing_layer::JsonLayer;
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let formatter = JsonConsoleFormatter::new(FormatterOptions::default()).unwrap();
//! let subscriber = tracing_subscriber::registry().with(JsonLayer::new(formatter));
//!
//! tracing::subscriber::with_default(subscriber, || {
//!     tracing::info!(count = 3, "started");
//! });
//! ```

use std::fmt;
use std::io;

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::json_formatter::JsonConsoleFormatter;
use crate::log_record::{LogLevel, LogRecord, Scope, ScopeProvider};
use crate::log_value::{OwnedFields, OwnedValue};
use crate::text_sink::IoTextSink;

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Information,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::TRACE => LogLevel::Trace,
        }
    }
}

/// Fields recorded on a span, kept in the span's extensions.
struct SpanFields(OwnedFields);

/// A layer writing JSON lines through a [`MakeWriter`].
pub struct JsonLayer<M = fn() -> io::Stderr> {
    formatter: JsonConsoleFormatter,
    make_writer: M,
}

impl JsonLayer {
    /// A layer writing to standard error.
    pub fn new(formatter: JsonConsoleFormatter) -> Self {
        Self {
            formatter,
            make_writer: io::stderr,
        }
    }
}

impl<M> JsonLayer<M> {
    /// Replaces the destination.
    pub fn with_writer<M2>(self, make_writer: M2) -> JsonLayer<M2>
    where
        M2: for<'w> MakeWriter<'w> + 'static,
    {
        JsonLayer {
            formatter: self.formatter,
            make_writer,
        }
    }

    /// The formatter, for reloading options.
    pub fn formatter(&self) -> &JsonConsoleFormatter {
        &self.formatter
    }
}

impl<S, M> Layer<S> for JsonLayer<M>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    M: for<'w> MakeWriter<'w> + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = OwnedFields::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            values.record(&mut FieldVisitor(fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut fields = OwnedFields::new();
        event.record(&mut FieldVisitor(&mut fields));
        let message = fields.take("message").map(OwnedValue::into_text);
        let exception = fields
            .take("exception")
            .or_else(|| fields.take("error"))
            .map(OwnedValue::into_text);
        if message.is_none() && exception.is_none() {
            return;
        }
        let event_id = fields.take("event_id").and_then(|id| id.to_i32()).unwrap_or(0);
        let attributes = fields.attributes();

        let mut record = LogRecord::new(metadata.level().into(), metadata.target())
            .with_event_id(event_id)
            .with_attributes(&attributes);
        if let Some(message) = &message {
            record = record.with_message(message);
        }
        if let Some(exception) = &exception {
            record = record.with_exception(exception);
        }

        // Whether scopes are written is up to the snapshot the formatter loads.
        let scopes = SpanScopes { ctx: &ctx, event };
        record = record.with_scopes(&scopes);

        let mut sink = IoTextSink::new(self.make_writer.make_writer_for(metadata));
        // Reporting the failure through tracing would re-enter this layer.
        let _ = self.formatter.write(&record, &mut sink);
    }
}

/// The spans around an event, walked outermost first only when the formatter
/// asks for them.
struct SpanScopes<'a, 'c, 'e, S> {
    ctx: &'a Context<'c, S>,
    event: &'a Event<'e>,
}

impl<S> ScopeProvider for SpanScopes<'_, '_, '_, S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn for_each_scope(&self, visit: &mut dyn FnMut(Scope<'_>)) {
        let Some(spans) = self.ctx.event_scope(self.event) else { return };
        for span in spans.from_root() {
            let extensions = span.extensions();
            match extensions.get::<SpanFields>() {
                Some(SpanFields(fields)) if !fields.is_empty() => {
                    let attributes = fields.attributes();
                    visit(Scope::Attributes(&attributes));
                }
                _ => {
                    let name = span.name();
                    visit(Scope::Value(&name));
                }
            }
        }
    }
}

struct FieldVisitor<'a>(&'a mut OwnedFields);

impl Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.push(field.name(), OwnedValue::F64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.push(field.name(), OwnedValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.push(field.name(), OwnedValue::U64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.push(field.name(), OwnedValue::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push(field.name(), OwnedValue::Text(value.to_owned()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.0.push(field.name(), OwnedValue::Text(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push(field.name(), OwnedValue::Text(format!("{:?}", value)));
    }
}
