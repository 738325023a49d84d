use json_logger::{
    Attribute, Decimal, FormatterOptions, JsonConsoleFormatter, JsonWriterOptions, LogLevel, LogRecord,
    LogValue, Scope, TextSink, Utf16TextSink, LINE_TERMINATOR,
};
use std::io;
use std::sync::Arc;
use std::thread;
use time::OffsetDateTime;

fn formatter(options: FormatterOptions) -> JsonConsoleFormatter {
    JsonConsoleFormatter::new(options).unwrap()
}

fn format_line(formatter: &JsonConsoleFormatter, record: &LogRecord<'_>) -> String {
    let mut line = String::new();
    formatter.write(record, &mut line).unwrap();
    line
}

/// Records every call so tests can count writes.
#[derive(Default)]
struct CallRecorder {
    calls: Vec<String>,
}

impl TextSink for CallRecorder {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.calls.push(text.to_string());
        Ok(())
    }
}

struct FailingSink;

impl TextSink for FailingSink {
    fn write_text(&mut self, _text: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "console closed"))
    }
}

#[test]
fn test_basic_record() {
    let formatter = formatter(FormatterOptions::default());
    let record = LogRecord::new(LogLevel::Information, "Test").with_event_id(5).with_message("hello");

    let line = format_line(&formatter, &record);
    assert_eq!(
        line,
        format!(
            "{}{}",
            r#"{"EventId":5,"LogLevel":"Information","Category":"Test","Message":"hello"}"#,
            LINE_TERMINATOR
        )
    );
    assert!(!line.contains("Timestamp"), "No timestamp field without a configured format");
}

#[test]
fn test_attributes_follow_message_in_order() {
    let formatter = formatter(FormatterOptions::default());
    let attributes = [Attribute::new("count", 3), Attribute::new("flag", true)];
    let record = LogRecord::new(LogLevel::Information, "Test")
        .with_event_id(5)
        .with_message("hello")
        .with_attributes(&attributes);

    assert_eq!(
        format_line(&formatter, &record).trim_end(),
        r#"{"EventId":5,"LogLevel":"Information","Category":"Test","Message":"hello","count":3,"flag":true}"#
    );
}

#[test]
fn test_no_message_no_exception_writes_nothing() {
    let formatter = formatter(FormatterOptions::default());
    let attributes = [Attribute::new("count", 3)];
    let record = LogRecord::new(LogLevel::Warning, "Test").with_attributes(&attributes);

    let mut sink = CallRecorder::default();
    formatter.write(&record, &mut sink).unwrap();
    assert!(sink.calls.is_empty(), "The whole call is a no-op, not just the field");
}

#[test]
fn test_empty_message_is_still_written() {
    let formatter = formatter(FormatterOptions::default());
    let record = LogRecord::new(LogLevel::Trace, "Test").with_message("");
    assert!(format_line(&formatter, &record).contains(r#""Message":"""#));
}

#[test]
fn test_each_record_is_one_sink_write() {
    let formatter = formatter(FormatterOptions::default());
    let record = LogRecord::new(LogLevel::Information, "Test").with_message("one");

    let mut sink = CallRecorder::default();
    formatter.write(&record, &mut sink).unwrap();
    formatter.write(&record, &mut sink).unwrap();
    assert_eq!(sink.calls.len(), 2);
    assert!(sink.calls.iter().all(|call| call.ends_with(LINE_TERMINATOR)));
}

#[test]
fn test_sink_failure_is_returned() {
    let formatter = formatter(FormatterOptions::default());
    let record = LogRecord::new(LogLevel::Information, "Test").with_message("lost");
    match formatter.write(&record, &mut FailingSink) {
        Err(json_logger::Error::Io(err)) => assert_eq!(err.to_string(), "console closed"),
        other => panic!("expected io error, got {:?}", other),
    }
}

#[test]
fn test_exception_text() {
    let formatter = formatter(FormatterOptions::default());
    let failure = io::Error::new(io::ErrorKind::NotFound, "config.json missing\n  at load()");
    let record = LogRecord::new(LogLevel::Critical, "Startup")
        .with_event_id(-1)
        .with_message("cannot start")
        .with_exception(&failure);

    let value: serde_json::Value = serde_json::from_str(&format_line(&formatter, &record)).unwrap();
    assert_eq!(value["EventId"], -1);
    assert_eq!(value["LogLevel"], "Critical");
    assert_eq!(value["Exception"], "config.json missing\n  at load()");
}

#[test]
fn test_every_value_kind() {
    let formatter = formatter(FormatterOptions::default());
    let point = (3, 4);
    let label = format!("{:?}", point);
    let attributes = [
        Attribute::new("b", false),
        Attribute::new("i8", i8::MIN),
        Attribute::new("i16", i16::MAX),
        Attribute::new("i32", -7i32),
        Attribute::new("i64", i64::MAX),
        Attribute::new("u8", u8::MAX),
        Attribute::new("u16", 65535u16),
        Attribute::new("u32", u32::MAX),
        Attribute::new("u64", u64::MAX),
        Attribute::new("c", 'é'),
        Attribute::new("d", Decimal::new(-1050, 2).unwrap()),
        Attribute::new("f32", 1.5f32),
        Attribute::new("f64", -0.25f64),
        Attribute::new("nothing", LogValue::Null),
        Attribute::new("s", "text"),
        Attribute::display("other", &label),
    ];
    let record = LogRecord::new(LogLevel::Debug, "Kinds").with_message("all").with_attributes(&attributes);
    let line = format_line(&formatter, &record);

    assert!(line.contains(r#""u64":18446744073709551615"#), "u64 must be an integer literal");
    assert!(line.contains(r#""d":-10.50"#), "Decimals keep their scale");
    assert!(line.contains(r#""c":"é""#));
    assert!(line.contains(r#""nothing":null"#));
    assert!(line.contains(r#""other":"(3, 4)""#));

    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["b"], false);
    assert_eq!(value["i8"], -128);
    assert_eq!(value["i64"], i64::MAX);
    assert_eq!(value["u64"].as_u64(), Some(u64::MAX));
    assert_eq!(value["f32"], 1.5);
    assert_eq!(value["s"], "text");
}

#[test]
fn test_timestamp_uses_record_time_in_utc() {
    let formatter = formatter(FormatterOptions {
        timestamp_format: Some("[year]-[month]-[day] [hour]:[minute]:[second]".to_string()),
        use_utc_timestamp: true,
        ..Default::default()
    });
    let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    let record = LogRecord::new(LogLevel::Information, "Clock").with_message("tick").with_timestamp(at);

    let value: serde_json::Value = serde_json::from_str(&format_line(&formatter, &record)).unwrap();
    assert_eq!(value["Timestamp"], "2023-11-14 22:13:20");
}

#[test]
fn test_timestamp_is_first_field() {
    let formatter = formatter(FormatterOptions {
        timestamp_format: Some("[hour]:[minute]".to_string()),
        use_utc_timestamp: true,
        ..Default::default()
    });
    let record = LogRecord::new(LogLevel::Information, "Clock").with_message("now");
    let line = format_line(&formatter, &record);
    assert!(line.starts_with(r#"{"Timestamp":""#), "got {}", line);
}

#[test]
fn test_scopes_keep_caller_order() {
    let formatter = formatter(FormatterOptions {
        include_scopes: true,
        ..Default::default()
    });
    let outer = [Attribute::new("Tenant", "acme")];
    let inner = [Attribute::new("RequestId", 17u32)];
    let first = "first";
    let second = 2;
    let scopes = vec![
        Scope::Value(&first),
        Scope::Attributes(&outer),
        Scope::Value(&second),
        Scope::Attributes(&inner),
    ];
    let record = LogRecord::new(LogLevel::Information, "Web").with_message("ok").with_scopes(&scopes);

    assert_eq!(
        format_line(&formatter, &record).trim_end(),
        r#"{"EventId":0,"LogLevel":"Information","Category":"Web","Message":"ok","Tenant":"acme","RequestId":17,"Scopes":["first","2"]}"#
    );
}

#[test]
fn test_indented_output() {
    let formatter = formatter(FormatterOptions {
        json_writer_options: JsonWriterOptions {
            indented: true,
            escape_non_ascii: false,
        },
        ..Default::default()
    });
    let record = LogRecord::new(LogLevel::Information, "Test").with_event_id(1).with_message("hi");
    let line = format_line(&formatter, &record);
    assert!(line.starts_with("{\n  \"EventId\": 1,\n"));
    assert!(line.ends_with(&format!("}}{}", LINE_TERMINATOR)));
}

#[test]
fn test_non_ascii_escaping_option() {
    let formatter = formatter(FormatterOptions {
        json_writer_options: JsonWriterOptions {
            indented: false,
            escape_non_ascii: true,
        },
        ..Default::default()
    });
    let record = LogRecord::new(LogLevel::Information, "Größe").with_message("naïve");
    let line = format_line(&formatter, &record);
    assert!(line.is_ascii());
    assert!(line.contains(r#""Category":"Gr\u00f6\u00dfe""#));

    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["Message"], "naïve");
}

#[test]
fn test_reload_applies_to_next_write() {
    let formatter = formatter(FormatterOptions::default());
    let record = LogRecord::new(LogLevel::Information, "Test").with_message("hi");
    let before = formatter.options();

    formatter
        .reload(FormatterOptions::from_json(r#"{"timestamp_format":"[year]","use_utc_timestamp":true}"#).unwrap())
        .unwrap();

    assert!(before.timestamp_format().is_none(), "Old snapshots are never mutated");
    assert!(format_line(&formatter, &record).starts_with(r#"{"Timestamp":"#));
    assert_eq!(formatter.monitor().epoch(), 1);
}

#[test]
fn test_invalid_reload_keeps_previous_options() {
    let formatter = formatter(FormatterOptions::default());
    let bad = FormatterOptions {
        timestamp_format: Some("[not_a_component]".to_string()),
        ..Default::default()
    };
    assert!(formatter.reload(bad).is_err());

    let record = LogRecord::new(LogLevel::Information, "Test").with_message("hi");
    assert!(!format_line(&formatter, &record).contains("Timestamp"));
}

#[test]
fn test_utf16_destination() {
    let formatter = formatter(FormatterOptions::default());
    let record = LogRecord::new(LogLevel::Information, "Test").with_message("π");
    let mut sink = Utf16TextSink::new(Vec::new());
    formatter.write(&record, &mut sink).unwrap();

    let bytes = sink.into_inner();
    let units: Vec<u16> = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();
    let text = String::from_utf16(&units).unwrap();
    assert_eq!(text, format_line(&formatter, &record));
}

#[test]
fn test_large_record_grows_buffer() {
    let formatter = formatter(FormatterOptions::default());
    let message = "m".repeat(100_000);
    let record = LogRecord::new(LogLevel::Information, "Big").with_message(&message);
    let value: serde_json::Value = serde_json::from_str(&format_line(&formatter, &record)).unwrap();
    assert_eq!(value["Message"].as_str().map(str::len), Some(100_000));
}

#[test]
fn test_concurrent_writers_do_not_interfere() {
    let formatter = Arc::new(formatter(FormatterOptions::default()));
    let handles: Vec<_> = (0..8)
        .map(|thread_id| {
            let formatter = Arc::clone(&formatter);
            thread::spawn(move || {
                let category = format!("thread-{}", thread_id);
                let mut lines = String::new();
                for i in 0..200 {
                    let message = format!("message {} from {}", i, thread_id);
                    let attributes = [Attribute::new("i", i), Attribute::new("thread", thread_id)];
                    let record = LogRecord::new(LogLevel::Information, &category)
                        .with_message(&message)
                        .with_attributes(&attributes);
                    formatter.write(&record, &mut lines).unwrap();
                }
                (thread_id, lines)
            })
        })
        .collect();

    for handle in handles {
        let (thread_id, lines) = handle.join().unwrap();
        let mut count = 0;
        for (i, line) in lines.lines().enumerate() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["thread"], thread_id);
            assert_eq!(value["i"], i);
            assert_eq!(value["Message"], format!("message {} from {}", i, thread_id));
            count += 1;
        }
        assert_eq!(count, 200);
    }
}

/// Writes one record when its thread-local slot is torn down.
struct LogOnThreadExit {
    formatter: JsonConsoleFormatter,
    outcome: Arc<std::sync::Mutex<Option<json_logger::Result<String>>>>,
}

impl Drop for LogOnThreadExit {
    fn drop(&mut self) {
        let record = LogRecord::new(LogLevel::Information, "Exit").with_message("thread ending");
        let mut line = String::new();
        let outcome = self.formatter.write(&record, &mut line).map(|()| line);
        *self.outcome.lock().unwrap() = Some(outcome);
    }
}

thread_local! {
    static EXIT_LOGGER: std::cell::RefCell<Option<LogOnThreadExit>> = const { std::cell::RefCell::new(None) };
}

#[test]
fn test_logging_from_thread_local_destructor() {
    let formatter = formatter(FormatterOptions::default());
    let outcome = Arc::new(std::sync::Mutex::new(None));

    let worker_formatter = formatter.clone();
    let worker_outcome = Arc::clone(&outcome);
    thread::spawn(move || {
        // Registered before the formatter's own cache, so it is destroyed after it.
        EXIT_LOGGER.with(|slot| {
            *slot.borrow_mut() = Some(LogOnThreadExit {
                formatter: worker_formatter.clone(),
                outcome: worker_outcome,
            })
        });
        let record = LogRecord::new(LogLevel::Information, "Worker").with_message("working");
        let mut line = String::new();
        worker_formatter.write(&record, &mut line).unwrap();
    })
    .join()
    .unwrap();

    let line = outcome.lock().unwrap().take().expect("destructor ran").unwrap();
    assert_eq!(
        line.trim_end(),
        r#"{"EventId":0,"LogLevel":"Information","Category":"Exit","Message":"thread ending"}"#
    );
}
