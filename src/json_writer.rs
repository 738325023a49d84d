//! Streaming JSON token writer.
//!
//! [`JsonWriter`] emits objects, arrays, property names and primitive tokens
//! straight into any `io::Write`, using `serde_json`'s [`Formatter`] for the
//! layout (compact or indented). Nothing is built in memory first: strings are
//! escaped while they are copied, and `Display` values are escaped as they are
//! formatted.
//!
//! The writer trusts its caller to produce a well-formed document; it keeps
//! only the state the formatter needs.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::{CharEscape, CompactFormatter, Formatter, PrettyFormatter};

use crate::log_value::{Decimal, DECIMAL_TEXT_LEN};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Layout and escaping options for [`JsonWriter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonWriterOptions {
    /// Pretty-print with two-space indentation instead of a single line.
    pub indented: bool,
    /// Escape every non-ASCII character as `\uXXXX`.
    pub escape_non_ascii: bool,
}

enum Layout {
    Compact(CompactFormatter),
    Indented(PrettyFormatter<'static>),
}

macro_rules! delegate {
    ($($method:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            #[inline]
            fn $method<W>(&mut self, writer: &mut W $(, $arg: $ty)*) -> io::Result<()>
            where
                W: ?Sized + io::Write,
            {
                match self {
                    Layout::Compact(f) => f.$method(writer $(, $arg)*),
                    Layout::Indented(f) => f.$method(writer $(, $arg)*),
                }
            }
        )*
    };
}

impl Formatter for Layout {
    delegate! {
        begin_array();
        end_array();
        begin_array_value(first: bool);
        end_array_value();
        begin_object();
        end_object();
        begin_object_key(first: bool);
        end_object_key();
        begin_object_value();
        end_object_value();
    }
}

/// A number that has a JSON literal form.
pub trait JsonNumber: Copy {
    /// Writes the literal through `formatter`.
    fn write_number<F, W>(self, formatter: &mut F, writer: &mut W) -> io::Result<()>
    where
        F: Formatter,
        W: ?Sized + io::Write;
}

macro_rules! integer_number {
    ($($ty:ty => $method:ident),*) => {
        $(
            impl JsonNumber for $ty {
                #[inline]
                fn write_number<F, W>(self, formatter: &mut F, writer: &mut W) -> io::Result<()>
                where
                    F: Formatter,
                    W: ?Sized + io::Write,
                {
                    formatter.$method(writer, self)
                }
            }
        )*
    };
}

integer_number!(
    i8 => write_i8, i16 => write_i16, i32 => write_i32, i64 => write_i64,
    u8 => write_u8, u16 => write_u16, u32 => write_u32, u64 => write_u64
);

// JSON has no NaN or infinity; those become null.
impl JsonNumber for f32 {
    fn write_number<F, W>(self, formatter: &mut F, writer: &mut W) -> io::Result<()>
    where
        F: Formatter,
        W: ?Sized + io::Write,
    {
        if self.is_finite() {
            formatter.write_f32(writer, self)
        } else {
            formatter.write_null(writer)
        }
    }
}

impl JsonNumber for f64 {
    fn write_number<F, W>(self, formatter: &mut F, writer: &mut W) -> io::Result<()>
    where
        F: Formatter,
        W: ?Sized + io::Write,
    {
        if self.is_finite() {
            formatter.write_f64(writer, self)
        } else {
            formatter.write_null(writer)
        }
    }
}

impl JsonNumber for Decimal {
    fn write_number<F, W>(self, formatter: &mut F, writer: &mut W) -> io::Result<()>
    where
        F: Formatter,
        W: ?Sized + io::Write,
    {
        let mut text = [0u8; DECIMAL_TEXT_LEN];
        formatter.write_number_str(writer, self.render(&mut text))
    }
}

/// Writes JSON tokens into `W`.
///
/// Property methods (`write_string`, `write_number`, ...) write a name/value
/// pair and belong inside an object; `*_value` methods write a bare value and
/// belong inside an array.
///
/// # Examples
///
/// ```
/// # use json_logger::json_writer::{JsonWriter, JsonWriterOptions};
/// let mut out = Vec::new();
/// let mut writer = JsonWriter::new(&mut out, JsonWriterOptions::default());
/// writer.write_start_object().unwrap();
/// writer.write_number("EventId", 7).unwrap();
/// writer.write_string("Message", "say \"hi\"").unwrap();
/// writer.write_end_object().unwrap();
///
/// assert_eq!(out, br#"{"EventId":7,"Message":"say \"hi\""}"#);
/// ```
pub struct JsonWriter<W: io::Write> {
    out: W,
    layout: Layout,
    escape_non_ascii: bool,
    first: bool,
}

impl<W: io::Write> JsonWriter<W> {
    /// Creates a writer emitting into `out`.
    pub fn new(out: W, options: JsonWriterOptions) -> Self {
        let layout = if options.indented {
            Layout::Indented(PrettyFormatter::new())
        } else {
            Layout::Compact(CompactFormatter)
        };
        Self {
            out,
            layout,
            escape_non_ascii: options.escape_non_ascii,
            first: true,
        }
    }

    /// Opens the top-level object.
    pub fn write_start_object(&mut self) -> io::Result<()> {
        self.layout.begin_object(&mut self.out)?;
        self.first = true;
        Ok(())
    }

    /// Closes the innermost object.
    pub fn write_end_object(&mut self) -> io::Result<()> {
        self.layout.end_object(&mut self.out)?;
        self.first = false;
        Ok(())
    }

    /// Opens an array stored under `name`.
    pub fn write_start_array(&mut self, name: &str) -> io::Result<()> {
        self.write_name(name)?;
        self.layout.begin_array(&mut self.out)?;
        self.first = true;
        Ok(())
    }

    /// Closes the innermost array.
    pub fn write_end_array(&mut self) -> io::Result<()> {
        self.layout.end_array(&mut self.out)?;
        self.layout.end_object_value(&mut self.out)?;
        self.first = false;
        Ok(())
    }

    /// Writes `"name":"value"`.
    pub fn write_string(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.write_name(name)?;
        self.write_quoted(value)?;
        self.layout.end_object_value(&mut self.out)
    }

    /// Writes `"name":"c"`.
    pub fn write_char(&mut self, name: &str, value: char) -> io::Result<()> {
        let mut utf8 = [0u8; 4];
        self.write_string(name, value.encode_utf8(&mut utf8))
    }

    /// Writes `"name":"<value formatted with Display>"`.
    pub fn write_display(&mut self, name: &str, value: &dyn fmt::Display) -> io::Result<()> {
        self.write_name(name)?;
        self.write_quoted_display(value)?;
        self.layout.end_object_value(&mut self.out)
    }

    /// Writes `"name":<number>`.
    pub fn write_number<N: JsonNumber>(&mut self, name: &str, value: N) -> io::Result<()> {
        self.write_name(name)?;
        value.write_number(&mut self.layout, &mut self.out)?;
        self.layout.end_object_value(&mut self.out)
    }

    /// Writes `"name":true` or `"name":false`.
    pub fn write_bool(&mut self, name: &str, value: bool) -> io::Result<()> {
        self.write_name(name)?;
        self.layout.write_bool(&mut self.out, value)?;
        self.layout.end_object_value(&mut self.out)
    }

    /// Writes `"name":null`.
    pub fn write_null(&mut self, name: &str) -> io::Result<()> {
        self.write_name(name)?;
        self.layout.write_null(&mut self.out)?;
        self.layout.end_object_value(&mut self.out)
    }

    /// Writes a string element of the current array.
    pub fn write_string_value(&mut self, value: &str) -> io::Result<()> {
        self.layout.begin_array_value(&mut self.out, self.first)?;
        self.first = false;
        self.write_quoted(value)?;
        self.layout.end_array_value(&mut self.out)
    }

    /// Writes a `Display` value as a string element of the current array.
    pub fn write_display_value(&mut self, value: &dyn fmt::Display) -> io::Result<()> {
        self.layout.begin_array_value(&mut self.out, self.first)?;
        self.first = false;
        self.write_quoted_display(value)?;
        self.layout.end_array_value(&mut self.out)
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_name(&mut self, name: &str) -> io::Result<()> {
        self.layout.begin_object_key(&mut self.out, self.first)?;
        self.first = false;
        self.write_quoted(name)?;
        self.layout.end_object_key(&mut self.out)?;
        self.layout.begin_object_value(&mut self.out)
    }

    fn write_quoted(&mut self, value: &str) -> io::Result<()> {
        self.layout.begin_string(&mut self.out)?;
        write_escaped(&mut self.out, &mut self.layout, value, self.escape_non_ascii)?;
        self.layout.end_string(&mut self.out)
    }

    fn write_quoted_display(&mut self, value: &dyn fmt::Display) -> io::Result<()> {
        self.layout.begin_string(&mut self.out)?;
        let mut adapter = EscapingAdapter {
            out: &mut self.out,
            layout: &mut self.layout,
            escape_non_ascii: self.escape_non_ascii,
            error: None,
        };
        if fmt::write(&mut adapter, format_args!("{}", value)).is_err() {
            return Err(adapter
                .error
                .unwrap_or_else(|| io::Error::other("value formatting failed")));
        }
        self.layout.end_string(&mut self.out)
    }
}

/// Bridges `fmt::Write` to escaped output so `Display` values never need an
/// intermediate `String`.
struct EscapingAdapter<'a, W: io::Write> {
    out: &'a mut W,
    layout: &'a mut Layout,
    escape_non_ascii: bool,
    error: Option<io::Error>,
}

impl<W: io::Write> fmt::Write for EscapingAdapter<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_escaped(self.out, self.layout, s, self.escape_non_ascii).map_err(|err| {
            self.error = Some(err);
            fmt::Error
        })
    }
}

fn write_escaped<W, F>(out: &mut W, formatter: &mut F, value: &str, escape_non_ascii: bool) -> io::Result<()>
where
    W: ?Sized + io::Write,
    F: Formatter,
{
    let mut start = 0;
    for (index, ch) in value.char_indices() {
        let escape = match ch {
            '"' => CharEscape::Quote,
            '\\' => CharEscape::ReverseSolidus,
            '\n' => CharEscape::LineFeed,
            '\r' => CharEscape::CarriageReturn,
            '\t' => CharEscape::Tab,
            '\u{8}' => CharEscape::Backspace,
            '\u{c}' => CharEscape::FormFeed,
            c if (c as u32) < 0x20 => CharEscape::AsciiControl(c as u8),
            c if escape_non_ascii && !c.is_ascii() => {
                if start < index {
                    formatter.write_string_fragment(out, &value[start..index])?;
                }
                write_utf16_escapes(out, c)?;
                start = index + c.len_utf8();
                continue;
            }
            _ => continue,
        };
        if start < index {
            formatter.write_string_fragment(out, &value[start..index])?;
        }
        formatter.write_char_escape(out, escape)?;
        start = index + 1;
    }
    if start < value.len() {
        formatter.write_string_fragment(out, &value[start..])?;
    }
    Ok(())
}

fn write_utf16_escapes<W: ?Sized + io::Write>(out: &mut W, ch: char) -> io::Result<()> {
    let mut units = [0u16; 2];
    for &unit in ch.encode_utf16(&mut units).iter() {
        let escape = [
            b'\\',
            b'u',
            HEX_DIGITS[(unit >> 12) as usize & 0xF],
            HEX_DIGITS[(unit >> 8) as usize & 0xF],
            HEX_DIGITS[(unit >> 4) as usize & 0xF],
            HEX_DIGITS[unit as usize & 0xF],
        ];
        out.write_all(&escape)?;
    }
    Ok(())
}
