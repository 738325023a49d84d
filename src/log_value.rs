//! Typed attribute values and their JSON mapping.
//!
//! A [`LogValue`] is a closed set of scalar kinds. Each kind has exactly one
//! JSON form, chosen by [`LogValue::write_property`]:
//!
//! | Kind                         | JSON                                  |
//! |------------------------------|---------------------------------------|
//! | `Bool`                       | `true` / `false`                      |
//! | `I8` .. `I64`, `U8` .. `U64` | integer literal, never through `f64`  |
//! | `F32`, `F64`, `Decimal`      | number in its natural text form       |
//! | `Char`, `Str`                | string                                |
//! | `Null`                       | `null`                                |
//! | `Other`                      | string produced by `Display`          |
//!
//! The mapping is total: writing a value can only fail if the underlying
//! sink fails.

use std::borrow::Cow;
use std::fmt;
use std::io;

use crate::json_writer::JsonWriter;

/// Longest text [`Decimal::render`] can produce, with room to spare.
pub const DECIMAL_TEXT_LEN: usize = 48;

/// Most fractional digits a [`Decimal`] may carry.
pub const MAX_DECIMAL_SCALE: u32 = 28;

/// An exact base-10 number: `mantissa × 10^-scale`.
///
/// Trailing zeros are significant, so `Decimal::new(1250, 2)` renders as
/// `12.50`.
///
/// # Examples
///
/// ```
/// # use json_logger::log_value::Decimal;
/// let price = Decimal::new(1250, 2).unwrap();
/// assert_eq!(price.to_string(), "12.50");
///
/// let tiny = Decimal::new(-5, 3).unwrap();
/// assert_eq!(tiny.to_string(), "-0.005");
///
/// // Scales above 28 are rejected
/// assert!(Decimal::new(1, 29).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Creates `mantissa × 10^-scale`, or `None` when `scale` exceeds
    /// [`MAX_DECIMAL_SCALE`].
    pub fn new(mantissa: i128, scale: u32) -> Option<Self> {
        (scale <= MAX_DECIMAL_SCALE).then_some(Self { mantissa, scale })
    }

    /// The unscaled integer value.
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Number of digits after the decimal point.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Renders the value into `buf` and returns the text.
    pub fn render(self, buf: &mut [u8; DECIMAL_TEXT_LEN]) -> &str {
        // u128::MAX has 39 digits
        let mut digits = [0u8; 40];
        let mut magnitude = self.mantissa.unsigned_abs();
        let mut count = 0;
        loop {
            digits[digits.len() - 1 - count] = b'0' + (magnitude % 10) as u8;
            magnitude /= 10;
            count += 1;
            if magnitude == 0 {
                break;
            }
        }
        let digits = &digits[digits.len() - count..];
        let scale = self.scale as usize;

        let mut len = 0;
        let mut push = |bytes: &[u8]| {
            buf[len..len + bytes.len()].copy_from_slice(bytes);
            len += bytes.len();
        };
        if self.mantissa < 0 {
            push(b"-");
        }
        if scale == 0 {
            push(digits);
        } else if count > scale {
            push(&digits[..count - scale]);
            push(b".");
            push(&digits[count - scale..]);
        } else {
            push(b"0.");
            for _ in count..scale {
                push(b"0");
            }
            push(digits);
        }

        std::str::from_utf8(&buf[..len]).unwrap_or("0")
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self { mantissa: value.into(), scale: 0 }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0u8; DECIMAL_TEXT_LEN];
        f.write_str(self.render(&mut buf))
    }
}

/// A borrowed attribute value.
#[derive(Clone, Copy)]
pub enum LogValue<'a> {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Char(char),
    Decimal(Decimal),
    F32(f32),
    F64(f64),
    Null,
    Str(&'a str),
    /// Any other type, written as its `Display` text
    Other(&'a dyn fmt::Display),
}

impl LogValue<'_> {
    /// Writes `"name":<value>` into `writer`.
    pub fn write_property<W: io::Write>(&self, name: &str, writer: &mut JsonWriter<W>) -> io::Result<()> {
        match *self {
            LogValue::Bool(v) => writer.write_bool(name, v),
            LogValue::I8(v) => writer.write_number(name, v),
            LogValue::I16(v) => writer.write_number(name, v),
            LogValue::I32(v) => writer.write_number(name, v),
            LogValue::I64(v) => writer.write_number(name, v),
            LogValue::U8(v) => writer.write_number(name, v),
            LogValue::U16(v) => writer.write_number(name, v),
            LogValue::U32(v) => writer.write_number(name, v),
            LogValue::U64(v) => writer.write_number(name, v),
            LogValue::Char(v) => writer.write_char(name, v),
            LogValue::Decimal(v) => writer.write_number(name, v),
            LogValue::F32(v) => writer.write_number(name, v),
            LogValue::F64(v) => writer.write_number(name, v),
            LogValue::Null => writer.write_null(name),
            LogValue::Str(v) => writer.write_string(name, v),
            LogValue::Other(v) => writer.write_display(name, v),
        }
    }
}

impl fmt::Debug for LogValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            LogValue::I8(v) => f.debug_tuple("I8").field(v).finish(),
            LogValue::I16(v) => f.debug_tuple("I16").field(v).finish(),
            LogValue::I32(v) => f.debug_tuple("I32").field(v).finish(),
            LogValue::I64(v) => f.debug_tuple("I64").field(v).finish(),
            LogValue::U8(v) => f.debug_tuple("U8").field(v).finish(),
            LogValue::U16(v) => f.debug_tuple("U16").field(v).finish(),
            LogValue::U32(v) => f.debug_tuple("U32").field(v).finish(),
            LogValue::U64(v) => f.debug_tuple("U64").field(v).finish(),
            LogValue::Char(v) => f.debug_tuple("Char").field(v).finish(),
            LogValue::Decimal(v) => f.debug_tuple("Decimal").field(&format_args!("{}", v)).finish(),
            LogValue::F32(v) => f.debug_tuple("F32").field(v).finish(),
            LogValue::F64(v) => f.debug_tuple("F64").field(v).finish(),
            LogValue::Null => f.write_str("Null"),
            LogValue::Str(v) => f.debug_tuple("Str").field(v).finish(),
            LogValue::Other(v) => f.debug_tuple("Other").field(&format_args!("{}", v)).finish(),
        }
    }
}

macro_rules! from_scalar {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl From<$ty> for LogValue<'_> {
                fn from(value: $ty) -> Self {
                    LogValue::$variant(value)
                }
            }
        )*
    };
}

from_scalar!(
    bool => Bool, i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    char => Char, Decimal => Decimal, f32 => F32, f64 => F64
);

impl<'a> From<&'a str> for LogValue<'a> {
    fn from(value: &'a str) -> Self {
        LogValue::Str(value)
    }
}

impl<'a> From<&'a String> for LogValue<'a> {
    fn from(value: &'a String) -> Self {
        LogValue::Str(value)
    }
}

impl<'a, T: Into<LogValue<'a>>> From<Option<T>> for LogValue<'a> {
    fn from(value: Option<T>) -> Self {
        value.map_or(LogValue::Null, Into::into)
    }
}

/// A named attribute of a record or scope.
#[derive(Debug, Clone, Copy)]
pub struct Attribute<'a> {
    pub name: &'a str,
    pub value: LogValue<'a>,
}

impl<'a> Attribute<'a> {
    /// An attribute from any value with a [`LogValue`] conversion.
    pub fn new(name: &'a str, value: impl Into<LogValue<'a>>) -> Self {
        Self { name, value: value.into() }
    }

    /// An attribute whose value is written through `Display`.
    pub fn display(name: &'a str, value: &'a dyn fmt::Display) -> Self {
        Self { name, value: LogValue::Other(value) }
    }
}

/// An owned attribute value, for callers that collect fields before the
/// record is written (facade visitors).
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Text(String),
}

impl OwnedValue {
    /// Borrows the value for writing.
    pub fn as_log_value(&self) -> LogValue<'_> {
        match self {
            OwnedValue::Bool(v) => LogValue::Bool(*v),
            OwnedValue::I64(v) => LogValue::I64(*v),
            OwnedValue::U64(v) => LogValue::U64(*v),
            OwnedValue::F64(v) => LogValue::F64(*v),
            OwnedValue::Text(v) => LogValue::Str(v),
        }
    }

    /// The value as an `i32`, if it is an integer in range or numeric text.
    pub fn to_i32(&self) -> Option<i32> {
        match self {
            OwnedValue::I64(v) => i32::try_from(*v).ok(),
            OwnedValue::U64(v) => i32::try_from(*v).ok(),
            OwnedValue::Text(text) => text.parse().ok(),
            OwnedValue::Bool(_) | OwnedValue::F64(_) => None,
        }
    }

    /// The value as text, for slots that only take strings.
    pub fn into_text(self) -> String {
        match self {
            OwnedValue::Text(text) => text,
            other => other.to_string(),
        }
    }
}

impl fmt::Display for OwnedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnedValue::Bool(v) => write!(f, "{}", v),
            OwnedValue::I64(v) => write!(f, "{}", v),
            OwnedValue::U64(v) => write!(f, "{}", v),
            OwnedValue::F64(v) => write!(f, "{}", v),
            OwnedValue::Text(v) => f.write_str(v),
        }
    }
}

/// Ordered, owned name/value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnedFields {
    fields: Vec<(Cow<'static, str>, OwnedValue)>,
}

impl OwnedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field. Duplicate names are kept, in order.
    pub fn push(&mut self, name: impl Into<Cow<'static, str>>, value: OwnedValue) {
        self.fields.push((name.into(), value));
    }

    /// Removes and returns the first field called `name`.
    pub fn take(&mut self, name: &str) -> Option<OwnedValue> {
        let index = self.fields.iter().position(|(field, _)| field == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Borrowed attributes in insertion order.
    pub fn attributes(&self) -> Vec<Attribute<'_>> {
        self.fields
            .iter()
            .map(|(name, value)| Attribute { name, value: value.as_log_value() })
            .collect()
    }
}
