//! Formatter configuration and hot reload.
//!
//! [`FormatterOptions`] is the user-facing, serde-deserialisable form.
//! [`FormatterOptions::compile`] validates it into an immutable
//! [`FormatterSnapshot`], and [`OptionsMonitor`] publishes snapshots so a
//! reload never tears an in-flight write: a write loads one snapshot at entry
//! and keeps it until it returns.
//!
//! # Examples
//!
//! ```
//! # use json_logger::formatter_options::{FormatterOptions, OptionsMonitor};
//! let monitor = OptionsMonitor::new(FormatterOptions::default()).unwrap();
//! let before = monitor.snapshot();
//!
//! let options = FormatterOptions::from_json(r#"{"include_scopes": true}"#).unwrap();
//! monitor.reload(options).unwrap();
//!
//! assert!(!before.options().include_scopes);
//! assert!(monitor.snapshot().options().include_scopes);
//! assert_eq!(monitor.epoch(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use time::format_description::OwnedFormatItem;
use tracing::debug;

use crate::error::{Error, Result};
use crate::json_writer::JsonWriterOptions;

/// Formatter settings.
///
/// Field names also accept their PascalCase spellings (`TimestampFormat`,
/// `UseUtcTimestamp`, ...), so existing configuration files load unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterOptions {
    /// A `time` format description such as `"[hour]:[minute]:[second] "`.
    /// No `Timestamp` field is written when unset.
    #[serde(alias = "TimestampFormat")]
    pub timestamp_format: Option<String>,

    /// Render timestamps in UTC rather than the local offset.
    #[serde(alias = "UseUtcTimestamp")]
    pub use_utc_timestamp: bool,

    /// Write the scope chain of each record.
    #[serde(alias = "IncludeScopes")]
    pub include_scopes: bool,

    #[serde(alias = "JsonWriterOptions")]
    pub json_writer_options: JsonWriterOptions,
}

impl FormatterOptions {
    /// Parses options from a JSON document. Missing fields take their
    /// defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validates the options and parses the timestamp format once.
    pub fn compile(self) -> Result<FormatterSnapshot> {
        let timestamp_format = match &self.timestamp_format {
            Some(format) => Some(
                time::format_description::parse_owned::<1>(format).map_err(|source| {
                    Error::InvalidTimestampFormat {
                        format: format.clone(),
                        source,
                    }
                })?,
            ),
            None => None,
        };
        Ok(FormatterSnapshot {
            options: self,
            timestamp_format,
        })
    }
}

/// Compiled, immutable options as seen by one write.
#[derive(Debug)]
pub struct FormatterSnapshot {
    options: FormatterOptions,
    timestamp_format: Option<OwnedFormatItem>,
}

impl FormatterSnapshot {
    /// The options this snapshot was compiled from.
    pub fn options(&self) -> &FormatterOptions {
        &self.options
    }

    /// The parsed timestamp format, if one is configured.
    pub fn timestamp_format(&self) -> Option<&OwnedFormatItem> {
        self.timestamp_format.as_ref()
    }
}

/// Holds the current snapshot and swaps it atomically on reload.
///
/// # Thread Safety
///
/// Readers never block. `reload` may run concurrently with any number of
/// writes; each write keeps the snapshot it loaded.
#[derive(Debug)]
pub struct OptionsMonitor {
    current: ArcSwap<FormatterSnapshot>,
    epoch: AtomicU64,
}

impl OptionsMonitor {
    /// Compiles `options` into the first snapshot.
    pub fn new(options: FormatterOptions) -> Result<Self> {
        Ok(Self {
            current: ArcSwap::from_pointee(options.compile()?),
            epoch: AtomicU64::new(0),
        })
    }

    /// The snapshot current at the time of the call.
    pub fn snapshot(&self) -> Arc<FormatterSnapshot> {
        self.current.load_full()
    }

    /// Replaces the options. Invalid options are rejected and the current
    /// snapshot stays in place.
    pub fn reload(&self, options: FormatterOptions) -> Result<()> {
        let snapshot = options.compile()?;
        self.current.store(Arc::new(snapshot));
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(epoch, "formatter options reloaded");
        Ok(())
    }

    /// Number of successful reloads.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}
