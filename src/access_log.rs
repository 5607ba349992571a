//! Access log records and the sinks they are written to.
//!
//! A record is an ordered list of string fields rendered as one line of JSON.
//! Field order is insertion order, so the output is stable across runs:
//!
//! ```text
//! {"trace_id":"9f…","method":"GET","path":"/health",…,"timestamp":"2026-10-18T09:14:07.120455812Z"}
//! ```

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::warn;

/// One structured log line.
#[derive(Clone, Debug, Default)]
pub struct LogRecord {
    fields: Vec<(&'static str, String)>,
}

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field. Keys are not deduplicated.
    pub fn field(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((key, value.into()));
        self
    }

    /// Renders the record as a single line of JSON. Quotes, backslashes and
    /// control characters in values are escaped, so the line never breaks.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Destination for access log lines.
///
/// Implementations must be safe to call from many requests at once and must
/// never interleave two lines.
pub trait LogSink: Send + Sync + 'static {
    fn emit(&self, record: &LogRecord);
}

/// Writes one JSON line per record to standard output.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn emit(&self, record: &LogRecord) {
        let line = match record.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode access log record");
                return;
            }
        };
        // Holding the lock across the whole line keeps concurrent writers apart.
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            warn!(error = %e, "failed to write access log line");
        }
    }
}

/// Collects encoded lines in memory. Useful for tests and for hosts that
/// forward lines somewhere else.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line emitted so far, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) {
        match record.to_json_line() {
            Ok(line) => self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(line),
            Err(e) => warn!(error = %e, "failed to encode access log record"),
        }
    }
}
