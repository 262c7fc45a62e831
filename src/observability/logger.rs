//! Structured JSON logger
//!
//! - One log line = one JSON object = one event
//! - `event` first, then `severity`, then fields sorted by key
//! - Synchronous, no buffering
//! - INFO and below go to stdout, WARN and above to stderr
//!
//! Lines below the minimum severity are dropped. The minimum comes from
//! `SIGIL_LOG` (`trace`, `info`, `warn`, `error`) and defaults to INFO.

use std::fmt;
use std::io::{self, Write};
use std::sync::OnceLock;

use super::events::Event;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, process exits
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// Parse a level name, case-insensitively
    pub fn parse(s: &str) -> Option<Severity> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => Some(Severity::Trace),
            "info" => Some(Severity::Info),
            "warn" | "warning" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            "fatal" => Some(Severity::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn min_severity() -> Severity {
    static MIN: OnceLock<Severity> = OnceLock::new();
    *MIN.get_or_init(|| {
        std::env::var("SIGIL_LOG")
            .ok()
            .and_then(|v| Severity::parse(&v))
            .unwrap_or(Severity::Info)
    })
}

/// A structured logger that outputs JSON logs
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < min_severity() {
            return;
        }
        let line = render(severity, event, fields);
        if severity >= Severity::Warn {
            write_line(&mut io::stderr(), &line);
        } else {
            write_line(&mut io::stdout(), &line);
        }
    }

    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    /// Log at FATAL level
    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Fatal, event, fields);
    }

    /// Start a log line with owned field values
    pub fn event(event: Event) -> LogLine {
        LogLine {
            event,
            fields: Vec::new(),
        }
    }
}

/// Builder for a log line whose field values are computed on the spot
///
/// ```ignore
/// Logger::event(Event::InhaleCommitted)
///     .field("entries", snapshot.len())
///     .field("seal", &seal)
///     .info();
/// ```
#[derive(Debug)]
pub struct LogLine {
    event: Event,
    fields: Vec<(&'static str, String)>,
}

impl LogLine {
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn trace(self) {
        self.emit(Severity::Trace);
    }

    pub fn info(self) {
        self.emit(Severity::Info);
    }

    pub fn warn(self) {
        self.emit(Severity::Warn);
    }

    pub fn error(self) {
        self.emit(Severity::Error);
    }

    fn emit(self, severity: Severity) {
        let borrowed: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Logger::log(severity, self.event.as_str(), &borrowed);
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) {
    // One write per line so concurrent writers do not interleave.
    let _ = writer.write_all(line.as_bytes());
    let _ = writer.flush();
}

fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(256);

    output.push_str("{\"event\":\"");
    escape_json_string(&mut output, event);
    output.push_str("\",\"severity\":\"");
    output.push_str(severity.as_str());
    output.push('"');

    let mut sorted_fields: Vec<_> = fields.iter().collect();
    sorted_fields.sort_by_key(|(k, _)| *k);

    for (key, value) in sorted_fields {
        output.push_str(",\"");
        escape_json_string(&mut output, key);
        output.push_str("\":\"");
        escape_json_string(&mut output, value);
        output.push('"');
    }

    output.push_str("}\n");
    output
}

fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}
