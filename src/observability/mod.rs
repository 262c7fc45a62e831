//! Observability subsystem
//!
//! - Structured logging (one JSON object per line, deterministic key order)
//! - Counters for inhale traffic and commits
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing here influences merge or commit
//! outcomes, and a failed log write is dropped silently.
//!
//! # Usage
//!
//! ```ignore
//! use sigil_registry::observability::{Event, Logger, MetricsRegistry};
//!
//! Logger::info(Event::InhaleCommitted.as_str(), &[("seal", &seal_hex)]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_commits();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    if event.is_fatal() {
        Logger::fatal(event.as_str(), fields);
    } else {
        Logger::info(event.as_str(), fields);
    }
}
