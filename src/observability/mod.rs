//! Observability subsystem for nestdb
//!
//! - Structured logging (JSON lines on stderr)
//! - Typed lifecycle events
//! - Begin/complete scopes around operations
//! - Atomic counters
//!
//! Observability never changes behavior: logging failures are ignored and
//! nothing here returns an error.
//!
//! ```ignore
//! use nestdb::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::StoreOpened, &[("path", "/data/t1.db")]);
//!
//! let scope = ObservationScope::new("SAVE");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

/// Log a lifecycle event with fields at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}
