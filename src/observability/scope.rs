//! ObservationScope for begin/complete/failed logging around an operation
//!
//! - `{name}_BEGIN` on creation (TRACE)
//! - `{name}_COMPLETE` with `duration_ms` on `complete` (INFO)
//! - `{name}_FAILED` with `duration_ms` and `reason` on `fail` (ERROR or FATAL)
//! - `{name}_INCOMPLETE` on drop when neither was called (WARN)

use std::time::Instant;

use super::logger::{Logger, Severity};

/// Brackets one operation with structured log lines.
///
/// ```ignore
/// let scope = ObservationScope::with_fields("SAVE", &[("environment", "3")]);
/// match coordinator.commit(&changes, &expected) {
///     Ok(receipt) => scope.complete_with_fields(&[("changes", "2")]),
///     Err(e) => scope.fail(&e.to_string()),
/// }
/// ```
pub struct ObservationScope {
    name: &'static str,
    fields: Vec<(&'static str, String)>,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    /// Opens a scope without context fields
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Opens a scope whose fields are repeated on every line it logs
    pub fn with_fields(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        let scope = Self {
            name,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
            finished: false,
        };
        scope.emit(Severity::Trace, "BEGIN", &[]);
        scope
    }

    /// Milliseconds since the scope was opened
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    /// Logs `{name}_COMPLETE`
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Logs `{name}_COMPLETE` with extra result fields
    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let duration = self.elapsed_ms().to_string();
        let mut fields: Vec<(&str, &str)> = extra.iter().copied().collect();
        fields.push(("duration_ms", &duration));
        self.emit(Severity::Info, "COMPLETE", &fields);
    }

    /// Logs `{name}_FAILED` at ERROR
    pub fn fail(self, reason: &str) {
        self.fail_with_severity(Severity::Error, reason);
    }

    /// Logs `{name}_FAILED` at FATAL
    pub fn fail_fatal(self, reason: &str) {
        self.fail_with_severity(Severity::Fatal, reason);
    }

    fn fail_with_severity(mut self, severity: Severity, reason: &str) {
        self.finished = true;
        let duration = self.elapsed_ms().to_string();
        self.emit(
            severity,
            "FAILED",
            &[("reason", reason), ("duration_ms", &duration)],
        );
    }

    fn emit(&self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        if !Logger::enabled(severity) {
            return;
        }
        let event = format!("{}_{}", self.name, suffix);
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend_from_slice(extra);
        Logger::log(severity, &event, &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            self.emit(
                Severity::Warn,
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_complete() {
        let scope = ObservationScope::with_fields("TEST", &[("environment", "1")]);
        scope.complete_with_fields(&[("changes", "2")]);
    }

    #[test]
    fn test_scope_fail_variants() {
        ObservationScope::new("TEST").fail("disk full");
        ObservationScope::new("TEST").fail_fatal("store unusable");
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let scope = ObservationScope::new("TEST");
        drop(scope);
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let scope = ObservationScope::new("TEST");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(scope.elapsed_ms() >= 5);
        scope.complete();
    }
}
