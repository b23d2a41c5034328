//! Metrics registry for nestdb
//!
//! - Counters only, monotonic
//! - One registry per environment registry; environments share it
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one environment registry.
///
/// Relaxed ordering throughout: counters are exact, but not ordered with
/// respect to one another.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    environments_created: AtomicU64,
    background_rejected: AtomicU64,
    coordinators_shared: AtomicU64,
    saves_committed: AtomicU64,
    saves_failed: AtomicU64,
    changes_committed: AtomicU64,
    rescues_attempted: AtomicU64,
    rescues_succeeded: AtomicU64,
    rescues_failed: AtomicU64,
    rescues_declined: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Environments

    /// An environment was constructed
    pub fn increment_environments_created(&self) {
        self.environments_created.fetch_add(1, Ordering::Relaxed);
    }

    /// A background environment was refused
    pub fn increment_background_rejected(&self) {
        self.background_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A live shared coordinator was reused
    pub fn increment_coordinators_shared(&self) {
        self.coordinators_shared.fetch_add(1, Ordering::Relaxed);
    }

    // Saves

    /// A save committed `changes` changes
    pub fn record_save_committed(&self, changes: u64) {
        self.saves_committed.fetch_add(1, Ordering::Relaxed);
        self.changes_committed.fetch_add(changes, Ordering::Relaxed);
    }

    /// A save failed
    pub fn increment_saves_failed(&self) {
        self.saves_failed.fetch_add(1, Ordering::Relaxed);
    }

    // Rescue protocol

    /// Policy declined a rescue
    pub fn increment_rescues_declined(&self) {
        self.rescues_declined.fetch_add(1, Ordering::Relaxed);
    }

    /// A rescue was started
    pub fn increment_rescues_attempted(&self) {
        self.rescues_attempted.fetch_add(1, Ordering::Relaxed);
    }

    /// A rescue recreated the store
    pub fn increment_rescues_succeeded(&self) {
        self.rescues_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// A rescue failed
    pub fn increment_rescues_failed(&self) {
        self.rescues_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            environments_created: self.environments_created.load(Ordering::Relaxed),
            background_rejected: self.background_rejected.load(Ordering::Relaxed),
            coordinators_shared: self.coordinators_shared.load(Ordering::Relaxed),
            saves_committed: self.saves_committed.load(Ordering::Relaxed),
            saves_failed: self.saves_failed.load(Ordering::Relaxed),
            changes_committed: self.changes_committed.load(Ordering::Relaxed),
            rescues_attempted: self.rescues_attempted.load(Ordering::Relaxed),
            rescues_succeeded: self.rescues_succeeded.load(Ordering::Relaxed),
            rescues_failed: self.rescues_failed.load(Ordering::Relaxed),
            rescues_declined: self.rescues_declined.load(Ordering::Relaxed),
        }
    }

    /// Snapshot as a JSON object with a fixed key order
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub environments_created: u64,
    pub background_rejected: u64,
    pub coordinators_shared: u64,
    pub saves_committed: u64,
    pub saves_failed: u64,
    pub changes_committed: u64,
    pub rescues_attempted: u64,
    pub rescues_succeeded: u64,
    pub rescues_failed: u64,
    pub rescues_declined: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_save_counters() {
        let registry = MetricsRegistry::new();
        registry.record_save_committed(3);
        registry.record_save_committed(2);
        registry.increment_saves_failed();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.saves_committed, 2);
        assert_eq!(snapshot.changes_committed, 5);
        assert_eq!(snapshot.saves_failed, 1);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_rescues_attempted();
        registry.increment_rescues_succeeded();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["rescues_attempted"], 1);
        assert_eq!(parsed["rescues_succeeded"], 1);
        assert_eq!(parsed["rescues_failed"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_environments_created();
                    reg.increment_background_rejected();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.environments_created, 1000);
        assert_eq!(snapshot.background_rejected, 1000);
    }
}
