//! Store rescue protocol
//!
//! Runs once per environment construction, after the first attempt to open
//! the store has failed:
//!
//! ```text
//! InitFailed --(policy declines)--> Aborted        original error surfaces
//! InitFailed --(policy accepts)---> Rescuing
//!     Rescuing --(discard + open ok)----> Rescued  construction proceeds
//!     Rescuing --(discard or open fails)-> Aborted FATAL if the policy says so
//! ```
//!
//! There is no second attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::policy::{RescueContext, RescuePolicy};
use crate::env::{EnvError, EnvResult};
use crate::model::Model;
use crate::observability::{log_event_at, log_event_with_fields, Event, MetricsRegistry, Severity};
use crate::store::{CoordinatorFactory, StoreCoordinator, StoreError};

/// States of one rescue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RescueState {
    /// The store failed to open
    InitFailed,
    /// The store is being discarded and recreated
    Rescuing,
    /// A blank store replaced the failed one
    Rescued,
    /// Construction gives up
    Aborted,
}

/// Record of one rescue attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RescueReport {
    /// Store file concerned
    pub store_path: PathBuf,
    /// Failure that started the protocol
    pub initial_error: String,
    /// States entered, in order
    pub states: Vec<RescueState>,
    /// Failure of the rescue itself, if any
    pub rescue_error: Option<String>,
}

impl RescueReport {
    fn new(store_path: &Path, initial_error: &StoreError) -> Self {
        Self {
            store_path: store_path.to_path_buf(),
            initial_error: initial_error.to_string(),
            states: vec![RescueState::InitFailed],
            rescue_error: None,
        }
    }

    fn enter(&mut self, state: RescueState) {
        self.states.push(state);
    }

    /// Last state entered
    pub fn final_state(&self) -> RescueState {
        self.states
            .last()
            .copied()
            .unwrap_or(RescueState::InitFailed)
    }

    /// Whether the store was recreated
    pub fn rescued(&self) -> bool {
        self.final_state() == RescueState::Rescued
    }
}

/// Drives one rescue attempt through a factory.
pub struct RecoveryCoordinator<'a> {
    policy: &'a RescuePolicy,
    factory: &'a dyn CoordinatorFactory,
    metrics: &'a MetricsRegistry,
}

impl<'a> RecoveryCoordinator<'a> {
    /// Creates a coordinator for one construction
    pub fn new(
        policy: &'a RescuePolicy,
        factory: &'a dyn CoordinatorFactory,
        metrics: &'a MetricsRegistry,
    ) -> Self {
        Self {
            policy,
            factory,
            metrics,
        }
    }

    /// Handles `failure` to open `path`. Returns the recreated coordinator
    /// or the error the caller must surface, together with the report.
    pub fn recover(
        &self,
        path: &Path,
        model: &Arc<Model>,
        failure: StoreError,
    ) -> (EnvResult<Arc<dyn StoreCoordinator>>, RescueReport) {
        let mut report = RescueReport::new(path, &failure);
        let path_str = path.display().to_string();
        let failure_str = failure.to_string();

        log_event_with_fields(
            Event::RescueInitFailed,
            &[("path", &path_str), ("error", &failure_str)],
        );

        let context = RescueContext::new(path, &model.name, &failure);
        if !self.policy.should_rescue(&context) {
            report.enter(RescueState::Aborted);
            self.metrics.increment_rescues_declined();
            log_event_with_fields(Event::RescueDeclined, &[("path", &path_str)]);
            return (Err(EnvError::store_creation_failed(path, failure)), report);
        }

        report.enter(RescueState::Rescuing);
        self.metrics.increment_rescues_attempted();
        log_event_with_fields(Event::RescueStart, &[("path", &path_str)]);
        self.policy.notify_start(&context);

        match self.recreate(path, model) {
            Ok(coordinator) => {
                report.enter(RescueState::Rescued);
                self.metrics.increment_rescues_succeeded();
                log_event_with_fields(Event::RescueComplete, &[("path", &path_str)]);
                self.policy.notify_finish(&context);
                (Ok(coordinator), report)
            }
            Err(rescue_failure) => {
                let fatal = self.policy.aborts_on_rescue_failure();
                let severity = if fatal { Severity::Fatal } else { Severity::Error };
                let rescue_str = rescue_failure.to_string();

                report.enter(RescueState::Aborted);
                report.rescue_error = Some(rescue_str.clone());
                self.metrics.increment_rescues_failed();
                log_event_at(
                    severity,
                    Event::RescueFailed,
                    &[("path", &path_str), ("error", &rescue_str)],
                );
                self.policy
                    .notify_failed(&RescueContext::new(path, &model.name, &rescue_failure));

                (
                    Err(EnvError::rescue_failed(path, rescue_failure, fatal)),
                    report,
                )
            }
        }
    }

    fn recreate(
        &self,
        path: &Path,
        model: &Arc<Model>,
    ) -> Result<Arc<dyn StoreCoordinator>, StoreError> {
        self.factory.discard(path)?;
        log_event_with_fields(
            Event::StoreDiscarded,
            &[("path", &path.display().to_string())],
        );
        self.factory.open(path, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvErrorCode;
    use crate::model::{EntityDef, FieldDef, FieldType};
    use crate::store::{FileCoordinatorFactory, StoreResult};
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn model() -> Arc<Model> {
        Arc::new(Model::new("M", "1").with_entity(
            "Person",
            EntityDef::default().with_field("name", FieldDef::required(FieldType::String)),
        ))
    }

    /// File factory that counts discards and can refuse to reopen
    #[derive(Default)]
    struct CountingFactory {
        discards: AtomicUsize,
        refuse_open: bool,
    }

    impl CoordinatorFactory for CountingFactory {
        fn open(&self, path: &Path, model: &Arc<Model>) -> StoreResult<Arc<dyn StoreCoordinator>> {
            if self.refuse_open {
                return Err(StoreError::corruption("refusing to open"));
            }
            FileCoordinatorFactory.open(path, model)
        }

        fn discard(&self, path: &Path) -> StoreResult<()> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            FileCoordinatorFactory.discard(path)
        }
    }

    fn corrupt_store(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("t1.db");
        fs::write(&path, b"garbage, not a store").unwrap();
        path
    }

    fn initial_failure(path: &Path) -> StoreError {
        FileCoordinatorFactory.open(path, &model()).err().unwrap()
    }

    #[test]
    fn test_declined_rescue_leaves_file_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = corrupt_store(&temp_dir);
        let factory = CountingFactory::default();
        let policy = RescuePolicy::never();
        let metrics = MetricsRegistry::new();

        let recovery = RecoveryCoordinator::new(&policy, &factory, &metrics);
        let (result, report) = recovery.recover(&path, &model(), initial_failure(&path));

        let err = result.err().unwrap();
        assert_eq!(err.code(), EnvErrorCode::NestStoreCreationFailed);
        assert_eq!(report.states, vec![RescueState::InitFailed, RescueState::Aborted]);
        assert_eq!(factory.discards.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read(&path).unwrap(), b"garbage, not a store");
        assert_eq!(metrics.snapshot().rescues_declined, 1);
    }

    #[test]
    fn test_rescue_recreates_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = corrupt_store(&temp_dir);
        let factory = CountingFactory::default();
        let started = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&started);
        let policy = RescuePolicy::always().on_start_rescue(move |ctx| {
            seen.lock().push(ctx.store_path.clone());
        });
        let metrics = MetricsRegistry::new();

        let recovery = RecoveryCoordinator::new(&policy, &factory, &metrics);
        let (result, report) = recovery.recover(&path, &model(), initial_failure(&path));

        let coordinator = result.unwrap();
        assert_eq!(coordinator.last_sequence(), 0);
        assert!(report.rescued());
        assert_eq!(factory.discards.load(Ordering::SeqCst), 1);
        assert_eq!(*started.lock(), vec![path.clone()]);
        assert_eq!(metrics.snapshot().rescues_succeeded, 1);
    }

    #[test]
    fn test_failed_rescue_severity_follows_policy() {
        for abort in [false, true] {
            let temp_dir = TempDir::new().unwrap();
            let path = corrupt_store(&temp_dir);
            let factory = CountingFactory {
                refuse_open: true,
                ..CountingFactory::default()
            };
            let failures = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&failures);
            let policy = RescuePolicy::always()
                .abort_on_rescue_failure(abort)
                .on_rescue_failed(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            let metrics = MetricsRegistry::new();

            let recovery = RecoveryCoordinator::new(&policy, &factory, &metrics);
            let (result, report) = recovery.recover(&path, &model(), initial_failure(&path));

            let err = result.err().unwrap();
            assert_eq!(err.code(), EnvErrorCode::NestRescueFailed);
            assert_eq!(err.is_fatal(), abort);
            assert_eq!(report.final_state(), RescueState::Aborted);
            assert!(report.rescue_error.is_some());
            assert_eq!(factory.discards.load(Ordering::SeqCst), 1);
            assert_eq!(failures.load(Ordering::SeqCst), 1);
        }
    }
}
