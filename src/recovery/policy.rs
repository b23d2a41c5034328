//! Rescue policy
//!
//! A policy is a set of function values consulted when a store cannot be
//! opened. Every callback defaults to a no-op and the default decision is to
//! not rescue, so a store is never discarded unless someone asked for it.
//!
//! Callbacks run while the environment is being built, before it exists.
//! They receive a [`RescueContext`] describing the store instead, and they
//! must not create environments themselves.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::store::{StoreError, StoreErrorCode};

/// What went wrong, handed to every policy callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescueContext {
    /// Store file being opened
    pub store_path: PathBuf,
    /// Model the store was opened for
    pub model_name: String,
    /// Code of the failure being reported
    pub error_code: StoreErrorCode,
    /// Rendered failure
    pub error: String,
}

impl RescueContext {
    /// Context for a failure at `store_path`
    pub fn new(store_path: impl Into<PathBuf>, model_name: &str, error: &StoreError) -> Self {
        Self {
            store_path: store_path.into(),
            model_name: model_name.to_string(),
            error_code: error.code(),
            error: error.to_string(),
        }
    }
}

type Decision = Arc<dyn Fn(&RescueContext) -> bool + Send + Sync>;
type Notification = Arc<dyn Fn(&RescueContext) + Send + Sync>;

/// Decides whether and how a failed store is rescued.
#[derive(Clone)]
pub struct RescuePolicy {
    should_rescue: Decision,
    abort_on_rescue_failure: bool,
    on_start: Notification,
    on_finish: Notification,
    on_failed: Notification,
}

impl Default for RescuePolicy {
    fn default() -> Self {
        Self::never()
    }
}

impl RescuePolicy {
    /// Never rescues; every callback is a no-op
    pub fn never() -> Self {
        Self {
            should_rescue: Arc::new(|_| false),
            abort_on_rescue_failure: false,
            on_start: Arc::new(|_| {}),
            on_finish: Arc::new(|_| {}),
            on_failed: Arc::new(|_| {}),
        }
    }

    /// Always discards and recreates a store that fails to open
    pub fn always() -> Self {
        Self::never().with_should_rescue(|_| true)
    }

    /// Replaces the rescue decision
    pub fn with_should_rescue<F>(mut self, decide: F) -> Self
    where
        F: Fn(&RescueContext) -> bool + Send + Sync + 'static,
    {
        self.should_rescue = Arc::new(decide);
        self
    }

    /// Makes a failed rescue FATAL rather than a plain error
    pub fn abort_on_rescue_failure(mut self, abort: bool) -> Self {
        self.abort_on_rescue_failure = abort;
        self
    }

    /// Called before the store is discarded
    pub fn on_start_rescue<F>(mut self, notify: F) -> Self
    where
        F: Fn(&RescueContext) + Send + Sync + 'static,
    {
        self.on_start = Arc::new(notify);
        self
    }

    /// Called once the store has been recreated
    pub fn on_finish_rescue<F>(mut self, notify: F) -> Self
    where
        F: Fn(&RescueContext) + Send + Sync + 'static,
    {
        self.on_finish = Arc::new(notify);
        self
    }

    /// Called when recreation fails; the context carries the rescue failure
    pub fn on_rescue_failed<F>(mut self, notify: F) -> Self
    where
        F: Fn(&RescueContext) + Send + Sync + 'static,
    {
        self.on_failed = Arc::new(notify);
        self
    }

    /// Consults the rescue decision
    pub fn should_rescue(&self, context: &RescueContext) -> bool {
        (self.should_rescue)(context)
    }

    /// Whether a failed rescue is FATAL
    pub fn aborts_on_rescue_failure(&self) -> bool {
        self.abort_on_rescue_failure
    }

    pub(crate) fn notify_start(&self, context: &RescueContext) {
        (self.on_start)(context)
    }

    pub(crate) fn notify_finish(&self, context: &RescueContext) {
        (self.on_finish)(context)
    }

    pub(crate) fn notify_failed(&self, context: &RescueContext) {
        (self.on_failed)(context)
    }
}

impl fmt::Debug for RescuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RescuePolicy")
            .field("abort_on_rescue_failure", &self.abort_on_rescue_failure)
            .finish_non_exhaustive()
    }
}
