//! Environment registry
//!
//! One registry is built explicitly per application (tests build their own).
//! It owns the model catalog, the coordinator pool, the recovery policy and
//! the background queue, and hands out environments:
//! - `main_environment` is a lazily built singleton
//! - `background_environment` builds a new environment per call, capped by
//!   `max_background_instances`
//! - `create_environment` is an explicit factory the caller owns
//!
//! Defaults and the recovery policy may be registered until the first
//! environment is built. Later registrations are ignored with a warning so
//! that every environment of a registry sees the same settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use serde::Serialize;

use super::instances::InstanceLimiter;
use crate::config::EnvConfig;
use crate::env::{
    EnvError, EnvResult, EnvironmentBuilder, EnvironmentServices, PersistenceEnvironment,
};
use crate::execution::{Affinity, SerialQueue};
use crate::model::ModelCatalog;
use crate::observability::{
    log_event_with_fields, Event, MetricsRegistry, MetricsSnapshot,
};
use crate::recovery::RescuePolicy;
use crate::store::{CoordinatorFactory, CoordinatorPool, FileCoordinatorFactory, StoreLocation};

const BACKGROUND_QUEUE_LABEL: &str = "nestdb-background";

/// Names used by environments built without explicit ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentDefaults {
    /// Model resolved through the catalog
    pub model_name: String,
    /// Store file name
    pub database_name: String,
    /// Directory containing store files
    pub root_path: PathBuf,
}

impl EnvironmentDefaults {
    fn location(&self, database_name: &str) -> StoreLocation {
        StoreLocation::new(database_name, self.root_path.clone())
    }
}

struct Settings {
    defaults: EnvironmentDefaults,
    policy: RescuePolicy,
    sealed: bool,
}

/// Process-wide table of persistence environments.
pub struct EnvironmentRegistry {
    catalog: ModelCatalog,
    pool: CoordinatorPool,
    factory: Arc<dyn CoordinatorFactory>,
    settings: Mutex<Settings>,
    limiter: InstanceLimiter,
    main: Mutex<Option<Arc<PersistenceEnvironment>>>,
    main_thread: ThreadId,
    background_queue: Mutex<Option<Arc<SerialQueue>>>,
    metrics: Arc<MetricsRegistry>,
}

impl EnvironmentRegistry {
    /// Registry over file-backed stores. The calling thread becomes the
    /// registry's main thread.
    pub fn new(config: &EnvConfig) -> Self {
        Self::with_factory(config, Arc::new(FileCoordinatorFactory))
    }

    /// Registry opening stores through `factory`
    pub fn with_factory(config: &EnvConfig, factory: Arc<dyn CoordinatorFactory>) -> Self {
        log_event_with_fields(
            Event::RegistryCreated,
            &[
                ("root_path", &config.root_path.display().to_string()),
                ("model_dir", &config.model_dir.display().to_string()),
                (
                    "max_background_instances",
                    &config.max_background_instances.to_string(),
                ),
            ],
        );

        Self {
            catalog: ModelCatalog::new(config.model_dir.clone()),
            pool: CoordinatorPool::new(),
            factory,
            settings: Mutex::new(Settings {
                defaults: EnvironmentDefaults {
                    model_name: config.model_name.clone(),
                    database_name: config.database_name.clone(),
                    root_path: config.root_path.clone(),
                },
                policy: config.rescue_policy(),
                sealed: false,
            }),
            limiter: InstanceLimiter::new(config.max_background_instances),
            main: Mutex::new(None),
            main_thread: thread::current().id(),
            background_queue: Mutex::new(None),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    // ==================
    // Configuration
    // ==================

    /// Replaces the default names. Returns `false`, changing nothing, once an
    /// environment has been built.
    pub fn register_defaults(
        &self,
        model_name: impl Into<String>,
        database_name: impl Into<String>,
        root_path: impl Into<PathBuf>,
    ) -> bool {
        let mut settings = self.settings.lock();
        let defaults = EnvironmentDefaults {
            model_name: model_name.into(),
            database_name: database_name.into(),
            root_path: root_path.into(),
        };

        if settings.sealed {
            log_event_with_fields(
                Event::DefaultsIgnored,
                &[
                    ("model", &defaults.model_name),
                    ("database", &defaults.database_name),
                ],
            );
            return false;
        }

        log_event_with_fields(
            Event::DefaultsRegistered,
            &[
                ("model", &defaults.model_name),
                ("database", &defaults.database_name),
                ("root_path", &defaults.root_path.display().to_string()),
            ],
        );
        settings.defaults = defaults;
        true
    }

    /// Replaces the recovery policy. Returns `false`, changing nothing, once
    /// an environment has been built.
    pub fn register_recovery_policy(&self, policy: RescuePolicy) -> bool {
        let mut settings = self.settings.lock();
        if settings.sealed {
            log_event_with_fields(Event::PolicyIgnored, &[]);
            return false;
        }
        settings.policy = policy;
        log_event_with_fields(
            Event::PolicyRegistered,
            &[(
                "abort_on_rescue_failure",
                if settings.policy.aborts_on_rescue_failure() {
                    "true"
                } else {
                    "false"
                },
            )],
        );
        true
    }

    /// Current default names
    pub fn defaults(&self) -> EnvironmentDefaults {
        self.settings.lock().defaults.clone()
    }

    /// Freezes the settings and returns them
    fn seal(&self) -> (EnvironmentDefaults, RescuePolicy) {
        let mut settings = self.settings.lock();
        settings.sealed = true;
        (settings.defaults.clone(), settings.policy.clone())
    }

    // ==================
    // Environments
    // ==================

    /// The main environment, built from the defaults on first use.
    pub fn main_environment(&self) -> EnvResult<Arc<PersistenceEnvironment>> {
        let mut main = self.main.lock();
        if let Some(env) = main.as_ref() {
            return Ok(Arc::clone(env));
        }

        let (defaults, policy) = self.seal();
        let builder = EnvironmentBuilder::new(
            defaults.model_name.clone(),
            defaults.location(&defaults.database_name),
        )
        .affinity(Affinity::Main);
        let env = Arc::new(self.build(builder, &policy)?);

        *main = Some(Arc::clone(&env));
        Ok(env)
    }

    /// A new background environment sharing the default store.
    ///
    /// Fails with `NEST_TOO_MANY_INSTANCES` while `max_background_instances`
    /// background environments are alive.
    pub fn background_environment(&self) -> EnvResult<Arc<PersistenceEnvironment>> {
        let slot = self.limiter.try_acquire().ok_or_else(|| {
            self.metrics.increment_background_rejected();
            log_event_with_fields(
                Event::BackgroundRejected,
                &[
                    ("outstanding", &self.limiter.outstanding().to_string()),
                    ("cap", &self.limiter.cap().to_string()),
                ],
            );
            EnvError::too_many_instances(self.limiter.cap())
        })?;

        let (defaults, policy) = self.seal();
        let builder = EnvironmentBuilder::new(
            defaults.model_name.clone(),
            defaults.location(&defaults.database_name),
        )
        .affinity(Affinity::Background)
        .slot(slot);
        Ok(Arc::new(self.build(builder, &policy)?))
    }

    /// The main environment on the registry's main thread, a new background
    /// environment anywhere else.
    pub fn instance(&self) -> EnvResult<Arc<PersistenceEnvironment>> {
        if self.is_main_thread() {
            self.main_environment()
        } else {
            self.background_environment()
        }
    }

    /// A new environment outside the singleton and the background cap.
    /// With `share_persistence` false it gets a private coordinator.
    pub fn create_environment(
        &self,
        database_name: &str,
        model_name: &str,
        share_persistence: bool,
    ) -> EnvResult<PersistenceEnvironment> {
        let (defaults, policy) = self.seal();
        let builder = EnvironmentBuilder::new(model_name, defaults.location(database_name))
            .share_persistence(share_persistence)
            .affinity(Affinity::Detached);
        self.build(builder, &policy)
    }

    /// [`create_environment`](Self::create_environment) with the default names
    pub fn create_default_environment(
        &self,
        share_persistence: bool,
    ) -> EnvResult<PersistenceEnvironment> {
        let defaults = self.defaults();
        self.create_environment(
            &defaults.database_name,
            &defaults.model_name,
            share_persistence,
        )
    }

    fn build(
        &self,
        builder: EnvironmentBuilder,
        policy: &RescuePolicy,
    ) -> EnvResult<PersistenceEnvironment> {
        builder.build(&EnvironmentServices {
            catalog: &self.catalog,
            pool: &self.pool,
            factory: self.factory.as_ref(),
            policy,
            metrics: &self.metrics,
        })
    }

    // ==================
    // Background execution
    // ==================

    /// The serial queue background work runs on, started on first use
    pub fn background_queue(&self) -> EnvResult<Arc<SerialQueue>> {
        let mut queue = self.background_queue.lock();
        if let Some(existing) = queue.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let started = Arc::new(SerialQueue::new(BACKGROUND_QUEUE_LABEL)?);
        *queue = Some(Arc::clone(&started));
        Ok(started)
    }

    /// Builds a background environment and runs `work` with it on the
    /// background queue. Returns once the work is queued.
    pub fn perform_in_background<F>(&self, work: F) -> EnvResult<()>
    where
        F: FnOnce(&PersistenceEnvironment) + Send + 'static,
    {
        let env = self.background_environment()?;
        let queue = self.background_queue()?;
        queue.dispatch(move || work(&env))?;
        Ok(())
    }

    /// Like [`perform_in_background`](Self::perform_in_background), waiting
    /// for the result.
    pub fn perform_in_background_and_wait<T, F>(&self, work: F) -> EnvResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&PersistenceEnvironment) -> T + Send + 'static,
    {
        let env = self.background_environment()?;
        let queue = self.background_queue()?;
        Ok(queue.dispatch_sync(move || work(&env))?)
    }

    // ==================
    // Introspection
    // ==================

    /// Whether the caller runs on the thread that built the registry
    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    /// Background environments currently alive
    pub fn outstanding_background(&self) -> usize {
        self.limiter.outstanding()
    }

    /// Cap on background environments
    pub fn max_background_instances(&self) -> usize {
        self.limiter.cap()
    }

    /// Whether a live coordinator owns `path`
    pub fn is_store_open(&self, path: &Path) -> bool {
        self.pool.is_held(path)
    }

    /// Model catalog
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Counters shared by all environments of this registry
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl std::fmt::Debug for EnvironmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentRegistry")
            .field("defaults", &self.defaults())
            .field("outstanding_background", &self.outstanding_background())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvErrorCode;
    use crate::model::{EntityDef, FieldDef, FieldType, Model};
    use tempfile::TempDir;

    fn registry(temp_dir: &TempDir, cap: usize) -> EnvironmentRegistry {
        let config = EnvConfig {
            database_name: "t1.db".into(),
            model_name: "M".into(),
            max_background_instances: cap,
            ..EnvConfig::rooted_at(temp_dir.path())
        };
        let registry = EnvironmentRegistry::new(&config);
        registry
            .catalog()
            .register(Model::new("M", "1").with_entity(
                "Person",
                EntityDef::default().with_field("name", FieldDef::required(FieldType::String)),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_main_environment_is_singleton() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir, 2);

        let a = registry.main_environment().unwrap();
        let b = registry.main_environment().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.affinity(), Affinity::Main);
        assert_eq!(registry.metrics().environments_created, 1);
    }

    #[test]
    fn test_background_cap() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir, 2);

        let a = registry.background_environment().unwrap();
        let _b = registry.background_environment().unwrap();
        let err = registry.background_environment().unwrap_err();
        assert_eq!(err.code(), EnvErrorCode::NestTooManyInstances);
        assert_eq!(registry.metrics().background_rejected, 1);

        drop(a);
        assert_eq!(registry.outstanding_background(), 1);
        assert!(registry.background_environment().is_ok());
    }

    #[test]
    fn test_failed_background_build_frees_slot() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir, 1);
        assert!(registry.register_defaults("Missing", "t1.db", temp_dir.path()));

        assert!(registry.background_environment().is_err());
        assert_eq!(registry.outstanding_background(), 0);
    }

    #[test]
    fn test_defaults_frozen_after_first_environment() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir, 2);

        let _main = registry.main_environment().unwrap();
        assert!(!registry.register_defaults("Other", "t2.db", temp_dir.path()));
        assert!(!registry.register_recovery_policy(RescuePolicy::always()));
        assert_eq!(registry.defaults().database_name, "t1.db");
    }

    #[test]
    fn test_instance_follows_thread() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(registry(&temp_dir, 2));

        let main = registry.instance().unwrap();
        assert_eq!(main.affinity(), Affinity::Main);

        let remote = Arc::clone(&registry);
        let affinity = thread::spawn(move || remote.instance().unwrap().affinity())
            .join()
            .unwrap();
        assert_eq!(affinity, Affinity::Background);
    }

    #[test]
    fn test_perform_in_background_and_wait() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir, 2);

        let (affinity, on_queue) = registry
            .perform_in_background_and_wait(|env| {
                (
                    env.affinity(),
                    thread::current().name() == Some(BACKGROUND_QUEUE_LABEL),
                )
            })
            .unwrap();

        assert_eq!(affinity, Affinity::Background);
        assert!(on_queue);
        assert_eq!(registry.outstanding_background(), 0);
    }
}
