//! Environment construction
//!
//! Order of construction:
//! 1. resolve the model through the catalog (cached after the first use)
//! 2. obtain a coordinator: pooled for shared environments, private on a
//!    disambiguated path otherwise
//! 3. if opening the store fails, run the rescue protocol once
//! 4. bind a fresh context to the coordinator

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::environment::{EnvironmentParts, PersistenceEnvironment};
use super::errors::{EnvError, EnvResult};
use crate::execution::Affinity;
use crate::model::{Model, ModelCatalog};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::recovery::{RecoveryCoordinator, RescuePolicy, RescueReport};
use crate::registry::InstanceSlot;
use crate::store::{
    CoordinatorFactory, CoordinatorPool, StoreCoordinator, StoreError, StoreLocation,
};

static NEXT_ENVIRONMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Collaborators shared by every environment of a registry
pub struct EnvironmentServices<'a> {
    /// Model lookup
    pub catalog: &'a ModelCatalog,
    /// Live coordinators
    pub pool: &'a CoordinatorPool,
    /// Opens and discards store files
    pub factory: &'a dyn CoordinatorFactory,
    /// Consulted when a store fails to open
    pub policy: &'a RescuePolicy,
    /// Counters
    pub metrics: &'a Arc<MetricsRegistry>,
}

/// Describes one environment to build.
#[derive(Debug)]
pub struct EnvironmentBuilder {
    model_name: String,
    location: StoreLocation,
    share_persistence: bool,
    affinity: Affinity,
    slot: Option<InstanceSlot>,
}

impl EnvironmentBuilder {
    /// A shared, main-affinity environment for `model_name` at `location`
    pub fn new(model_name: impl Into<String>, location: StoreLocation) -> Self {
        Self {
            model_name: model_name.into(),
            location,
            share_persistence: true,
            affinity: Affinity::Main,
            slot: None,
        }
    }

    /// Pooled coordinator (`true`) or a private one (`false`)
    pub fn share_persistence(mut self, share: bool) -> Self {
        self.share_persistence = share;
        self
    }

    /// Execution context tag
    pub fn affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    /// Background slot released when the environment is dropped
    pub(crate) fn slot(mut self, slot: InstanceSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Builds the environment
    pub fn build(self, services: &EnvironmentServices<'_>) -> EnvResult<PersistenceEnvironment> {
        let model = services
            .catalog
            .resolve(&self.model_name)
            .map_err(EnvError::model_unavailable)?;

        let mut rescue_report = None;
        let coordinator = if self.share_persistence {
            let shared = services.pool.fetch_or_create_shared(&self.location, |path| {
                open_or_rescue(services, path, &model, &mut rescue_report)
            })?;
            if shared.reused {
                Self::check_model(&shared.coordinator, &model)?;
                services.metrics.increment_coordinators_shared();
                log_event_with_fields(
                    Event::CoordinatorShared,
                    &[("path", &shared.coordinator.path().display().to_string())],
                );
            }
            shared.coordinator
        } else {
            services.pool.create_private(&self.location, |path| {
                open_or_rescue(services, path, &model, &mut rescue_report)
            })?
        };

        let id = NEXT_ENVIRONMENT_ID.fetch_add(1, Ordering::Relaxed);
        log_event_with_fields(
            Event::EnvironmentCreated,
            &[
                ("environment", &id.to_string()),
                ("affinity", self.affinity.as_str()),
                ("model", &model.tag()),
                ("path", &coordinator.path().display().to_string()),
                ("shared", if self.share_persistence { "true" } else { "false" }),
            ],
        );
        services.metrics.increment_environments_created();

        Ok(PersistenceEnvironment::assemble(EnvironmentParts {
            id,
            affinity: self.affinity,
            share_persistence: self.share_persistence,
            model,
            coordinator,
            metrics: Arc::clone(services.metrics),
            rescue_report,
            slot: self.slot,
        }))
    }

    /// A pooled coordinator opened for another model cannot be reused
    fn check_model(coordinator: &Arc<dyn StoreCoordinator>, model: &Model) -> EnvResult<()> {
        let found = coordinator.model_tag();
        if found == model.tag() {
            return Ok(());
        }
        Err(EnvError::store_creation_failed(
            coordinator.path(),
            StoreError::model_mismatch(&model.tag(), &found),
        ))
    }
}

fn open_or_rescue(
    services: &EnvironmentServices<'_>,
    path: &Path,
    model: &Arc<Model>,
    report: &mut Option<RescueReport>,
) -> EnvResult<Arc<dyn StoreCoordinator>> {
    match services.factory.open(path, model) {
        Ok(coordinator) => Ok(coordinator),
        Err(failure) => {
            let recovery =
                RecoveryCoordinator::new(services.policy, services.factory, services.metrics);
            let (result, rescue) = recovery.recover(path, model, failure);
            *report = Some(rescue);
            result
        }
    }
}
