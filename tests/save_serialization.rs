//! Save Serialization Tests
//!
//! - Concurrent saves on one environment never overlap in the store
//! - No update is lost: every insert made by any thread is committed once
//! - Environments sharing a coordinator see each other's saves
//! - A save made against an object another environment changed or deleted
//!   since is refused and keeps its pending changes

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nestdb::config::EnvConfig;
use nestdb::env::EnvErrorCode;
use nestdb::model::{EntityDef, FieldDef, FieldType, Model};
use nestdb::query::{EntityQuery, FetchRequest, Filter};
use nestdb::registry::EnvironmentRegistry;
use nestdb::store::{
    BaseRevision, Change, CommitReceipt, CoordinatorFactory, FileCoordinatorFactory, Fields,
    ObjectId, Record, StoreCoordinator, StoreResult,
};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

/// Counts commits in flight around a real file coordinator
struct InstrumentedCoordinator {
    inner: Arc<dyn StoreCoordinator>,
    gauge: Arc<OverlapGauge>,
}

#[derive(Default)]
struct OverlapGauge {
    active: AtomicUsize,
    max_active: AtomicUsize,
    commits: AtomicUsize,
}

impl StoreCoordinator for InstrumentedCoordinator {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn model_tag(&self) -> String {
        self.inner.model_tag()
    }

    fn commit(&self, changes: &[Change], expected: &[BaseRevision]) -> StoreResult<CommitReceipt> {
        let now = self.gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.max_active.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        let result = self.inner.commit(changes, expected);
        self.gauge.commits.fetch_add(1, Ordering::SeqCst);
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn snapshot(&self, entity: &str) -> Vec<Record> {
        self.inner.snapshot(entity)
    }

    fn get_versioned(&self, id: &ObjectId) -> Option<(Record, u64)> {
        self.inner.get_versioned(id)
    }

    fn last_sequence(&self) -> u64 {
        self.inner.last_sequence()
    }
}

struct InstrumentedFactory {
    gauge: Arc<OverlapGauge>,
}

impl CoordinatorFactory for InstrumentedFactory {
    fn open(&self, path: &Path, model: &Arc<Model>) -> StoreResult<Arc<dyn StoreCoordinator>> {
        Ok(Arc::new(InstrumentedCoordinator {
            inner: FileCoordinatorFactory.open(path, model)?,
            gauge: Arc::clone(&self.gauge),
        }))
    }

    fn discard(&self, path: &Path) -> StoreResult<()> {
        FileCoordinatorFactory.discard(path)
    }
}

fn create_registry(temp_dir: &TempDir, gauge: &Arc<OverlapGauge>) -> EnvironmentRegistry {
    let config = EnvConfig {
        database_name: "t1.db".into(),
        model_name: "M".into(),
        ..EnvConfig::rooted_at(temp_dir.path())
    };
    let registry = EnvironmentRegistry::with_factory(
        &config,
        Arc::new(InstrumentedFactory {
            gauge: Arc::clone(gauge),
        }),
    );
    registry
        .catalog()
        .register(Model::new("M", "1").with_entity(
            "Counter",
            EntityDef::default()
                .with_field("thread", FieldDef::required(FieldType::Int))
                .with_field("step", FieldDef::required(FieldType::Int)),
        ))
        .unwrap();
    registry
}

fn counter(thread: i64, step: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("thread".into(), json!(thread));
    fields.insert("step".into(), json!(step));
    fields
}

// =============================================================================
// Serialization
// =============================================================================

#[test]
fn test_concurrent_saves_never_overlap() {
    let temp_dir = TempDir::new().unwrap();
    let gauge = Arc::new(OverlapGauge::default());
    let registry = create_registry(&temp_dir, &gauge);
    let env = registry.main_environment().unwrap();

    let threads = 6;
    let steps = 15;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let env = Arc::clone(&env);
            thread::spawn(move || {
                for step in 0..steps {
                    env.insert("Counter", counter(t, step)).unwrap();
                    env.save().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(gauge.max_active.load(Ordering::SeqCst), 1);
    assert!(!env.has_changes());
    assert_eq!(
        env.count(&FetchRequest::all("Counter")).unwrap(),
        (threads * steps) as usize
    );

    let counters = EntityQuery::new("Counter");
    for t in 0..threads {
        let mine = counters
            .count(&env, Some(Filter::eq("thread", json!(t))))
            .unwrap();
        assert_eq!(mine, steps as usize);
    }
}

#[test]
fn test_lock_holder_saves_without_interleaving() {
    let temp_dir = TempDir::new().unwrap();
    let gauge = Arc::new(OverlapGauge::default());
    let registry = create_registry(&temp_dir, &gauge);
    let env = registry.main_environment().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let env = Arc::clone(&env);
            thread::spawn(move || {
                env.with_lock(|locked| {
                    for step in 0..5 {
                        locked.insert("Counter", counter(t, step)).unwrap();
                    }
                    // Nobody else can add to this batch before it is saved
                    assert_eq!(locked.pending_summary().inserted, 5);
                    locked.save().unwrap()
                })
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().changes_applied, 5);
    }
    assert_eq!(gauge.commits.load(Ordering::SeqCst), 4);
}

// =============================================================================
// Shared coordinators
// =============================================================================

#[test]
fn test_shared_environments_see_saved_objects() {
    let temp_dir = TempDir::new().unwrap();
    let gauge = Arc::new(OverlapGauge::default());
    let registry = create_registry(&temp_dir, &gauge);

    let main = registry.main_environment().unwrap();
    let saved = registry
        .perform_in_background_and_wait(|env| {
            let record = env.insert("Counter", counter(1, 1)).unwrap();
            env.save().unwrap();
            record
        })
        .unwrap();

    assert_eq!(main.object(&saved.id), Some(saved.clone()));
    assert_eq!(
        registry
            .create_environment("t1.db", "M", true)
            .unwrap()
            .object(&saved.id),
        Some(saved)
    );
}

#[test]
fn test_unsaved_changes_stay_private_to_environment() {
    let temp_dir = TempDir::new().unwrap();
    let gauge = Arc::new(OverlapGauge::default());
    let registry = create_registry(&temp_dir, &gauge);

    let main = registry.main_environment().unwrap();
    let other = registry.background_environment().unwrap();

    let record = main.insert("Counter", counter(0, 0)).unwrap();
    assert!(other.object(&record.id).is_none());
    assert!(main.copy_to(&record.id, &other).is_err());

    main.save().unwrap();
    assert_eq!(main.copy_to(&record.id, &other).unwrap(), record);
}

// =============================================================================
// Conflicts between environments
// =============================================================================

#[test]
fn test_stale_update_cannot_resurrect_deleted_object() {
    let temp_dir = TempDir::new().unwrap();
    let gauge = Arc::new(OverlapGauge::default());
    let registry = create_registry(&temp_dir, &gauge);

    let a = registry.main_environment().unwrap();
    let b = registry.background_environment().unwrap();

    let record = a.insert("Counter", counter(0, 0)).unwrap();
    a.save().unwrap();

    let mut bump = Fields::new();
    bump.insert("step".into(), json!(1));
    a.update(&record.id, bump).unwrap();

    b.delete(&record.id).unwrap();
    b.save().unwrap();

    let err = a.save().unwrap_err();
    assert_eq!(err.code(), EnvErrorCode::NestSaveFailed);
    assert!(a.has_changes());
    assert!(b.object(&record.id).is_none());
    assert_eq!(a.coordinator().last_sequence(), 2);

    a.rollback();
    assert!(a.object(&record.id).is_none());
}

#[test]
fn test_stale_update_does_not_overwrite_newer_fields() {
    let temp_dir = TempDir::new().unwrap();
    let gauge = Arc::new(OverlapGauge::default());
    let registry = create_registry(&temp_dir, &gauge);

    let a = registry.main_environment().unwrap();
    let b = registry.background_environment().unwrap();

    let record = a.insert("Counter", counter(0, 0)).unwrap();
    a.save().unwrap();

    let mut from_a = Fields::new();
    from_a.insert("step".into(), json!(10));
    a.update(&record.id, from_a).unwrap();

    let mut from_b = Fields::new();
    from_b.insert("thread".into(), json!(7));
    b.update(&record.id, from_b).unwrap();
    b.save().unwrap();

    assert!(a.save().is_err());
    a.rollback();

    let current = a.object(&record.id).unwrap();
    assert_eq!(current.get("thread"), Some(&json!(7)));
    assert_eq!(current.get("step"), Some(&json!(0)));
}
