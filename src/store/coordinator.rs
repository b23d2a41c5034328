//! Store coordinators
//!
//! A coordinator owns one physical store file. Opening replays every commit
//! frame into an in-memory object table; `commit` appends one frame per call
//! and applies it to the table only once the frame is durable. Commits are
//! serialized by the coordinator's own mutex, so a coordinator shared by
//! several environments never interleaves frames.
//!
//! Every committed object carries a revision: the sequence of the frame that
//! last wrote it. Updates and deletes are committed against the revision
//! their context read, and a commit whose base revision is gone is refused
//! as a whole with `NEST_STORE_CONFLICT`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::errors::{StoreError, StoreResult};
use super::frame::{Change, CommitFrame, StoreHeader};
use super::object::{ObjectId, Record};
use super::reader::StoreReader;
use super::writer::StoreWriter;
use crate::model::Model;
use crate::observability::{log_event_with_fields, Event};

/// Identity of a store file: database file name under a root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreLocation {
    /// File name of the store, e.g. `app.db`
    pub database_name: String,
    /// Directory holding store files
    pub root_path: PathBuf,
}

impl StoreLocation {
    /// Creates a location
    pub fn new(database_name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            database_name: database_name.into(),
            root_path: root_path.into(),
        }
    }

    /// `root_path/database_name`
    pub fn path(&self) -> PathBuf {
        self.root_path.join(&self.database_name)
    }
}

/// Outcome of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Sequence of the frame written, or of the last frame for empty commits
    pub sequence: u64,
    /// Number of changes made durable
    pub changes_applied: usize,
}

/// Revision of a committed object that a pending change was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseRevision {
    /// Object the change touches
    pub id: ObjectId,
    /// Revision the context read
    pub revision: u64,
}

/// Owner of a physical store file.
///
/// Implementations must be safe to share between environments: `commit`
/// is atomic with respect to readers and other committers.
pub trait StoreCoordinator: Send + Sync {
    /// Path of the backing file
    fn path(&self) -> &Path;

    /// `name@version` of the model the file belongs to
    fn model_tag(&self) -> String;

    /// Makes `changes` durable as one unit. Nothing is applied on failure,
    /// including when an object in `expected` no longer has that revision.
    fn commit(&self, changes: &[Change], expected: &[BaseRevision]) -> StoreResult<CommitReceipt>;

    /// Committed records of `entity`, in first-insertion order
    fn snapshot(&self, entity: &str) -> Vec<Record>;

    /// Committed record by id, with its revision
    fn get_versioned(&self, id: &ObjectId) -> Option<(Record, u64)>;

    /// Committed record by id
    fn get(&self, id: &ObjectId) -> Option<Record> {
        self.get_versioned(id).map(|(record, _)| record)
    }

    /// Sequence of the last durable commit, 0 for a fresh file
    fn last_sequence(&self) -> u64;
}

struct StoredObject {
    ordinal: u64,
    revision: u64,
    record: Record,
}

/// Committed objects keyed by id, remembering first-insertion order.
#[derive(Default)]
struct ObjectTable {
    objects: HashMap<ObjectId, StoredObject>,
    next_ordinal: u64,
}

impl ObjectTable {
    fn apply(&mut self, change: Change, sequence: u64) {
        match change {
            Change::Upsert(record) => {
                if let Some(existing) = self.objects.get_mut(&record.id) {
                    existing.revision = sequence;
                    existing.record = record;
                } else {
                    let ordinal = self.next_ordinal;
                    self.next_ordinal += 1;
                    self.objects.insert(
                        record.id,
                        StoredObject {
                            ordinal,
                            revision: sequence,
                            record,
                        },
                    );
                }
            }
            Change::Delete { id, .. } => {
                self.objects.remove(&id);
            }
        }
    }

    fn revision(&self, id: &ObjectId) -> Option<u64> {
        self.objects.get(id).map(|stored| stored.revision)
    }
}

struct CoordinatorState {
    writer: StoreWriter,
    table: ObjectTable,
    last_sequence: u64,
}

/// Coordinator backed by an append-only, checksummed store file.
pub struct FileStoreCoordinator {
    path: PathBuf,
    model_tag: String,
    state: Mutex<CoordinatorState>,
}

impl FileStoreCoordinator {
    /// Opens the store at `path`, creating it when missing or empty.
    ///
    /// Fails on I/O errors, on any corrupt header or frame, and when the file
    /// was written for a different model or model version.
    pub fn open(path: &Path, model: &Model) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::io_error(
                        format!("Failed to create store directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let existing_len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(StoreError::io_error(
                    format!("Failed to inspect store file: {}", path.display()),
                    e,
                ))
            }
        };

        let model_tag = model.tag();

        if existing_len == 0 {
            let writer = StoreWriter::create(path, &StoreHeader::new(&model.name, &model.version))?;
            log_event_with_fields(
                Event::StoreCreated,
                &[("path", &path.display().to_string()), ("model", &model_tag)],
            );
            return Ok(Self {
                path: path.to_path_buf(),
                model_tag,
                state: Mutex::new(CoordinatorState {
                    writer,
                    table: ObjectTable::default(),
                    last_sequence: 0,
                }),
            });
        }

        let mut reader = StoreReader::open(path)?;
        let found = reader.header().model_tag();
        if found != model_tag {
            return Err(StoreError::model_mismatch(&model_tag, &found));
        }

        let mut table = ObjectTable::default();
        let mut last_sequence = 0;
        let mut frames = 0usize;

        loop {
            let offset = reader.current_offset();
            let frame = match reader.read_next()? {
                Some(frame) => frame,
                None => break,
            };
            if frame.sequence <= last_sequence {
                return Err(StoreError::corruption_at_offset(
                    offset,
                    format!(
                        "Commit sequence went backwards: {} after {}",
                        frame.sequence, last_sequence
                    ),
                ));
            }
            last_sequence = frame.sequence;
            frames += 1;
            for change in frame.changes {
                table.apply(change, frame.sequence);
            }
        }

        let writer = StoreWriter::open_append(path, reader.current_offset())?;

        log_event_with_fields(
            Event::StoreOpened,
            &[
                ("path", &path.display().to_string()),
                ("model", &model_tag),
                ("commits", &frames.to_string()),
                ("objects", &table.objects.len().to_string()),
            ],
        );

        Ok(Self {
            path: path.to_path_buf(),
            model_tag,
            state: Mutex::new(CoordinatorState {
                writer,
                table,
                last_sequence,
            }),
        })
    }

    /// Number of committed objects across all entities
    pub fn object_count(&self) -> usize {
        self.state.lock().table.objects.len()
    }
}

impl StoreCoordinator for FileStoreCoordinator {
    fn path(&self) -> &Path {
        &self.path
    }

    fn model_tag(&self) -> String {
        self.model_tag.clone()
    }

    fn commit(&self, changes: &[Change], expected: &[BaseRevision]) -> StoreResult<CommitReceipt> {
        let mut state = self.state.lock();

        for base in expected {
            let found = state.table.revision(&base.id);
            if found != Some(base.revision) {
                return Err(StoreError::conflict(&base.id, base.revision, found));
            }
        }

        if changes.is_empty() {
            return Ok(CommitReceipt {
                sequence: state.last_sequence,
                changes_applied: 0,
            });
        }

        let sequence = state.last_sequence + 1;
        let frame = CommitFrame::new(sequence, changes.to_vec());
        state.writer.append(&frame)?;

        state.last_sequence = sequence;
        let changes_applied = frame.changes.len();
        for change in frame.changes {
            state.table.apply(change, sequence);
        }

        Ok(CommitReceipt {
            sequence,
            changes_applied,
        })
    }

    fn snapshot(&self, entity: &str) -> Vec<Record> {
        let state = self.state.lock();
        let mut rows: Vec<&StoredObject> = state
            .table
            .objects
            .values()
            .filter(|stored| stored.record.entity == entity)
            .collect();
        rows.sort_by_key(|stored| stored.ordinal);
        rows.into_iter().map(|stored| stored.record.clone()).collect()
    }

    fn get_versioned(&self, id: &ObjectId) -> Option<(Record, u64)> {
        self.state
            .lock()
            .table
            .objects
            .get(id)
            .map(|stored| (stored.record.clone(), stored.revision))
    }

    fn last_sequence(&self) -> u64 {
        self.state.lock().last_sequence
    }
}

impl std::fmt::Debug for FileStoreCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStoreCoordinator")
            .field("path", &self.path)
            .field("model_tag", &self.model_tag)
            .finish()
    }
}

/// Opens and discards coordinators. The recovery protocol goes through this
/// seam, which lets tests substitute failing or instrumented stores.
pub trait CoordinatorFactory: Send + Sync {
    /// Opens (or creates) the store at `path` for `model`
    fn open(&self, path: &Path, model: &Arc<Model>) -> StoreResult<Arc<dyn StoreCoordinator>>;

    /// Removes the backing file at `path`. A missing file is not an error.
    fn discard(&self, path: &Path) -> StoreResult<()>;
}

/// Factory producing [`FileStoreCoordinator`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct FileCoordinatorFactory;

impl CoordinatorFactory for FileCoordinatorFactory {
    fn open(&self, path: &Path, model: &Arc<Model>) -> StoreResult<Arc<dyn StoreCoordinator>> {
        let coordinator = FileStoreCoordinator::open(path, model)?;
        Ok(Arc::new(coordinator))
    }

    fn discard(&self, path: &Path) -> StoreResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io_error(
                format!("Failed to discard store file: {}", path.display()),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityDef, FieldDef, FieldType};
    use crate::store::errors::StoreErrorCode;
    use crate::store::object::Fields;
    use serde_json::json;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::TempDir;

    fn model(version: &str) -> Model {
        Model::new("M", version).with_entity(
            "Person",
            EntityDef::default()
                .with_field("name", FieldDef::required(FieldType::String))
                .with_field("age", FieldDef::optional(FieldType::Int)),
        )
    }

    fn person(name: &str, age: i64) -> Record {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!(name));
        fields.insert("age".into(), json!(age));
        Record::new("Person", fields)
    }

    #[test]
    fn test_location_path() {
        let location = StoreLocation::new("t1.db", "/data");
        assert_eq!(location.path(), PathBuf::from("/data/t1.db"));
    }

    #[test]
    fn test_open_creates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("t1.db");

        let coordinator = FileStoreCoordinator::open(&path, &model("1")).unwrap();
        assert!(path.exists());
        assert_eq!(coordinator.last_sequence(), 0);
        assert_eq!(coordinator.model_tag(), "M@1");
    }

    #[test]
    fn test_commit_and_replay_preserve_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        let a = person("A", 30);
        let b = person("B", 40);

        {
            let coordinator = FileStoreCoordinator::open(&path, &model("1")).unwrap();
            let receipt = coordinator
                .commit(&[Change::Upsert(a.clone()), Change::Upsert(b.clone())], &[])
                .unwrap();
            assert_eq!(receipt.sequence, 1);
            assert_eq!(receipt.changes_applied, 2);

            let mut renamed = a.clone();
            renamed.set("name", json!("A2"));
            coordinator.commit(&[Change::Upsert(renamed)], &[]).unwrap();
        }

        let reopened = FileStoreCoordinator::open(&path, &model("1")).unwrap();
        let rows = reopened.snapshot("Person");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, a.id);
        assert_eq!(rows[0].get("name"), Some(&json!("A2")));
        assert_eq!(rows[1], b);
        assert_eq!(reopened.last_sequence(), 2);
    }

    #[test]
    fn test_delete_is_replayed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        let a = person("A", 30);

        {
            let coordinator = FileStoreCoordinator::open(&path, &model("1")).unwrap();
            coordinator.commit(&[Change::Upsert(a.clone())], &[]).unwrap();
            coordinator
                .commit(
                    &[Change::Delete {
                        id: a.id,
                        entity: "Person".into(),
                    }],
                    &[],
                )
                .unwrap();
        }

        let reopened = FileStoreCoordinator::open(&path, &model("1")).unwrap();
        assert!(reopened.get(&a.id).is_none());
        assert_eq!(reopened.object_count(), 0);
    }

    #[test]
    fn test_empty_commit_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        let coordinator = FileStoreCoordinator::open(&path, &model("1")).unwrap();
        let before = fs::metadata(&path).unwrap().len();

        let receipt = coordinator.commit(&[], &[]).unwrap();
        assert_eq!(receipt.changes_applied, 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), before);
    }

    #[test]
    fn test_stale_base_revision_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        let coordinator = FileStoreCoordinator::open(&path, &model("1")).unwrap();
        let a = person("A", 30);

        coordinator.commit(&[Change::Upsert(a.clone())], &[]).unwrap();
        let (read, revision) = coordinator.get_versioned(&a.id).unwrap();
        assert_eq!(revision, 1);

        let mut renamed = read.clone();
        renamed.set("name", json!("A2"));
        let base = BaseRevision { id: a.id, revision };
        coordinator.commit(&[Change::Upsert(renamed)], &[base]).unwrap();
        assert_eq!(coordinator.get_versioned(&a.id).unwrap().1, 2);

        let mut stale = read;
        stale.set("name", json!("A3"));
        let err = coordinator
            .commit(&[Change::Upsert(stale)], &[base])
            .unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::NestStoreConflict);
        assert_eq!(coordinator.get(&a.id).unwrap().get("name"), Some(&json!("A2")));
        assert_eq!(coordinator.last_sequence(), 2);
    }

    #[test]
    fn test_revisions_survive_replay() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        let a = person("A", 30);
        let b = person("B", 40);
        {
            let coordinator = FileStoreCoordinator::open(&path, &model("1")).unwrap();
            coordinator.commit(&[Change::Upsert(a.clone())], &[]).unwrap();
            coordinator.commit(&[Change::Upsert(b.clone())], &[]).unwrap();
        }

        let reopened = FileStoreCoordinator::open(&path, &model("1")).unwrap();
        assert_eq!(reopened.get_versioned(&a.id).unwrap().1, 1);
        assert_eq!(reopened.get_versioned(&b.id).unwrap().1, 2);
    }

    #[test]
    fn test_model_version_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        FileStoreCoordinator::open(&path, &model("1")).unwrap();

        let err = FileStoreCoordinator::open(&path, &model("2")).unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::NestStoreModelMismatch);
    }

    #[test]
    fn test_corrupt_frame_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        {
            let coordinator = FileStoreCoordinator::open(&path, &model("1")).unwrap();
            coordinator.commit(&[Change::Upsert(person("A", 30))], &[]).unwrap();
        }

        let len = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(len - 6)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        drop(file);

        let err = FileStoreCoordinator::open(&path, &model("1")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_garbage_file_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        fs::write(&path, b"this is not a store file at all").unwrap();

        let err = FileStoreCoordinator::open(&path, &model("1")).unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::NestStoreCorruption);
    }

    #[test]
    fn test_factory_discard_tolerates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("t1.db");
        let factory = FileCoordinatorFactory;

        factory.discard(&path).unwrap();
        let model = Arc::new(model("1"));
        drop(factory.open(&path, &model).unwrap());
        assert!(path.exists());
        factory.discard(&path).unwrap();
        assert!(!path.exists());
    }
}
