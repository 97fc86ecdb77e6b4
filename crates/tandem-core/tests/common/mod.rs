#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tandem_core::{
    Change, ChangeSet, EngineError, EntityMap, ErrorHook, ErrorKind, OpenRequest, PhysicalStore,
    RecordKey, Stack, StackConfig, StorageEngine,
};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub body: String,
}

impl Note {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
}

/// In-memory physical store; commits can be made to fail on demand
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordKey, Value>>,
    pub fail_commits: AtomicBool,
    pub commits: AtomicUsize,
}

impl PhysicalStore for MemoryStore {
    fn fetch(&self, key: &RecordKey) -> Result<Option<Value>, EngineError> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    fn fetch_all(&self, entity: &str) -> Result<Vec<(String, Value)>, EngineError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.entity == entity)
            .map(|(k, v)| (k.key.clone(), v.clone()))
            .collect())
    }

    fn commit(&self, changes: &ChangeSet) -> Result<(), EngineError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(EngineError::Io {
                op: "commit".to_string(),
                reason: "disk full".to_string(),
            });
        }
        let mut records = self.records.lock().unwrap();
        for (key, change) in changes.iter() {
            match change {
                Change::Upsert(value) => {
                    records.insert(key.clone(), value.clone());
                }
                Change::Delete => {
                    records.remove(key);
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn schema_version(&self) -> Result<u32, EngineError> {
        Ok(1)
    }
}

/// Storage engine whose open calls fail according to a script
///
/// Each open call pops the next scripted error; once the script is empty,
/// opens succeed. Successful file-backed opens create the primary file.
#[derive(Default)]
pub struct ScriptedEngine {
    script: Mutex<VecDeque<EngineError>>,
    opens: AtomicUsize,
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_with(errors: Vec<EngineError>) -> Arc<Self> {
        let engine = Self::default();
        *engine.script.lock().unwrap() = errors.into();
        Arc::new(engine)
    }

    pub fn open_calls(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Physical store previously opened for `configuration`
    pub fn store(&self, configuration: &str) -> Arc<MemoryStore> {
        self.stores
            .lock()
            .unwrap()
            .get(configuration)
            .cloned()
            .expect("store was opened")
    }
}

impl StorageEngine for ScriptedEngine {
    fn open(&self, request: &OpenRequest<'_>) -> Result<Arc<dyn PhysicalStore>, EngineError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }

        if let Some(location) = request.location {
            if request.kind.is_file_backed() && !location.exists() {
                std::fs::write(location, b"fresh").map_err(|e| EngineError::Io {
                    op: "create".to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        let store: Arc<dyn PhysicalStore> = self
            .stores
            .lock()
            .unwrap()
            .entry(request.configuration.to_string())
            .or_default()
            .clone();
        Ok(store)
    }
}

/// Error hook recording every report
#[derive(Default)]
pub struct HookRecorder {
    reports: Mutex<Vec<(ErrorKind, String)>>,
}

impl HookRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<(ErrorKind, String)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.reports().into_iter().map(|(kind, _)| kind).collect()
    }
}

impl ErrorHook for HookRecorder {
    fn report(&self, kind: ErrorKind, context: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((kind, context.to_string()));
    }
}

/// `Note` in the default configuration, `AuditEntry` under "Audit",
/// plus an untyped "Tag" entity
pub fn entity_map() -> EntityMap {
    EntityMap::builder()
        .bind::<Note>("Note")
        .bind_in::<AuditEntry>("AuditEntry", "Audit")
        .declare("Tag")
        .build()
        .unwrap()
}

// Field order matters: the stack's queues stop before the directory goes.
pub struct Fixture {
    pub stack: Stack,
    pub engine: Arc<ScriptedEngine>,
    pub hook: Arc<HookRecorder>,
    pub dir: TempDir,
}

impl Fixture {
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }
}

pub fn fixture() -> Fixture {
    fixture_with(ScriptedEngine::new(), true)
}

pub fn fixture_with(engine: Arc<ScriptedEngine>, auto_merge: bool) -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut config = StackConfig::new("app", dir.path().join("data"));
    config.auto_merge = auto_merge;
    let hook = HookRecorder::new();

    let stack = Stack::builder(config)
        .engine(engine.clone())
        .entities(entity_map())
        .error_hook(hook.clone())
        .build()
        .unwrap();

    Fixture {
        stack,
        engine,
        hook,
        dir,
    }
}

pub fn touch(path: &Path, contents: &[u8]) {
    std::fs::write(path, contents).unwrap();
}
