//! Storage engine collaborator
//!
//! The engine owns file I/O, schema comparison and migration execution. The
//! stack only orchestrates around it.

use crate::errors::EngineError;
use crate::model::{ChangeSet, RecordKey, StoreKind};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments for one open attempt
#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    pub kind: StoreKind,
    pub location: Option<&'a Path>,
    pub configuration: &'a str,
    pub automigrate: bool,
}

/// A storage engine able to open physical stores
pub trait StorageEngine: Send + Sync {
    /// Open or create the store described by `request`
    fn open(&self, request: &OpenRequest<'_>) -> Result<Arc<dyn PhysicalStore>, EngineError>;

    /// Every file making up a file-backed store: primary first, then sidecars
    fn store_files(&self, primary: &Path) -> Vec<PathBuf> {
        vec![
            primary.to_path_buf(),
            sidecar_path(primary, "-wal"),
            sidecar_path(primary, "-shm"),
        ]
    }
}

/// An opened physical store
pub trait PhysicalStore: Send + Sync + std::fmt::Debug {
    fn fetch(&self, key: &RecordKey) -> Result<Option<Value>, EngineError>;

    /// All records of one entity, ordered by key
    fn fetch_all(&self, entity: &str) -> Result<Vec<(String, Value)>, EngineError>;

    /// Apply a change set atomically
    fn commit(&self, changes: &ChangeSet) -> Result<(), EngineError>;

    fn schema_version(&self) -> Result<u32, EngineError>;
}

/// `<primary><suffix>`, e.g. `app.store-wal`
pub fn sidecar_path(primary: &Path, suffix: &str) -> PathBuf {
    let mut name = primary.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
