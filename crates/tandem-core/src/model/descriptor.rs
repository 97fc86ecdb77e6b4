//! Store descriptors: what the caller asks the coordinator to attach

use crate::config::DEFAULT_CONFIGURATION;
use std::path::{Component, Path, PathBuf};

/// Physical store kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Lives only as long as the process
    InMemory,
    /// SQLite file with write-ahead-log sidecars
    Sqlite,
}

impl StoreKind {
    pub fn is_file_backed(&self) -> bool {
        matches!(self, StoreKind::Sqlite)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::InMemory => "in_memory",
            StoreKind::Sqlite => "sqlite",
        }
    }
}

/// Migration behaviour requested for one attach call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationPolicy {
    /// Let the engine upgrade an older on-disk schema
    pub automigrate: bool,
    /// Delete the store files and retry once if opening fails with a
    /// migration-class error
    pub reset_on_failure: bool,
}

impl Default for MigrationPolicy {
    fn default() -> Self {
        Self {
            automigrate: true,
            reset_on_failure: false,
        }
    }
}

/// Everything needed to attach one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    pub kind: StoreKind,
    /// Absolute file path; in-memory stores may omit it
    pub location: Option<PathBuf>,
    pub configuration: String,
    pub migration: MigrationPolicy,
}

impl StoreDescriptor {
    pub fn in_memory(configuration: Option<&str>) -> Self {
        Self {
            kind: StoreKind::InMemory,
            location: None,
            configuration: configuration.unwrap_or(DEFAULT_CONFIGURATION).to_string(),
            migration: MigrationPolicy::default(),
        }
    }

    pub fn sqlite(
        location: impl Into<PathBuf>,
        configuration: Option<&str>,
        migration: MigrationPolicy,
    ) -> Self {
        let location: PathBuf = location.into();
        Self {
            kind: StoreKind::Sqlite,
            location: Some(normalize_location(&location)),
            configuration: configuration.unwrap_or(DEFAULT_CONFIGURATION).to_string(),
            migration,
        }
    }

    /// Identity of the slot this store occupies in the coordinator
    ///
    /// File paths identify a slot regardless of kind, so two kinds cannot
    /// share a path. Anonymous in-memory stores are identified by their
    /// configuration.
    pub fn slot(&self) -> StoreSlot {
        match &self.location {
            Some(path) => StoreSlot::Path(normalize_location(path)),
            None => StoreSlot::Memory(self.configuration.clone()),
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match self.kind {
            StoreKind::Sqlite => self.location.as_deref(),
            StoreKind::InMemory => None,
        }
    }
}

/// Lexically clean a store path: drop `.` components and repeated or
/// trailing separators
///
/// `..` components are kept as given.
pub fn normalize_location(path: &Path) -> PathBuf {
    let normalized: PathBuf = path
        .components()
        .filter(|component| *component != Component::CurDir)
        .collect();
    if normalized.as_os_str().is_empty() && !path.as_os_str().is_empty() {
        return PathBuf::from(".");
    }
    normalized
}

/// Location key used to detect re-attachment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreSlot {
    Path(PathBuf),
    Memory(String),
}

impl std::fmt::Display for StoreSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreSlot::Path(path) => write!(f, "{}", path.display()),
            StoreSlot::Memory(configuration) => write!(f, "memory:{}", configuration),
        }
    }
}

/// Caller-facing options for attaching a file store
///
/// Defaults: default store path, default configuration, automigrating,
/// no reset on migration failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStoreOptions {
    pub location: Option<PathBuf>,
    pub configuration: Option<String>,
    pub automigrating: bool,
    pub reset_on_migration_failure: bool,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            location: None,
            configuration: None,
            automigrating: true,
            reset_on_migration_failure: false,
        }
    }
}

impl FileStoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = Some(configuration.into());
        self
    }

    pub fn automigrating(mut self, automigrating: bool) -> Self {
        self.automigrating = automigrating;
        self
    }

    pub fn reset_on_migration_failure(mut self, reset: bool) -> Self {
        self.reset_on_migration_failure = reset;
        self
    }

    pub fn migration_policy(&self) -> MigrationPolicy {
        MigrationPolicy {
            automigrate: self.automigrating,
            reset_on_failure: self.reset_on_migration_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_option_defaults() {
        let options = FileStoreOptions::default();
        assert!(options.location.is_none());
        assert!(options.automigrating);
        assert!(!options.reset_on_migration_failure);
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(
            normalize_location(Path::new("data//./app.store")),
            PathBuf::from("data/app.store")
        );
        assert_eq!(
            normalize_location(Path::new("./data/app.store")),
            PathBuf::from("data/app.store")
        );
        assert_eq!(normalize_location(Path::new(".")), PathBuf::from("."));
        assert_eq!(
            normalize_location(Path::new("/data/../app.store")),
            PathBuf::from("/data/../app.store")
        );
    }

    #[test]
    fn test_slots_for_file_and_memory() {
        let file = StoreDescriptor::sqlite("/data/app.store", None, MigrationPolicy::default());
        assert_eq!(file.slot(), StoreSlot::Path(PathBuf::from("/data/app.store")));
        assert_eq!(file.configuration, DEFAULT_CONFIGURATION);

        let dotted = StoreDescriptor::sqlite("/data/./app.store", None, MigrationPolicy::default());
        assert_eq!(dotted.slot(), file.slot());
        assert_eq!(dotted.location, Some(PathBuf::from("/data/app.store")));

        let memory = StoreDescriptor::in_memory(Some("Cache"));
        assert_eq!(memory.slot(), StoreSlot::Memory("Cache".to_string()));
        assert!(memory.file_path().is_none());
    }
}
