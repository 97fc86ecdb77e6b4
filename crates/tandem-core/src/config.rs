//! Stack configuration
//!
//! Everything the stack needs to derive paths and queue names is passed in
//! explicitly through [`StackConfig`]; nothing is read from process-wide state.

use crate::errors::{ErrorKind, Result, TandemError};
use crate::logging_facility::Profile;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the configuration a store serves when the caller names none
pub const DEFAULT_CONFIGURATION: &str = "Default";

/// Configuration for one persistence stack
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Display name of the host application; names the default store file
    pub app_name: String,
    /// Directory holding store files; relative store locations resolve here
    pub data_dir: PathBuf,
    /// Extension of the default store file
    pub store_extension: String,
    /// Merge pending save notifications before every read context access
    pub auto_merge: bool,
    /// Prefix for the names of the stack's serial queue threads
    pub queue_prefix: String,
    /// Logging profile for hosts that let the stack initialize logging
    pub log_profile: Profile,
    /// Untyped entity declarations, for tools that cannot bind Rust types
    pub entities: Vec<EntityDeclaration>,
}

/// An entity declared by name in a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityDeclaration {
    pub name: String,
    #[serde(default)]
    pub configuration: Option<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            app_name: "tandem".to_string(),
            data_dir: PathBuf::from("."),
            store_extension: "store".to_string(),
            auto_merge: true,
            queue_prefix: "tandem".to_string(),
            log_profile: Profile::default(),
            entities: Vec::new(),
        }
    }
}

impl StackConfig {
    /// Create a configuration for an application storing its data in `data_dir`
    pub fn new(app_name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_name: app_name.into(),
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML configuration document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: StackConfig = toml::from_str(source).map_err(|e| {
            TandemError::new(ErrorKind::InvalidConfiguration)
                .with_op("parse_config")
                .with_message(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            TandemError::new(ErrorKind::InvalidConfiguration)
                .with_op("load_config")
                .with_location(path)
                .with_message(e.to_string())
        })?;
        Self::from_toml_str(&source)
    }

    /// Reject configurations that cannot name a default store
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(TandemError::new(ErrorKind::InvalidConfiguration)
                .with_op("validate_config")
                .with_message("app_name must not be empty"));
        }
        if self.app_name.contains(['/', '\\']) {
            return Err(TandemError::new(ErrorKind::InvalidConfiguration)
                .with_op("validate_config")
                .with_message(format!(
                    "app_name '{}' must not contain path separators",
                    self.app_name
                )));
        }
        Ok(())
    }

    /// `<data_dir>/<app_name>.<store_extension>`
    pub fn default_store_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", self.app_name, self.store_extension))
    }

    /// Resolve a caller-supplied store location
    ///
    /// `None` maps to the default store path and relative paths resolve
    /// against `data_dir`.
    pub fn resolve_location(&self, location: Option<&Path>) -> PathBuf {
        match location {
            None => self.default_store_path(),
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.data_dir.join(path),
        }
    }

    pub(crate) fn queue_name(&self, role: &str) -> String {
        format!("{}-{}", self.queue_prefix, role)
    }
}
