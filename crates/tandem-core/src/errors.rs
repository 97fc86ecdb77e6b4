use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using TandemError
pub type Result<T> = std::result::Result<T, TandemError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure returned by the stack carries exactly one kind, and every kind
/// maps to a stable code usable by hosts for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Store topology
    ConflictingStoreExists,
    DirectoryCreationFailed,
    StoreAttachmentFailed,
    StoreNotFound,

    // Stack construction
    InvalidConfiguration,

    // Entity resolution
    MissingEntity,
    NoStoreForEntity,

    // Context work
    Persistence,
    Serialization,

    // Internal
    UnknownError,
}

impl ErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ConflictingStoreExists => "ERR_CONFLICTING_STORE_EXISTS",
            ErrorKind::DirectoryCreationFailed => "ERR_DIRECTORY_CREATION_FAILED",
            ErrorKind::StoreAttachmentFailed => "ERR_STORE_ATTACHMENT_FAILED",
            ErrorKind::StoreNotFound => "ERR_STORE_NOT_FOUND",
            ErrorKind::InvalidConfiguration => "ERR_INVALID_CONFIGURATION",
            ErrorKind::MissingEntity => "ERR_MISSING_ENTITY",
            ErrorKind::NoStoreForEntity => "ERR_NO_STORE_FOR_ENTITY",
            ErrorKind::Persistence => "ERR_PERSISTENCE",
            ErrorKind::Serialization => "ERR_SERIALIZATION",
            ErrorKind::UnknownError => "ERR_UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Canonical structured error type
///
/// Carries a classification kind plus the store context (location,
/// configuration) and, for attachment and persistence failures, the engine
/// error that caused it.
#[derive(Debug, Clone)]
pub struct TandemError {
    kind: ErrorKind,
    op: Option<String>,
    location: Option<PathBuf>,
    configuration: Option<String>,
    entity: Option<String>,
    message: String,
    cause: Option<EngineError>,
}

impl TandemError {
    /// Create a new error with the specified kind
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            op: None,
            location: None,
            configuration: None,
            entity: None,
            message: String::new(),
            cause: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add store location context
    pub fn with_location(mut self, location: impl AsRef<Path>) -> Self {
        self.location = Some(location.as_ref().to_path_buf());
        self
    }

    /// Add configuration name context
    pub fn with_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = Some(configuration.into());
        self
    }

    /// Add entity name context
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach the underlying engine error
    pub fn with_cause(mut self, cause: EngineError) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the store location context, if any
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Get the configuration name context, if any
    pub fn configuration(&self) -> Option<&str> {
        self.configuration.as_deref()
    }

    /// Get the entity name context, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the underlying engine error, if any
    pub fn cause(&self) -> Option<&EngineError> {
        self.cause.as_ref()
    }

    /// One-line context string handed to the error hook
    pub fn context(&self) -> String {
        let mut context = String::new();
        if let Some(op) = &self.op {
            context.push_str(op);
        }
        if !self.message.is_empty() {
            if !context.is_empty() {
                context.push_str(": ");
            }
            context.push_str(&self.message);
        }
        if let Some(location) = &self.location {
            context.push_str(&format!(" (location: {})", location.display()));
        }
        if let Some(configuration) = &self.configuration {
            context.push_str(&format!(" (configuration: {})", configuration));
        }
        context
    }
}

impl std::fmt::Display for TandemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(location) = &self.location {
            write!(f, " (location: {})", location.display())?;
        }
        if let Some(configuration) = &self.configuration {
            write!(f, " (configuration: {})", configuration)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " caused by: {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for TandemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Errors raised by a storage engine while opening or using a physical store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ===== Migration class =====
    /// On-disk schema version cannot be used with the current model
    #[error("Store schema version {found} is incompatible with model version {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    /// No migration step exists that upgrades from the stored version
    #[error("No source model for store schema version {from_version}")]
    MissingSourceModel { from_version: u32 },

    /// A migration step was found but failed to execute
    #[error("Migration {step} failed: {reason}")]
    Migration { step: String, reason: String },

    // ===== Everything else =====
    /// The engine may not read or create the store file
    #[error("Permission denied for {path}")]
    PermissionDenied { path: String },

    /// Generic I/O failure (disk full, read error, ...)
    #[error("I/O error during {op}: {reason}")]
    Io { op: String, reason: String },

    /// The file exists but is not a store this engine understands
    #[error("Store file is corrupt or not a store: {reason}")]
    Corrupt { reason: String },

    /// Any other engine failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Whether this failure is a schema-incompatibility error.
    ///
    /// Only these may trigger a destructive reset of the store files.
    pub fn is_migration_class(&self) -> bool {
        matches!(
            self,
            EngineError::IncompatibleVersion { .. }
                | EngineError::MissingSourceModel { .. }
                | EngineError::Migration { .. }
        )
    }
}

/// Build an error for an unexpected internal failure (closed queue, panicked job)
pub fn unknown_error(op: &str, reason: impl Into<String>) -> TandemError {
    TandemError::new(ErrorKind::UnknownError)
        .with_op(op.to_string())
        .with_message(reason)
}

/// Build a persistence error from an engine failure during context work
pub fn persistence_error(op: &str, cause: EngineError) -> TandemError {
    TandemError::new(ErrorKind::Persistence)
        .with_op(op.to_string())
        .with_message(cause.to_string())
        .with_cause(cause)
}

/// Build a serialization error for typed object access
pub fn serialization_error(op: &str, entity: &str, err: serde_json::Error) -> TandemError {
    TandemError::new(ErrorKind::Serialization)
        .with_op(op.to_string())
        .with_entity(entity.to_string())
        .with_message(err.to_string())
}
