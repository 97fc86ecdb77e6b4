//! Tandem Core - embedded persistence stack
//!
//! This crate provides the orchestration layer around a storage engine:
//! - Store coordinator with idempotent, conflict-checked attachment
//! - Migration-aware attachment with opt-in, single-retry store reset
//! - A serialized write context, a read context fed by merge notifications,
//!   and child contexts for isolated units of work
//! - Error facility with an error-reporting hook
//! - Structured logging facility
//!
//! The storage engine itself lives behind [`engine::StorageEngine`]; the
//! `tandem-store` crate provides the SQLite implementation.

pub mod attachment;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod hook;
pub mod logging_facility;
pub mod model;
pub mod stack;

// Re-export commonly used types
pub use config::{EntityDeclaration, StackConfig, DEFAULT_CONFIGURATION};
pub use context::{ChildContext, MergeNotification, ReadContext, SaveSummary, WriteContext, WriteScope};
pub use coordinator::{StoreCoordinator, StoreHandle, StoreResult};
pub use engine::{OpenRequest, PhysicalStore, StorageEngine};
pub use errors::{EngineError, ErrorKind, Result, TandemError};
pub use hook::{ErrorHook, TracingErrorHook};
pub use model::{
    Change, ChangeSet, Entity, EntityMap, FileStoreOptions, MigrationPolicy, RecordKey,
    StoreDescriptor, StoreKind,
};
pub use stack::{Stack, StackBuilder};
pub use tandem_core_types::{ContextId, StoreId};
