//! Tandem Store - SQLite storage engine
//!
//! Provides:
//! - File-backed (WAL) and in-memory SQLite stores
//! - Schema version checks against the host's model schema
//! - Explicit, linear migration steps with checksums
//!
//! A file store is one primary file plus its `-wal` and `-shm` sidecars.

pub mod db;
pub mod engine;
pub mod errors;
pub mod migrations;
pub mod store;

// Re-export key types
pub use engine::SqliteEngine;
pub use errors::Result;
pub use migrations::{MigrationStep, ModelSchema};
pub use store::SqliteStore;
