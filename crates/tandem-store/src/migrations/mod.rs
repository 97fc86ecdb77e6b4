//! Schema versioning and migration
//!
//! Provides:
//! - Embedded base schema
//! - Version comparison against the host's model schema
//! - Step-by-step upgrades with checksums in `schema_version`

mod checksums;
mod embedded;
mod runner;

pub use checksums::compute_checksum;
pub use embedded::{BASE_SCHEMA_ID, BASE_VERSION};
pub use runner::{prepare_schema, stored_version, MigrationStep, ModelSchema};
