//! Data model shared by the coordinator, contexts and engines

pub mod descriptor;
pub mod entity;
pub mod record;

pub use descriptor::{FileStoreOptions, MigrationPolicy, StoreDescriptor, StoreKind, StoreSlot};
pub use entity::{Entity, EntityBinding, EntityMap, EntityMapBuilder};
pub use record::{Change, ChangeSet, RecordKey};
