//! Core types shared across Tandem crates
//!
//! - **Identifiers**: StoreId, ContextId
//! - **Schema constants**: Canonical field keys and event names for structured logging

pub mod ids;
pub mod schema;

pub use ids::{ContextId, StoreId};
