//! Embedded base schema
//!
//! The base schema is embedded at compile time using include_str! and is
//! applied to every fresh store before any model step.

/// Identifier recorded in `schema_version` for the base schema
pub const BASE_SCHEMA_ID: &str = "001_base_schema";

/// Schema version a store has right after the base schema is applied
pub const BASE_VERSION: u32 = 1;

pub const BASE_SCHEMA_SQL: &str = include_str!("../../migrations/001_base_schema.sql");
