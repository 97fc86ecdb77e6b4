//! Migration runner
//!
//! Brings a store to the model's schema version. A fresh store gets the base
//! schema and then every model step; an existing store is compared with the
//! model version and upgraded step by step when automigration is allowed.
//! Each step runs in its own transaction and is logged in `schema_version`.

use crate::errors::{from_rusqlite, migration_error, Result};
use crate::migrations::checksums::compute_checksum;
use crate::migrations::embedded::{BASE_SCHEMA_ID, BASE_SCHEMA_SQL, BASE_VERSION};
use rusqlite::{Connection, OptionalExtension};
use std::time::Instant;
use tandem_core::errors::EngineError;
use tandem_core::{log_op_end, log_op_start};

const VERSION_KEY: &str = "model_version";

/// One schema upgrade, `from_version` to `from_version + 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub id: String,
    pub from_version: u32,
    pub sql: String,
}

impl MigrationStep {
    pub fn new(id: impl Into<String>, from_version: u32, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from_version,
            sql: sql.into(),
        }
    }
}

/// The schema version the host's model expects, plus the explicit steps
/// that lead to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    pub version: u32,
    pub steps: Vec<MigrationStep>,
}

impl Default for ModelSchema {
    fn default() -> Self {
        Self {
            version: BASE_VERSION,
            steps: Vec::new(),
        }
    }
}

impl ModelSchema {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: MigrationStep) -> Self {
        self.steps.push(step);
        self
    }

    fn step_from(&self, version: u32) -> Option<&MigrationStep> {
        self.steps.iter().find(|s| s.from_version == version)
    }
}

/// Bring the store behind `conn` to `schema.version`
///
/// Returns the version the store is at afterwards.
pub fn prepare_schema(
    conn: &mut Connection,
    schema: &ModelSchema,
    automigrate: bool,
    location: &str,
) -> Result<u32> {
    create_schema_version_table(conn, location)?;

    let stored = match stored_version(conn, location)? {
        Some(version) => version,
        None => {
            apply_base_schema(conn, location)?;
            tracing::debug!(location, version = BASE_VERSION, "fresh store initialized");
            return upgrade(conn, schema, BASE_VERSION, location);
        }
    };

    if stored == schema.version {
        return Ok(stored);
    }
    if stored > schema.version || !automigrate {
        return Err(EngineError::IncompatibleVersion {
            found: stored,
            expected: schema.version,
        });
    }
    upgrade(conn, schema, stored, location)
}

/// Version recorded in the store, `None` for a fresh store
pub fn stored_version(conn: &Connection, location: &str) -> Result<Option<u32>> {
    let has_metadata: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tandem_metadata'",
            [],
            |_| Ok(true),
        )
        .optional()
        .map_err(|e| from_rusqlite(location, "read_schema_version", e))?
        .unwrap_or(false);
    if !has_metadata {
        return Ok(None);
    }

    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM tandem_metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| from_rusqlite(location, "read_schema_version", e))?;

    match value {
        None => Ok(None),
        Some(raw) => raw.parse::<u32>().map(Some).map_err(|_| EngineError::Corrupt {
            reason: format!("schema version '{}' is not a number", raw),
        }),
    }
}

fn upgrade(conn: &mut Connection, schema: &ModelSchema, from: u32, location: &str) -> Result<u32> {
    if from > schema.version {
        return Err(EngineError::IncompatibleVersion {
            found: from,
            expected: schema.version,
        });
    }

    let mut version = from;
    while version < schema.version {
        let step = schema
            .step_from(version)
            .ok_or(EngineError::MissingSourceModel {
                from_version: version,
            })?;
        apply_step(conn, &step.id, &step.sql, version + 1, location)?;
        version += 1;
    }
    Ok(version)
}

fn apply_base_schema(conn: &mut Connection, location: &str) -> Result<()> {
    apply_step(conn, BASE_SCHEMA_ID, BASE_SCHEMA_SQL, BASE_VERSION, location)
}

/// Create the schema_version table if it doesn't exist
fn create_schema_version_table(conn: &Connection, location: &str) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY,
            migration_id TEXT NOT NULL UNIQUE,
            version INTEGER NOT NULL,
            applied_at INTEGER NOT NULL,
            checksum TEXT NOT NULL
        )",
        [],
    )
    .map_err(|e| from_rusqlite(location, "create_schema_version", e))?;
    Ok(())
}

/// Run one step and stamp the store with `to_version`, atomically
fn apply_step(
    conn: &mut Connection,
    step_id: &str,
    sql: &str,
    to_version: u32,
    location: &str,
) -> Result<()> {
    let start = Instant::now();
    log_op_start!("migrate_store", step = step_id, to_version = to_version);

    let tx = conn
        .transaction()
        .map_err(|e| from_rusqlite(location, "migrate_store", e))?;

    if let Err(err) = tx.execute_batch(sql) {
        let err = migration_error(step_id, err);
        tracing::error!(
            op = "migrate_store",
            event = tandem_core_types::schema::EVENT_END_ERROR,
            step = step_id,
            error = %err,
            duration_ms = start.elapsed().as_millis() as u64,
        );
        return Err(err);
    }

    tx.execute(
        "INSERT INTO tandem_metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![VERSION_KEY, to_version.to_string()],
    )
    .map_err(|e| migration_error(step_id, e))?;

    tx.execute(
        "INSERT INTO schema_version (migration_id, version, applied_at, checksum)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            step_id,
            to_version,
            chrono::Utc::now().timestamp(),
            compute_checksum(sql)
        ],
    )
    .map_err(|e| migration_error(step_id, e))?;

    tx.commit()
        .map_err(|e| from_rusqlite(location, "migrate_store", e))?;

    log_op_end!(
        "migrate_store",
        duration_ms = start.elapsed().as_millis() as u64,
        step = step_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_fresh_store_gets_base_schema() {
        let mut conn = memory();

        let version = prepare_schema(&mut conn, &ModelSchema::default(), true, ":memory:").unwrap();

        assert_eq!(version, 1);
        assert_eq!(stored_version(&conn, ":memory:").unwrap(), Some(1));
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let mut conn = memory();
        prepare_schema(&mut conn, &ModelSchema::default(), true, ":memory:").unwrap();
        prepare_schema(&mut conn, &ModelSchema::default(), false, ":memory:").unwrap();

        let applied: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_fresh_store_runs_model_steps() {
        let mut conn = memory();
        let schema = ModelSchema::new(2).step(MigrationStep::new(
            "002_records_by_time",
            1,
            "CREATE INDEX records_by_time ON records (updated_at);",
        ));

        assert_eq!(prepare_schema(&mut conn, &schema, false, ":memory:").unwrap(), 2);
    }

    #[test]
    fn test_missing_step_is_missing_source_model() {
        let mut conn = memory();
        let err = prepare_schema(&mut conn, &ModelSchema::new(3), true, ":memory:").unwrap_err();

        assert_eq!(err, EngineError::MissingSourceModel { from_version: 1 });
    }
}
