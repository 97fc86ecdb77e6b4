//! SQLite-backed physical store

use crate::errors::{from_rusqlite, payload_error, Result};
use crate::migrations::stored_version;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tandem_core::errors::EngineError;
use tandem_core::{Change, ChangeSet, PhysicalStore, RecordKey};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    location: String,
    journal_mode: String,
}

impl SqliteStore {
    pub(crate) fn new(conn: Connection, location: String, journal_mode: String) -> Self {
        Self {
            conn: Mutex::new(conn),
            location,
            journal_mode,
        }
    }

    /// File path, or `:memory:`
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn journal_mode(&self) -> &str {
        &self.journal_mode
    }

    /// Number of records stored for `entity`
    pub fn count(&self, entity: &str) -> Result<u64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM records WHERE entity = ?1",
                [entity],
                |row| row.get(0),
            )
            .map_err(|e| from_rusqlite(&self.location, "count", e))?;
        Ok(count.max(0) as u64)
    }
}

impl PhysicalStore for SqliteStore {
    fn fetch(&self, key: &RecordKey) -> Result<Option<Value>> {
        let payload: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT payload FROM records WHERE entity = ?1 AND key = ?2",
                [&key.entity, &key.key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| from_rusqlite(&self.location, "fetch", e))?;

        payload
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| payload_error(&key.entity, &key.key, e))
            })
            .transpose()
    }

    fn fetch_all(&self, entity: &str) -> Result<Vec<(String, Value)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key, payload FROM records WHERE entity = ?1 ORDER BY key")
            .map_err(|e| from_rusqlite(&self.location, "fetch_all", e))?;
        let rows: Vec<(String, String)> = stmt
            .query_map([entity], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| from_rusqlite(&self.location, "fetch_all", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| from_rusqlite(&self.location, "fetch_all", e))?;

        rows.into_iter()
            .map(|(key, raw)| {
                let value = serde_json::from_str(&raw).map_err(|e| payload_error(entity, &key, e))?;
                Ok((key, value))
            })
            .collect()
    }

    fn commit(&self, changes: &ChangeSet) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| from_rusqlite(&self.location, "commit", e))?;
        let now = chrono::Utc::now().timestamp();

        for (record, change) in changes.iter() {
            match change {
                Change::Upsert(value) => {
                    let payload = serde_json::to_string(value)
                        .map_err(|e| EngineError::Storage(format!("encode payload: {}", e)))?;
                    tx.execute(
                        "INSERT INTO records (entity, key, payload, updated_at)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(entity, key) DO UPDATE SET
                            payload = excluded.payload,
                            updated_at = excluded.updated_at",
                        rusqlite::params![record.entity, record.key, payload, now],
                    )
                    .map_err(|e| from_rusqlite(&self.location, "commit", e))?;
                }
                Change::Delete => {
                    tx.execute(
                        "DELETE FROM records WHERE entity = ?1 AND key = ?2",
                        [&record.entity, &record.key],
                    )
                    .map_err(|e| from_rusqlite(&self.location, "commit", e))?;
                }
            }
        }

        tx.commit()
            .map_err(|e| from_rusqlite(&self.location, "commit", e))
    }

    fn schema_version(&self) -> Result<u32> {
        stored_version(&self.conn.lock(), &self.location)?.ok_or_else(|| EngineError::Corrupt {
            reason: "store has no schema version".to_string(),
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("location", &self.location)
            .field("journal_mode", &self.journal_mode)
            .finish()
    }
}
