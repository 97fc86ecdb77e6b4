//! SQLite storage engine
//!
//! Opens file-backed and in-memory stores, configures the connection and
//! brings the schema to the model version before handing the store out.

use crate::db;
use crate::errors::Result;
use crate::migrations::{prepare_schema, ModelSchema};
use crate::store::SqliteStore;
use std::sync::Arc;
use tandem_core::errors::EngineError;
use tandem_core::{OpenRequest, PhysicalStore, StorageEngine, StoreKind};

#[derive(Debug, Clone, Default)]
pub struct SqliteEngine {
    schema: ModelSchema,
}

impl SqliteEngine {
    pub fn new(schema: ModelSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Open a store with its concrete type, for callers that need more than
    /// the [`PhysicalStore`] surface
    pub fn open_sqlite(&self, request: &OpenRequest<'_>) -> Result<SqliteStore> {
        let (mut conn, location) = match (request.kind, request.location) {
            (StoreKind::InMemory, _) => (db::open_in_memory()?, ":memory:".to_string()),
            (StoreKind::Sqlite, Some(path)) => (db::open(path)?, path.display().to_string()),
            (StoreKind::Sqlite, None) => {
                return Err(EngineError::Storage(
                    "a file store needs a location".to_string(),
                ))
            }
        };

        let journal_mode = db::configure(&conn, &location)?;
        let version = prepare_schema(&mut conn, &self.schema, request.automigrate, &location)?;

        tracing::debug!(
            location = %location,
            configuration = request.configuration,
            version,
            journal_mode = %journal_mode,
            "sqlite store opened"
        );
        Ok(SqliteStore::new(conn, location, journal_mode))
    }
}

impl StorageEngine for SqliteEngine {
    fn open(&self, request: &OpenRequest<'_>) -> Result<Arc<dyn PhysicalStore>> {
        let store: Arc<dyn PhysicalStore> = Arc::new(self.open_sqlite(request)?);
        Ok(store)
    }
}
