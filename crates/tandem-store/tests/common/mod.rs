#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tandem_core::{EntityMap, OpenRequest, Stack, StackConfig, StoreKind};
use tandem_store::{MigrationStep, ModelSchema, SqliteEngine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
}

impl Note {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
        }
    }
}

pub fn file_request(path: &Path, automigrate: bool) -> OpenRequest<'_> {
    OpenRequest {
        kind: StoreKind::Sqlite,
        location: Some(path),
        configuration: "Default",
        automigrate,
    }
}

pub fn memory_request() -> OpenRequest<'static> {
    OpenRequest {
        kind: StoreKind::InMemory,
        location: None,
        configuration: "Default",
        automigrate: true,
    }
}

/// Model at version 2: adds an index on record timestamps
pub fn schema_v2() -> ModelSchema {
    ModelSchema::new(2).step(MigrationStep::new(
        "002_records_by_time",
        1,
        "CREATE INDEX records_by_time ON records (updated_at);",
    ))
}

/// Raw connection for inspecting a store file after the engine let go of it
pub fn inspect(path: &Path) -> Connection {
    Connection::open(path).unwrap()
}

pub fn stack_in(data_dir: &Path, schema: ModelSchema) -> Stack {
    Stack::builder(StackConfig::new("app", data_dir))
        .engine(Arc::new(SqliteEngine::new(schema)))
        .entities(EntityMap::builder().bind::<Note>("Note").build().unwrap())
        .build()
        .unwrap()
}
