//! Database connection management
//!
//! Provides utilities for opening and configuring SQLite connections

use crate::errors::{from_rusqlite, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open a SQLite database at the given path
pub fn open(path: &Path) -> Result<Connection> {
    let location = path.display().to_string();
    Connection::open(path).map_err(|e| from_rusqlite(&location, "open", e))
}

/// Open a private in-memory SQLite database
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(|e| from_rusqlite(":memory:", "open", e))
}

/// Configure a connection: foreign keys on, WAL journal
///
/// This is the first statement to touch the file, so a file that is not a
/// database fails here. Returns the journal mode in effect; in-memory
/// databases report `memory`.
pub fn configure(conn: &Connection, location: &str) -> Result<String> {
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(|e| from_rusqlite(location, "configure", e))?;

    // journal_mode answers with a row, so it cannot go through execute()
    conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
        .map_err(|e| from_rusqlite(location, "configure", e))
}
