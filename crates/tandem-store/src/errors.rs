//! Error mapping for tandem-store
//!
//! Translates rusqlite failures into the engine error taxonomy the stack
//! understands. Only the migration runner produces migration-class errors.

use rusqlite::ErrorCode;
use tandem_core::errors::EngineError;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Map a rusqlite error raised while working on the store at `location`
pub fn from_rusqlite(location: &str, op: &str, err: rusqlite::Error) -> EngineError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        match failure.code {
            ErrorCode::PermissionDenied | ErrorCode::CannotOpen | ErrorCode::ReadOnly => {
                return EngineError::PermissionDenied {
                    path: location.to_string(),
                }
            }
            ErrorCode::DiskFull | ErrorCode::SystemIoFailure => {
                return EngineError::Io {
                    op: op.to_string(),
                    reason: err.to_string(),
                }
            }
            ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => {
                return EngineError::Corrupt {
                    reason: err.to_string(),
                }
            }
            _ => {}
        }
    }
    EngineError::Storage(format!("{} failed: {}", op, err))
}

/// Create a migration error for a step whose SQL failed
pub fn migration_error(step_id: &str, err: rusqlite::Error) -> EngineError {
    EngineError::Migration {
        step: step_id.to_string(),
        reason: err.to_string(),
    }
}

/// Create an error for a stored payload that is not valid JSON
pub fn payload_error(entity: &str, key: &str, err: serde_json::Error) -> EngineError {
    EngineError::Corrupt {
        reason: format!("payload of {}/{} is not valid JSON: {}", entity, key, err),
    }
}
