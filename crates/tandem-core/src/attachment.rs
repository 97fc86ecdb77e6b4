//! Migration-aware store attachment
//!
//! One attach request opens the store at most twice:
//!
//! 1. open with the caller's automigrate flag;
//! 2. only if that failed with a migration-class error, the caller opted into
//!    reset-on-failure, and the store is file-backed: delete the primary file
//!    and its sidecars, then open once more.
//!
//! Any other failure, and any failure of the second open, becomes
//! `StoreAttachmentFailed` carrying the engine cause.

use crate::engine::{OpenRequest, PhysicalStore, StorageEngine};
use crate::errors::{EngineError, ErrorKind, Result, TandemError};
use crate::model::StoreDescriptor;
use crate::{log_op_end, log_op_error, log_op_start};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Result of a successful attach request
#[derive(Debug)]
pub struct AttachOutcome {
    pub store: Arc<dyn PhysicalStore>,
    /// Number of engine open calls made (1 or 2)
    pub attempts: u32,
    pub reset_performed: bool,
}

/// Open `descriptor` through `engine`, applying the reset-and-retry policy
pub fn open_store(engine: &dyn StorageEngine, descriptor: &StoreDescriptor) -> Result<AttachOutcome> {
    let request = OpenRequest {
        kind: descriptor.kind,
        location: descriptor.location.as_deref(),
        configuration: &descriptor.configuration,
        automigrate: descriptor.migration.automigrate,
    };

    let first_error = match engine.open(&request) {
        Ok(store) => {
            return Ok(AttachOutcome {
                store,
                attempts: 1,
                reset_performed: false,
            })
        }
        Err(err) => err,
    };

    let reset_target = match descriptor.file_path() {
        Some(path)
            if descriptor.migration.reset_on_failure && first_error.is_migration_class() =>
        {
            path
        }
        _ => return Err(attachment_failed(descriptor, first_error)),
    };

    tracing::warn!(
        location = %reset_target.display(),
        configuration = %descriptor.configuration,
        cause = %first_error,
        "migration failed; resetting store files and retrying once"
    );

    if let Err((path, err)) = remove_store_files(&engine.store_files(reset_target)) {
        return Err(attachment_failed(descriptor, first_error).with_message(format!(
            "store reset failed: could not remove {}: {}",
            path.display(),
            err
        )));
    }

    match engine.open(&request) {
        Ok(store) => Ok(AttachOutcome {
            store,
            attempts: 2,
            reset_performed: true,
        }),
        Err(retry_error) => Err(attachment_failed(descriptor, retry_error)
            .with_message("store could not be opened after reset")),
    }
}

fn attachment_failed(descriptor: &StoreDescriptor, cause: EngineError) -> TandemError {
    let mut err = TandemError::new(ErrorKind::StoreAttachmentFailed)
        .with_op("open_store")
        .with_configuration(descriptor.configuration.clone())
        .with_message(cause.to_string())
        .with_cause(cause);
    if let Some(location) = &descriptor.location {
        err = err.with_location(location);
    }
    err
}

/// Delete store files in order, primary first
///
/// A file that does not exist is skipped. The first other failure stops the
/// cleanup and is returned with the offending path; files removed before it
/// stay removed.
pub fn remove_store_files(files: &[PathBuf]) -> std::result::Result<Vec<PathBuf>, (PathBuf, io::Error)> {
    let start = Instant::now();
    log_op_start!("reset_store_files", file_count = files.len());

    let mut removed = Vec::new();
    for path in files {
        match remove_file_if_present(path) {
            Ok(true) => removed.push(path.clone()),
            Ok(false) => {}
            Err(err) => {
                tracing::error!(
                    op = "reset_store_files",
                    path = %path.display(),
                    error = %err,
                    removed = removed.len(),
                    "partial store reset"
                );
                return Err((path.clone(), err));
            }
        }
    }

    log_op_end!(
        "reset_store_files",
        duration_ms = start.elapsed().as_millis() as u64,
        removed = removed.len()
    );
    Ok(removed)
}

fn remove_file_if_present(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Create the parent directory of a file store, recursively
pub fn ensure_parent_directory(descriptor: &StoreDescriptor) -> Result<()> {
    let Some(path) = descriptor.file_path() else {
        return Ok(());
    };
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.is_dir() {
        return Ok(());
    }

    let start = Instant::now();
    log_op_start!("create_store_directory", location = %parent.display());
    match std::fs::create_dir_all(parent) {
        Ok(()) => {
            log_op_end!(
                "create_store_directory",
                duration_ms = start.elapsed().as_millis() as u64
            );
            Ok(())
        }
        Err(e) => {
            let err = TandemError::new(ErrorKind::DirectoryCreationFailed)
                .with_op("create_store_directory")
                .with_location(parent)
                .with_configuration(descriptor.configuration.clone())
                .with_message(e.to_string());
            log_op_error!(
                "create_store_directory",
                err,
                duration_ms = start.elapsed().as_millis() as u64
            );
            Err(err)
        }
    }
}
