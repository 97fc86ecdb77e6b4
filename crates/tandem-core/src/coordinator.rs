//! Store coordinator
//!
//! Tracks attached stores and resolves which store serves an entity. Every
//! add or remove runs on the coordinator's own serial queue and the caller
//! blocks until it completes, so topology changes never interleave.

use crate::attachment::{ensure_parent_directory, open_store};
use crate::config::DEFAULT_CONFIGURATION;
use crate::engine::{PhysicalStore, StorageEngine};
use crate::errors::{ErrorKind, Result, TandemError};
use crate::executor::{run_sync, SerialQueue};
use crate::hook::{reported, ErrorHook};
use crate::model::{EntityMap, StoreDescriptor, StoreKind};
use crate::{log_op_end, log_op_error, log_op_start};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tandem_core_types::StoreId;

/// Result of an attach request: a store handle or the reason it failed
pub type StoreResult = std::result::Result<StoreHandle, TandemError>;

#[derive(Debug)]
struct AttachedStore {
    id: StoreId,
    descriptor: StoreDescriptor,
    store: Arc<dyn PhysicalStore>,
    attached_at: DateTime<Utc>,
    reset_performed: bool,
}

/// Cheap, clonable reference to an attached store
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<AttachedStore>,
}

impl StoreHandle {
    pub fn id(&self) -> &StoreId {
        &self.inner.id
    }

    pub fn descriptor(&self) -> &StoreDescriptor {
        &self.inner.descriptor
    }

    pub fn kind(&self) -> StoreKind {
        self.inner.descriptor.kind
    }

    pub fn location(&self) -> Option<&Path> {
        self.inner.descriptor.location.as_deref()
    }

    pub fn configuration(&self) -> &str {
        &self.inner.descriptor.configuration
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.inner.attached_at
    }

    /// Whether the store files were deleted and recreated during attachment
    pub fn was_reset(&self) -> bool {
        self.inner.reset_performed
    }

    pub fn store(&self) -> &Arc<dyn PhysicalStore> {
        &self.inner.store
    }
}

impl PartialEq for StoreHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for StoreHandle {}

struct CoordinatorState {
    engine: Arc<dyn StorageEngine>,
    entities: Arc<EntityMap>,
    hook: Arc<dyn ErrorHook>,
    // Mutated only on the coordinator queue; other threads only read.
    stores: Mutex<Vec<StoreHandle>>,
}

pub struct StoreCoordinator {
    queue: SerialQueue,
    state: Arc<CoordinatorState>,
}

impl StoreCoordinator {
    pub fn new(
        queue: SerialQueue,
        engine: Arc<dyn StorageEngine>,
        entities: Arc<EntityMap>,
        hook: Arc<dyn ErrorHook>,
    ) -> Self {
        Self {
            queue,
            state: Arc::new(CoordinatorState {
                engine,
                entities,
                hook,
                stores: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Attach a store, or return the existing one if an identical store
    /// already occupies the descriptor's location
    pub fn attach(&self, descriptor: StoreDescriptor) -> StoreResult {
        let state = self.state.clone();
        run_sync(&self.queue, move || state.attach(descriptor))
            .and_then(|result| result)
            .map_err(|err| self.report_queue_failure(err))
    }

    /// Remove a previously attached store
    pub fn detach(&self, handle: &StoreHandle) -> Result<()> {
        let state = self.state.clone();
        let id = handle.id().clone();
        run_sync(&self.queue, move || state.detach(&id))
            .and_then(|result| result)
            .map_err(|err| self.report_queue_failure(err))
    }

    /// Attached stores in attachment order
    pub fn stores(&self) -> Vec<StoreHandle> {
        self.state.stores.lock().clone()
    }

    /// Store serving `configuration`, falling back to the default configuration
    pub fn store_for_configuration(&self, configuration: &str) -> Option<StoreHandle> {
        let stores = self.state.stores.lock();
        stores
            .iter()
            .find(|s| s.configuration() == configuration)
            .or_else(|| {
                stores
                    .iter()
                    .find(|s| s.configuration() == DEFAULT_CONFIGURATION)
            })
            .cloned()
    }

    /// Store serving `entity`
    pub fn store_for_entity(&self, entity: &str) -> Result<StoreHandle> {
        let configuration = self
            .state
            .entities
            .configuration_of(entity)
            .map_err(|err| self.report(err))?;

        self.store_for_configuration(configuration).ok_or_else(|| {
            self.report(
                TandemError::new(ErrorKind::NoStoreForEntity)
                    .with_op("resolve_store")
                    .with_entity(entity)
                    .with_configuration(configuration)
                    .with_message("no attached store serves this configuration"),
            )
        })
    }

    pub fn entities(&self) -> &Arc<EntityMap> {
        &self.state.entities
    }

    /// Report a failure through the error hook and return it
    pub fn report(&self, err: TandemError) -> TandemError {
        reported(self.state.hook.as_ref(), err)
    }

    pub(crate) fn hook(&self) -> Arc<dyn ErrorHook> {
        self.state.hook.clone()
    }

    // Failures inside the job were already reported on the queue.
    fn report_queue_failure(&self, err: TandemError) -> TandemError {
        if err.kind() == ErrorKind::UnknownError {
            self.report(err)
        } else {
            err
        }
    }

    pub(crate) fn shutdown(&self) {
        self.queue.shutdown();
    }
}

impl CoordinatorState {
    fn attach(&self, descriptor: StoreDescriptor) -> StoreResult {
        let start = Instant::now();
        let slot = descriptor.slot();
        log_op_start!(
            "attach_store",
            location = %slot,
            configuration = %descriptor.configuration,
            kind = descriptor.kind.as_str()
        );

        match self.attach_inner(descriptor) {
            Ok(handle) => {
                log_op_end!(
                    "attach_store",
                    duration_ms = start.elapsed().as_millis() as u64,
                    store_id = handle.id().as_str(),
                    reset = handle.was_reset()
                );
                Ok(handle)
            }
            Err(err) => {
                log_op_error!(
                    "attach_store",
                    err,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(reported(self.hook.as_ref(), err))
            }
        }
    }

    fn attach_inner(&self, descriptor: StoreDescriptor) -> StoreResult {
        if let Some(existing) = self.existing_for(&descriptor)? {
            return Ok(existing);
        }

        ensure_parent_directory(&descriptor)?;
        let outcome = open_store(self.engine.as_ref(), &descriptor)?;

        let handle = StoreHandle {
            inner: Arc::new(AttachedStore {
                id: StoreId::new(),
                descriptor,
                store: outcome.store,
                attached_at: Utc::now(),
                reset_performed: outcome.reset_performed,
            }),
        };
        self.stores.lock().push(handle.clone());
        Ok(handle)
    }

    /// Existing store at the descriptor's slot if it matches exactly
    fn existing_for(&self, descriptor: &StoreDescriptor) -> Result<Option<StoreHandle>> {
        let slot = descriptor.slot();
        let stores = self.stores.lock();

        if let Some(existing) = stores.iter().find(|s| s.descriptor().slot() == slot) {
            let current = existing.descriptor();
            let mut mismatches = Vec::new();
            if current.kind != descriptor.kind {
                mismatches.push(format!(
                    "kind {} != {}",
                    current.kind.as_str(),
                    descriptor.kind.as_str()
                ));
            }
            if current.migration.automigrate != descriptor.migration.automigrate {
                mismatches.push(format!(
                    "automigrate {} != {}",
                    current.migration.automigrate, descriptor.migration.automigrate
                ));
            }
            if current.configuration != descriptor.configuration {
                mismatches.push(format!(
                    "configuration {} != {}",
                    current.configuration, descriptor.configuration
                ));
            }

            if mismatches.is_empty() {
                return Ok(Some(existing.clone()));
            }
            return Err(conflict(descriptor).with_message(format!(
                "a different store is attached at {}: {}",
                slot,
                mismatches.join(", ")
            )));
        }

        if let Some(serving) = stores
            .iter()
            .find(|s| s.configuration() == descriptor.configuration)
        {
            return Err(conflict(descriptor).with_message(format!(
                "configuration {} is already served by {}",
                descriptor.configuration,
                serving.descriptor().slot()
            )));
        }

        Ok(None)
    }

    fn detach(&self, id: &StoreId) -> Result<()> {
        let start = Instant::now();
        log_op_start!("detach_store", store_id = id.as_str());

        let mut stores = self.stores.lock();
        match stores.iter().position(|s| s.id() == id) {
            Some(index) => {
                stores.remove(index);
                log_op_end!(
                    "detach_store",
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Ok(())
            }
            None => {
                let err = TandemError::new(ErrorKind::StoreNotFound)
                    .with_op("detach_store")
                    .with_message(format!("store {} is not attached", id));
                log_op_error!(
                    "detach_store",
                    err,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(reported(self.hook.as_ref(), err))
            }
        }
    }
}

fn conflict(descriptor: &StoreDescriptor) -> TandemError {
    let mut err = TandemError::new(ErrorKind::ConflictingStoreExists)
        .with_op("attach_store")
        .with_configuration(descriptor.configuration.clone());
    if let Some(location) = &descriptor.location {
        err = err.with_location(location);
    }
    err
}
