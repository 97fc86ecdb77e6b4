//! Write context
//!
//! The only path by which changes reach the stores. All work runs on the
//! write queue; pending changes live in state touched only from that queue.

use super::child::ChildContext;
use super::notification::{MergeNotification, SaveSummary};
use crate::coordinator::{StoreCoordinator, StoreHandle};
use crate::errors::{
    persistence_error, serialization_error, unknown_error, EngineError, ErrorKind, Result,
    TandemError,
};
use crate::executor::{run_sync, SerialExecutor, SerialQueue};
use crate::model::{Change, ChangeSet, Entity, EntityMap, RecordKey};
use crate::{log_op_end, log_op_error, log_op_start};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;
use tandem_core_types::ContextId;

#[derive(Default)]
struct WriteState {
    pending: ChangeSet,
    generation: u64,
}

pub(crate) struct WriteInner {
    id: ContextId,
    queue: SerialQueue,
    coordinator: Arc<StoreCoordinator>,
    state: Mutex<WriteState>,
    subscribers: Mutex<Vec<mpsc::Sender<MergeNotification>>>,
    children: AtomicUsize,
}

/// Handle to the stack's write context; clones share the same context
#[derive(Clone)]
pub struct WriteContext {
    inner: Arc<WriteInner>,
}

impl WriteContext {
    pub(crate) fn new(queue: SerialQueue, coordinator: Arc<StoreCoordinator>) -> Self {
        Self {
            inner: Arc::new(WriteInner {
                id: ContextId::new(),
                queue,
                coordinator,
                state: Mutex::new(WriteState::default()),
                subscribers: Mutex::new(Vec::new()),
                children: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> &ContextId {
        &self.inner.id
    }

    pub fn entities(&self) -> &Arc<EntityMap> {
        self.inner.coordinator.entities()
    }

    /// Enqueue `work` on the write queue without waiting for it
    pub fn perform<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&mut WriteScope<'_>) + Send + 'static,
    {
        let inner = self.inner.clone();
        self.inner
            .queue
            .execute(Box::new(move || {
                if let Err(err) = inner.with_scope(work) {
                    inner.coordinator.report(err);
                }
            }))
            .map_err(|err| self.inner.coordinator.report(err))
    }

    /// Run `work` on the write queue and wait for its result
    ///
    /// Called from inside other work running on this context (directly, or
    /// through a read or child context) it fails with `UnknownError`; the
    /// pending state is not re-entrant.
    pub fn perform_and_wait<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&mut WriteScope<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        run_sync(&self.inner.queue, move || inner.with_scope(work))
            .and_then(|result| result)
            .map_err(|err| self.inner.coordinator.report(err))
    }

    /// Receive a notification after every successful save
    pub fn subscribe(&self) -> mpsc::Receiver<MergeNotification> {
        let (tx, rx) = mpsc::channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Number of live child contexts
    pub fn child_count(&self) -> usize {
        self.inner.children.load(Ordering::SeqCst)
    }

    /// Committed rows of `entity` with the save generation they reflect
    pub(crate) fn snapshot_entity(&self, entity: &str) -> Result<(u64, Vec<(String, Value)>)> {
        let entity = entity.to_string();
        self.perform_and_wait(move |scope| -> Result<(u64, Vec<(String, Value)>)> {
            let generation = scope.state.generation;
            let handle = scope.inner.coordinator.store_for_entity(&entity)?;
            let rows = handle.store().fetch_all(&entity).map_err(|e| {
                scope
                    .inner
                    .coordinator
                    .report(persistence_error("snapshot_entity", e).with_entity(entity.clone()))
            })?;
            Ok((generation, rows))
        })
        .and_then(|result| result)
    }

    pub(crate) fn new_child(&self) -> ChildContext {
        self.inner.children.fetch_add(1, Ordering::SeqCst);
        let child = ChildContext::new(self.clone());
        tracing::debug!(
            parent = self.id().as_str(),
            child = child.id().as_str(),
            children = self.child_count(),
            "child context created"
        );
        child
    }

    pub(crate) fn release_child(&self) {
        self.inner.children.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn report(&self, err: TandemError) -> TandemError {
        self.inner.coordinator.report(err)
    }

    pub(crate) fn shutdown(&self) {
        self.inner.queue.shutdown();
    }
}

impl WriteInner {
    // The state is only ever locked on the write queue, so a held lock means
    // this call is nested inside running work.
    fn with_scope<R>(&self, work: impl FnOnce(&mut WriteScope<'_>) -> R) -> Result<R> {
        let Some(mut state) = self.state.try_lock() else {
            return Err(unknown_error(
                "perform_and_wait",
                "cannot wait on the write context from inside its own work",
            ));
        };
        let mut scope = WriteScope {
            inner: self,
            state: &mut *state,
        };
        Ok(work(&mut scope))
    }
}

struct CommitOutcome {
    committed: ChangeSet,
    store_count: usize,
    failure: Option<(StoreHandle, EngineError)>,
}

/// Mutation API available to work running on the write queue
pub struct WriteScope<'a> {
    inner: &'a WriteInner,
    state: &'a mut WriteState,
}

impl<'a> WriteScope<'a> {
    /// Insert or replace a record
    pub fn put(&mut self, entity: &str, key: impl Into<String>, value: Value) -> Result<()> {
        self.check_entity(entity)?;
        self.state.pending.upsert(RecordKey::new(entity, key), value);
        Ok(())
    }

    pub fn put_object<T: Entity>(&mut self, key: impl Into<String>, object: &T) -> Result<()> {
        let entity = self.entity_name::<T>()?;
        let value = serde_json::to_value(object)
            .map_err(|e| self.report(serialization_error("put_object", &entity, e)))?;
        self.put(&entity, key, value)
    }

    pub fn delete(&mut self, entity: &str, key: impl Into<String>) -> Result<()> {
        self.check_entity(entity)?;
        self.state.pending.delete(RecordKey::new(entity, key));
        Ok(())
    }

    pub fn delete_object<T: Entity>(&mut self, key: impl Into<String>) -> Result<()> {
        let entity = self.entity_name::<T>()?;
        self.delete(&entity, key)
    }

    /// Current value as this context sees it: pending changes over the store
    pub fn get(&self, entity: &str, key: &str) -> Result<Option<Value>> {
        self.check_entity(entity)?;
        let record = RecordKey::new(entity, key);
        match self.state.pending.get(&record) {
            Some(Change::Upsert(value)) => Ok(Some(value.clone())),
            Some(Change::Delete) => Ok(None),
            None => {
                let handle = self.inner.coordinator.store_for_entity(entity)?;
                handle
                    .store()
                    .fetch(&record)
                    .map_err(|e| self.report(persistence_error("fetch", e).with_entity(entity)))
            }
        }
    }

    pub fn get_object<T: Entity>(&self, key: &str) -> Result<Option<T>> {
        let entity = self.entity_name::<T>()?;
        match self.get(&entity, key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| self.report(serialization_error("get_object", &entity, e))),
            None => Ok(None),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.state.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.len()
    }

    /// Drop all unsaved changes
    pub fn rollback(&mut self) {
        self.state.pending.clear();
    }

    /// Commit pending changes to their stores and notify subscribers
    ///
    /// Changes are grouped by serving store and committed group by group;
    /// each store commits atomically, the save as a whole does not. When a
    /// store fails, the groups committed before it leave the pending set and
    /// are broadcast as a generation of their own, so readers match the
    /// stores. The rest stay pending for a later save. A save that
    /// committed nothing broadcasts nothing.
    pub fn save(&mut self) -> Result<SaveSummary> {
        if self.state.pending.is_empty() {
            return Ok(SaveSummary {
                generation: self.state.generation,
                change_count: 0,
                store_count: 0,
            });
        }

        let start = Instant::now();
        let change_count = self.state.pending.len();
        log_op_start!(
            "save",
            context_id = self.inner.id.as_str(),
            change_count = change_count
        );

        let outcome = match self.commit_pending() {
            Ok(outcome) => outcome,
            Err(err) => {
                log_op_error!("save", err, duration_ms = start.elapsed().as_millis() as u64);
                return Err(err);
            }
        };

        let committed_count = outcome.committed.len();
        let generation = self.publish(outcome.committed);

        match outcome.failure {
            None => {
                log_op_end!(
                    "save",
                    duration_ms = start.elapsed().as_millis() as u64,
                    generation = generation,
                    store_count = outcome.store_count
                );
                Ok(SaveSummary {
                    generation,
                    change_count,
                    store_count: outcome.store_count,
                })
            }
            Some((handle, cause)) => {
                let mut err = persistence_error("save", cause.clone())
                    .with_configuration(handle.configuration());
                if let Some(location) = handle.location() {
                    err = err.with_location(location);
                }
                if committed_count > 0 {
                    err = err.with_message(format!(
                        "{}; {} change(s) were already committed to other stores as generation {}",
                        cause, committed_count, generation
                    ));
                }
                let err = self.report(err);
                log_op_error!("save", err, duration_ms = start.elapsed().as_millis() as u64);
                Err(err)
            }
        }
    }

    /// Commit store groups in order until one fails
    fn commit_pending(&self) -> Result<CommitOutcome> {
        let coordinator = &self.inner.coordinator;
        let groups: Vec<(StoreHandle, ChangeSet)> = self
            .state
            .pending
            .clone()
            .partition(|entity| coordinator.store_for_entity(entity))?;

        let mut outcome = CommitOutcome {
            committed: ChangeSet::new(),
            store_count: 0,
            failure: None,
        };
        for (handle, changes) in groups {
            if let Err(cause) = handle.store().commit(&changes) {
                outcome.failure = Some((handle, cause));
                break;
            }
            outcome.committed.absorb(changes);
            outcome.store_count += 1;
        }
        Ok(outcome)
    }

    /// Drop `committed` from the pending set and broadcast it as the next
    /// generation; returns the generation readers should expect
    fn publish(&mut self, committed: ChangeSet) -> u64 {
        if committed.is_empty() {
            return self.state.generation;
        }
        for (record, _) in committed.iter() {
            self.state.pending.remove(record);
        }
        self.state.generation += 1;
        let generation = self.state.generation;
        self.broadcast(MergeNotification {
            source: self.inner.id.clone(),
            generation,
            changes: Arc::new(committed),
        });
        generation
    }

    fn broadcast(&self, notification: MergeNotification) {
        self.inner
            .subscribers
            .lock()
            .retain(|subscriber| subscriber.send(notification.clone()).is_ok());
    }

    /// Fold a child context's saved changes into the pending set
    pub(crate) fn absorb(&mut self, changes: ChangeSet) {
        self.state.pending.absorb(changes);
    }

    fn check_entity(&self, entity: &str) -> Result<()> {
        if self.inner.coordinator.entities().contains(entity) {
            return Ok(());
        }
        Err(self.report(
            TandemError::new(ErrorKind::MissingEntity)
                .with_op("write")
                .with_entity(entity)
                .with_message("entity is not declared"),
        ))
    }

    fn entity_name<T: 'static>(&self) -> Result<String> {
        self.inner
            .coordinator
            .entities()
            .entity_name::<T>()
            .map(str::to_string)
            .map_err(|err| self.report(err))
    }

    fn report(&self, err: TandemError) -> TandemError {
        self.inner.coordinator.report(err)
    }
}
