//! Child contexts: isolated units of work on top of the write context
//!
//! A child collects changes privately. Saving a child hands its changes to
//! the write context's pending set; they reach the stores with the write
//! context's next save.

use super::write::WriteContext;
use crate::errors::{serialization_error, ErrorKind, Result, TandemError};
use crate::model::{Change, ChangeSet, Entity, RecordKey};
use parking_lot::Mutex;
use serde_json::Value;
use tandem_core_types::ContextId;

pub struct ChildContext {
    id: ContextId,
    parent: WriteContext,
    pending: Mutex<ChangeSet>,
}

impl ChildContext {
    pub(crate) fn new(parent: WriteContext) -> Self {
        Self {
            id: ContextId::new(),
            parent,
            pending: Mutex::new(ChangeSet::new()),
        }
    }

    pub fn id(&self) -> &ContextId {
        &self.id
    }

    pub fn put(&self, entity: &str, key: impl Into<String>, value: Value) -> Result<()> {
        self.check_entity(entity)?;
        self.pending.lock().upsert(RecordKey::new(entity, key), value);
        Ok(())
    }

    pub fn put_object<T: Entity>(&self, key: impl Into<String>, object: &T) -> Result<()> {
        let entity = self.entity_name::<T>()?;
        let value = serde_json::to_value(object)
            .map_err(|e| self.parent.report(serialization_error("put_object", &entity, e)))?;
        self.put(&entity, key, value)
    }

    pub fn delete(&self, entity: &str, key: impl Into<String>) -> Result<()> {
        self.check_entity(entity)?;
        self.pending.lock().delete(RecordKey::new(entity, key));
        Ok(())
    }

    /// Value as this child sees it: its own changes, then the parent's view
    pub fn get(&self, entity: &str, key: &str) -> Result<Option<Value>> {
        self.check_entity(entity)?;
        if let Some(change) = self.pending.lock().get(&RecordKey::new(entity, key)) {
            return Ok(match change {
                Change::Upsert(value) => Some(value.clone()),
                Change::Delete => None,
            });
        }

        let (entity, key) = (entity.to_string(), key.to_string());
        self.parent
            .perform_and_wait(move |scope| scope.get(&entity, &key))
            .and_then(|result| result)
    }

    pub fn get_object<T: Entity>(&self, key: &str) -> Result<Option<T>> {
        let entity = self.entity_name::<T>()?;
        match self.get(&entity, key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| self.parent.report(serialization_error("get_object", &entity, e))),
            None => Ok(None),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Drop the child's unsaved changes
    pub fn discard(&self) {
        self.pending.lock().clear();
    }

    /// Push the child's changes into the write context; returns how many
    ///
    /// On failure the changes stay in the child.
    pub fn save(&self) -> Result<usize> {
        let changes = std::mem::take(&mut *self.pending.lock());
        if changes.is_empty() {
            return Ok(0);
        }
        let count = changes.len();
        let handoff = changes.clone();

        match self
            .parent
            .perform_and_wait(move |scope| scope.absorb(handoff))
        {
            Ok(()) => {
                tracing::debug!(
                    child = self.id.as_str(),
                    parent = self.parent.id().as_str(),
                    change_count = count,
                    "child changes pushed to write context"
                );
                Ok(count)
            }
            Err(err) => {
                let mut pending = self.pending.lock();
                let newer = std::mem::replace(&mut *pending, changes);
                pending.absorb(newer);
                Err(err)
            }
        }
    }

    fn check_entity(&self, entity: &str) -> Result<()> {
        if self.parent.entities().contains(entity) {
            return Ok(());
        }
        Err(self.parent.report(
            TandemError::new(ErrorKind::MissingEntity)
                .with_op("child_write")
                .with_entity(entity)
                .with_message("entity is not declared"),
        ))
    }

    fn entity_name<T: 'static>(&self) -> Result<String> {
        self.parent
            .entities()
            .entity_name::<T>()
            .map(str::to_string)
            .map_err(|err| self.parent.report(err))
    }
}

impl Drop for ChildContext {
    fn drop(&mut self) {
        self.parent.release_child();
    }
}
