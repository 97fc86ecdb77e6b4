//! Read context
//!
//! Foreground, read-only view of saved state. Entities are loaded lazily from
//! a snapshot taken on the write queue; later saves arrive as merge
//! notifications and are applied one whole save at a time.

use super::notification::MergeNotification;
use super::write::WriteContext;
use crate::errors::{serialization_error, Result};
use crate::model::{Change, Entity, RecordKey};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use tandem_core_types::ContextId;

#[derive(Default)]
struct ReadState {
    objects: HashMap<RecordKey, Value>,
    // entity -> save generation its snapshot reflects
    loaded: HashMap<String, u64>,
    merged_generation: u64,
}

// Notifications received from the write context, in generation order.
// `held` keeps those taken off the channel but not yet applied.
struct Inbox {
    receiver: mpsc::Receiver<MergeNotification>,
    held: VecDeque<MergeNotification>,
}

impl Inbox {
    /// Next notification, if any, whose generation is at most `limit`
    fn next_up_to(&mut self, limit: Option<u64>) -> Option<MergeNotification> {
        let within = |n: &MergeNotification| limit.map_or(true, |limit| n.generation <= limit);
        if let Some(front) = self.held.front() {
            return if within(front) {
                self.held.pop_front()
            } else {
                None
            };
        }
        let notification = self.receiver.try_recv().ok()?;
        if within(&notification) {
            Some(notification)
        } else {
            self.held.push_back(notification);
            None
        }
    }
}

pub struct ReadContext {
    id: ContextId,
    write: WriteContext,
    inbox: Mutex<Inbox>,
    state: RwLock<ReadState>,
    auto_merge: bool,
}

impl ReadContext {
    /// Derive a read context subscribed to `write`'s saves
    pub(crate) fn new(write: &WriteContext, auto_merge: bool) -> Self {
        Self {
            id: ContextId::new(),
            inbox: Mutex::new(Inbox {
                receiver: write.subscribe(),
                held: VecDeque::new(),
            }),
            write: write.clone(),
            state: RwLock::new(ReadState::default()),
            auto_merge,
        }
    }

    pub fn id(&self) -> &ContextId {
        &self.id
    }

    pub fn auto_merge(&self) -> bool {
        self.auto_merge
    }

    /// Saved value of one record
    pub fn get(&self, entity: &str, key: &str) -> Result<Option<Value>> {
        self.prepare(entity)?;
        Ok(self
            .state
            .read()
            .objects
            .get(&RecordKey::new(entity, key))
            .cloned())
    }

    pub fn get_object<T: Entity>(&self, key: &str) -> Result<Option<T>> {
        let entity = self.entity_name::<T>()?;
        match self.get(&entity, key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| self.write.report(serialization_error("get_object", &entity, e))),
            None => Ok(None),
        }
    }

    /// All saved records of `entity`, ordered by key
    pub fn fetch_all(&self, entity: &str) -> Result<Vec<(String, Value)>> {
        self.prepare(entity)?;
        let state = self.state.read();
        let mut rows: Vec<(String, Value)> = state
            .objects
            .iter()
            .filter(|(record, _)| record.entity == entity)
            .map(|(record, value)| (record.key.clone(), value.clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    pub fn fetch_all_objects<T: Entity>(&self) -> Result<Vec<(String, T)>> {
        let entity = self.entity_name::<T>()?;
        self.fetch_all(&entity)?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_value(value)
                    .map(|object| (key, object))
                    .map_err(|e| {
                        self.write
                            .report(serialization_error("fetch_all_objects", &entity, e))
                    })
            })
            .collect()
    }

    /// Apply every queued merge notification; returns how many were applied
    pub fn merge_pending(&self) -> usize {
        let mut inbox = self.inbox.lock();
        let mut merged = 0;
        while let Some(notification) = inbox.next_up_to(None) {
            apply(&mut self.state.write(), &notification);
            merged += 1;
        }
        merged
    }

    /// Highest save generation merged so far
    pub fn merged_generation(&self) -> u64 {
        self.state.read().merged_generation
    }

    /// Drop every cached entity; the next read reloads from the stores
    pub fn refresh(&self) {
        let mut state = self.state.write();
        state.objects.clear();
        state.loaded.clear();
    }

    fn prepare(&self, entity: &str) -> Result<()> {
        self.write
            .entities()
            .binding(entity)
            .map_err(|err| self.write.report(err))?;
        if self.auto_merge {
            self.merge_pending();
        }
        self.ensure_loaded(entity)
    }

    /// Load `entity` from a committed snapshot
    ///
    /// A snapshot at generation G already shows every save up to G, so the
    /// notifications up to G are merged under the same lock. Other loaded
    /// entities then never lag behind the one just loaded.
    fn ensure_loaded(&self, entity: &str) -> Result<()> {
        loop {
            if self.state.read().loaded.contains_key(entity) {
                return Ok(());
            }

            let (generation, rows) = self.write.snapshot_entity(entity)?;

            let mut inbox = self.inbox.lock();
            let mut state = self.state.write();
            if state.loaded.contains_key(entity) {
                return Ok(());
            }
            // Merged past the snapshot meanwhile; the rows are stale.
            if state.merged_generation > generation {
                continue;
            }

            let mut merged = 0;
            while let Some(notification) = inbox.next_up_to(Some(generation)) {
                apply(&mut state, &notification);
                merged += 1;
            }
            for (key, value) in rows {
                state.objects.insert(RecordKey::new(entity, key), value);
            }
            state.loaded.insert(entity.to_string(), generation);
            tracing::debug!(
                context_id = self.id.as_str(),
                entity,
                generation,
                merged,
                "entity snapshot loaded"
            );
            return Ok(());
        }
    }

    fn entity_name<T: 'static>(&self) -> Result<String> {
        self.write
            .entities()
            .entity_name::<T>()
            .map(str::to_string)
            .map_err(|err| self.write.report(err))
    }
}

// One write lock per notification: readers see all of a save or none of it.
fn apply(state: &mut ReadState, notification: &MergeNotification) {
    for (record, change) in notification.changes.iter() {
        let fresh = state
            .loaded
            .get(&record.entity)
            .is_some_and(|&snapshot| notification.generation > snapshot);
        if !fresh {
            continue;
        }
        match change {
            Change::Upsert(value) => {
                state.objects.insert(record.clone(), value.clone());
            }
            Change::Delete => {
                state.objects.remove(record);
            }
        }
    }
    state.merged_generation = state.merged_generation.max(notification.generation);
}
