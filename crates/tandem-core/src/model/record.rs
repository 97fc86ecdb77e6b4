//! Records and change sets exchanged with storage engines

use serde_json::Value;
use std::collections::BTreeMap;

/// Address of one stored value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub entity: String,
    pub key: String,
}

impl RecordKey {
    pub fn new(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: key.into(),
        }
    }
}

/// A pending mutation of one record
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Upsert(Value),
    Delete,
}

/// Ordered set of pending changes; the last change to a key wins
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: BTreeMap<RecordKey, Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, key: RecordKey, value: Value) {
        self.changes.insert(key, Change::Upsert(value));
    }

    pub fn delete(&mut self, key: RecordKey) {
        self.changes.insert(key, Change::Delete);
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Change> {
        self.changes.get(key)
    }

    pub fn remove(&mut self, key: &RecordKey) -> Option<Change> {
        self.changes.remove(key)
    }

    /// Fold `other` into this set, `other` winning on conflicts
    pub fn absorb(&mut self, other: ChangeSet) {
        self.changes.extend(other.changes);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &Change)> {
        self.changes.iter()
    }

    /// Entity names touched by this set, deduplicated and sorted
    pub fn entities(&self) -> Vec<&str> {
        let mut entities: Vec<&str> = self.changes.keys().map(|k| k.entity.as_str()).collect();
        entities.dedup();
        entities
    }

    /// Split into per-group sets using `group_of` on each entity
    pub fn partition<G, F, E>(self, mut group_of: F) -> Result<Vec<(G, ChangeSet)>, E>
    where
        G: PartialEq,
        F: FnMut(&str) -> Result<G, E>,
    {
        let mut groups: Vec<(G, ChangeSet)> = Vec::new();
        for (key, change) in self.changes {
            let group = group_of(&key.entity)?;
            match groups.iter_mut().find(|(g, _)| *g == group) {
                Some((_, set)) => {
                    set.changes.insert(key, change);
                }
                None => {
                    let mut set = ChangeSet::new();
                    set.changes.insert(key, change);
                    groups.push((group, set));
                }
            }
        }
        Ok(groups)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}
