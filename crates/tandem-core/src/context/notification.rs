use crate::model::ChangeSet;
use std::sync::Arc;
use tandem_core_types::ContextId;

/// Broadcast by the write context after a save has been committed
///
/// Carries the complete change set of one save; receivers apply it as a unit.
#[derive(Debug, Clone)]
pub struct MergeNotification {
    pub source: ContextId,
    /// Save generation, strictly increasing per write context
    pub generation: u64,
    pub changes: Arc<ChangeSet>,
}

/// Outcome of one save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveSummary {
    /// Generation after the save; unchanged when nothing was pending
    pub generation: u64,
    pub change_count: usize,
    pub store_count: usize,
}
