//! Identifiers for attached stores and execution contexts
//!
//! Both are UUIDv7 strings, so they sort by creation time in logs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one attached physical store
///
/// Two store handles refer to the same underlying store iff their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(String);

impl StoreId {
    /// Generate a new StoreId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create from an existing string (for deserialization)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a write, read or child context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_id_generation() {
        let id1 = StoreId::new();
        let id2 = StoreId::new();

        assert_ne!(id1, id2);
        assert!(!id1.as_str().is_empty());
    }

    #[test]
    fn test_store_id_display() {
        let id = StoreId::new();
        assert_eq!(format!("{}", id), id.as_str());
    }

    #[test]
    fn test_context_id_generation() {
        let id1 = ContextId::new();
        let id2 = ContextId::new();

        assert_ne!(id1, id2);
        assert!(!id1.as_str().is_empty());
    }

    #[test]
    fn test_serialization() {
        let id = StoreId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: StoreId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
