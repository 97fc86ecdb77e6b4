//! Checksums for applied migrations
//!
//! Each applied step is recorded with the SHA-256 of its SQL so later audits
//! can tell which script a store was upgraded with.

use sha2::{Digest, Sha256};

/// Compute SHA256 checksum of a string
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
