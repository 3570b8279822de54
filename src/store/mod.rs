//! Storage backends for session records.
//!
//! The session manager only needs three operations from a store: get a value,
//! set it with a time to live, and delete it. Online-user tracking also needs
//! a sorted set, which stores expose through [`SessionStore::ordered_set`].

mod memory;
mod valkey;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub use memory::MemoryStore;
pub use valkey::ValkeyStore;

/// Key/value storage with expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get the bytes stored under `key`, or `SessionError::NotFound`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Sorted-set operations, if the backend supports them.
    fn ordered_set(&self) -> Option<&dyn OrderedSetStore> {
        None
    }
}

/// Sorted sets of string members with floating point scores.
#[async_trait]
pub trait OrderedSetStore: Send + Sync {
    /// Add `member` with `score`, replacing any previous score.
    async fn add_scored(&self, set_key: &str, member: &str, score: f64) -> Result<()>;

    /// Remove `member` from the set.
    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()>;

    /// Every member with its score, lowest score first.
    async fn range_with_scores(&self, set_key: &str) -> Result<Vec<(String, f64)>>;
}
