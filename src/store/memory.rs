//! In-process store, used by the binary when no Valkey URL is configured
//! and by tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use super::{OrderedSetStore, SessionStore};
use crate::error::{Result, SessionError};

struct StoredValue {
    bytes: Vec<u8>,
    /// `None` for values stored with a zero ttl
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A thread-safe in-memory store with lazy expiry.
///
/// Expired values are dropped when they are next read, or in bulk by
/// [`MemoryStore::purge_expired`].
#[derive(Default)]
pub struct MemoryStore {
    values: DashMap<String, StoredValue>,
    sorted_sets: RwLock<HashMap<String, HashMap<String, f64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.values.iter().filter(|v| !v.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired value, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.values.len();
        self.values.retain(|_, v| !v.is_expired(now));
        before - self.values.len()
    }

    /// Remove all values and sorted sets.
    pub fn clear(&self) {
        self.values.clear();
        self.sorted_sets.write().clear();
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let now = Instant::now();
        if let Some(value) = self.values.get(key) {
            if !value.is_expired(now) {
                return Ok(value.bytes.clone());
            }
        }

        // Drop the expired entry; the read guard above is released by now.
        if self.values.remove_if(key, |_, v| v.is_expired(now)).is_some() {
            trace!(key = %key, "Expired value removed");
        }
        Err(SessionError::NotFound { key: key.to_string() })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.values.insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    fn ordered_set(&self) -> Option<&dyn OrderedSetStore> {
        Some(self)
    }
}

#[async_trait]
impl OrderedSetStore for MemoryStore {
    async fn add_scored(&self, set_key: &str, member: &str, score: f64) -> Result<()> {
        let mut sets = self.sorted_sets.write();
        sets.entry(set_key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()> {
        let mut sets = self.sorted_sets.write();
        if let Some(set) = sets.get_mut(set_key) {
            set.remove(member);
            if set.is_empty() {
                sets.remove(set_key);
            }
        }
        Ok(())
    }

    async fn range_with_scores(&self, set_key: &str) -> Result<Vec<(String, f64)>> {
        let sets = self.sorted_sets.read();
        let mut members: Vec<(String, f64)> = sets
            .get(set_key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("sess:nope").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound { ref key } if key == "sess:nope"));
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", vec![1, 2, 3], Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.len(), 1);

        store.delete("k").await.unwrap();
        assert!(store.get("k").await.is_err());
        assert!(store.is_empty());

        // Deleting again is fine
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.set("short", vec![1], Duration::from_millis(20)).await.unwrap();
        store.set("forever", vec![2], Duration::ZERO).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            store.get("short").await,
            Err(SessionError::NotFound { .. })
        ));
        assert_eq!(store.get("forever").await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_set_refreshes_ttl() {
        let store = MemoryStore::new();
        store.set("k", vec![1], Duration::from_millis(20)).await.unwrap();
        store.set("k", vec![2], Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get("k").await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.set("a", vec![1], Duration::from_millis(10)).await.unwrap();
        store.set("b", vec![1], Duration::from_millis(10)).await.unwrap();
        store.set("c", vec![1], Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        store.set("a", vec![1], Duration::from_secs(60)).await.unwrap();
        store.add_scored("online", "alice", 1.0).await.unwrap();

        store.clear();

        assert!(store.is_empty());
        assert!(store.range_with_scores("online").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sorted_set() {
        let store = MemoryStore::new();
        let set = store.ordered_set().unwrap();

        set.add_scored("online", "bob", 20.0).await.unwrap();
        set.add_scored("online", "alice", 10.0).await.unwrap();
        set.add_scored("online", "carol", 30.0).await.unwrap();
        set.add_scored("online", "alice", 40.0).await.unwrap();

        let members = set.range_with_scores("online").await.unwrap();
        assert_eq!(
            members,
            vec![
                ("bob".to_string(), 20.0),
                ("carol".to_string(), 30.0),
                ("alice".to_string(), 40.0),
            ]
        );

        set.remove_member("online", "carol").await.unwrap();
        set.remove_member("online", "nobody").await.unwrap();
        assert_eq!(set.range_with_scores("online").await.unwrap().len(), 2);
        assert!(set.range_with_scores("other").await.unwrap().is_empty());
    }
}
