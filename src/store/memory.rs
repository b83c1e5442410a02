//! In-process ephemeral store backed by a concurrent map
//!
//! Used as the test double and for single-node deployments. Expired entries
//! are treated as absent on access and reaped lazily; `purge_expired` can be
//! run periodically to reclaim memory.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use super::{EphemeralStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Concurrent in-memory store with per-key TTL
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn deadline(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| Instant::now() + ttl)
    }

    /// Remove the entry if it has expired; returns true when the key is live.
    fn reap(&self, key: &str) -> bool {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return false;
            }
            return true;
        }
        false
    }

    /// Drop every expired entry. Cheap enough to run on a timer.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }
}

fn resolve_index(index: i64, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs() as usize)
    } else {
        (index as usize).min(len)
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if !self.reap(key) {
            return Ok(None);
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(Value::Text(text)) => Ok(Some(text)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Self::deadline(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let live = self.reap(key);
        self.entries.remove(key);
        Ok(live)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        if !self.reap(key) {
            return Ok(false);
        }
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Self::deadline(Some(ttl));
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.reap(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        if !self.reap(key) {
            return Ok(false);
        }
        match self.entries.get_mut(key).as_deref_mut() {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.remove(member)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(false),
        }
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        if !self.reap(key) {
            return Ok(Vec::new());
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(Value::Set(set)) => Ok(set.into_iter().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn list_push_front(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.reap(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(list) => {
                list.push_front(value.to_string());
                Ok(list.len() as u64)
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        if !self.reap(key) {
            return Ok(Vec::new());
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(Value::List(list)) => {
                let len = list.len();
                let from = resolve_index(start, len);
                let to = resolve_index(stop, len).min(len.saturating_sub(1));
                if len == 0 || from > to {
                    return Ok(Vec::new());
                }
                Ok(list.iter().skip(from).take(to - from + 1).cloned().collect())
            }
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let matches: Vec<String> = match pattern.strip_suffix('*') {
            Some(prefix) => self
                .entries
                .iter()
                .filter(|e| !e.value().is_expired() && e.key().starts_with(prefix))
                .map(|e| e.key().clone())
                .collect(),
            None => self
                .entries
                .iter()
                .filter(|e| !e.value().is_expired() && e.key() == pattern)
                .map(|e| e.key().clone())
                .collect(),
        };
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = MemoryStore::new();

        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_keys() {
        let store = MemoryStore::new();

        store
            .set("k", "v", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_refreshes_ttl() {
        let store = MemoryStore::new();

        store
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.expire("k", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryStore::new();

        assert!(store.set_add("s", "a").await.unwrap());
        assert!(store.set_add("s", "b").await.unwrap());
        assert!(!store.set_add("s", "a").await.unwrap());

        let mut members = store.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

        assert!(store.set_remove("s", "a").await.unwrap());
        assert!(!store.set_remove("s", "a").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_list_push_and_range() {
        let store = MemoryStore::new();

        store.list_push_front("l", "first").await.unwrap();
        store.list_push_front("l", "second").await.unwrap();
        let len = store.list_push_front("l", "third").await.unwrap();
        assert_eq!(len, 3);

        // Newest first
        let all = store.list_range("l", 0, -1).await.unwrap();
        assert_eq!(all, vec!["third", "second", "first"]);

        let top_two = store.list_range("l", 0, 1).await.unwrap();
        assert_eq!(top_two, vec!["third", "second"]);

        assert!(store.list_range("l", 5, 9).await.unwrap().is_empty());
        assert!(store.list_range("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_pattern() {
        let store = MemoryStore::new();

        store.set("call:1", "a", None).await.unwrap();
        store.set("call:2", "b", None).await.unwrap();
        store.set("user:1", "c", None).await.unwrap();

        let mut keys = store.keys("call:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["call:1".to_string(), "call:2".to_string()]);

        assert_eq!(store.keys("user:1").await.unwrap(), vec!["user:1".to_string()]);
        assert!(store.keys("missing:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let store = MemoryStore::new();

        store.set("k", "text", None).await.unwrap();
        assert!(matches!(
            store.set_add("k", "member").await,
            Err(StoreError::WrongType(_))
        ));
        assert!(matches!(
            store.list_push_front("k", "v").await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();

        store
            .set("short", "v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.set("long", "v", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.get("long").await.unwrap().is_some());
    }
}
