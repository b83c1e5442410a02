//! Ephemeral key-value store abstraction
//!
//! The store is the single source of truth for live call state. Keys carry an
//! optional time-to-live after which the store discards them on its own.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Wrong value type for key: {0}")]
    WrongType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Async key-value store with per-key TTL, string/set/list values and
/// pattern-based key enumeration.
///
/// `keys` supports only a trailing `*` glob; enumerating is O(n) over the key
/// space and is reserved for bounded maintenance and scan paths.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a string value, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Remove a key. Returns whether the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Re-apply a TTL to an existing key. Returns false for missing keys.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Add a member to a set, creating the set if absent. Returns whether the
    /// member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Remove a member from a set. Returns whether the member was present.
    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Push a value at the head of a list, creating the list if absent.
    /// Returns the new list length.
    async fn list_push_front(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Inclusive range over a list; negative indices count from the tail,
    /// `-1` meaning the last element.
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    /// Enumerate keys matching a pattern (exact match or trailing `*`).
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;
}
