//! Namespaced, TTL-owning key-value cache abstraction.
//!
//! [`CacheProvider`] is the contract the confirmation store builds on. Two
//! implementations ship with the crate:
//!
//! - [`InMemoryCache`](memory::InMemoryCache) -- mutex-guarded maps with
//!   lazy expiration, for tests and single-process deployments.
//! - [`RedisCache`](redis::RedisCache) -- the production provider, behind
//!   the `redis` feature.
//!
//! # Key Structure
//!
//! Callers use *logical* keys. Providers compose physical keys as
//! `{namespace}:{key}` and index keys as
//! `{namespace}:{index_name}:{index_value}` (see [`make_key`] and
//! [`make_index_key`]). Index sets hold logical keys.
//!
//! # Failure Semantics
//!
//! Providers are best-effort: every backend fault is caught inside the
//! provider, logged at WARN with the operation name and key, and the
//! operation's documented default is returned (`false` for mutations,
//! `None`/empty for reads). Consumers that need a mutation to have
//! happened must treat the default as failure themselves.
//!
//! # Index Staleness
//!
//! Secondary indexes are intentionally loose: a set may contain members
//! whose primary keys have already expired. Providers skip (and
//! best-effort remove) stale members on indexed reads, and consumers must
//! tolerate staleness. The only guarantee is that every live entry is
//! reachable through its index.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;

/// Composes the physical cache key for a logical key.
///
/// # Examples
///
/// ```
/// use confirm_core::cache::make_key;
///
/// assert_eq!(make_key("confirmation", "action_0123456789ab"),
///            "confirmation:action_0123456789ab");
/// ```
pub fn make_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

/// Composes the physical key for a secondary index set.
///
/// # Examples
///
/// ```
/// use confirm_core::cache::make_index_key;
///
/// assert_eq!(make_index_key("confirmation", "user_actions", "alice"),
///            "confirmation:user_actions:alice");
/// ```
pub fn make_index_key(namespace: &str, index_name: &str, index_value: &str) -> String {
    format!("{namespace}:{index_name}:{index_value}")
}

/// Serializes a value for storage: strings go in raw, everything else as
/// compact JSON.
pub(crate) fn serialize_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reverses [`serialize_value`]: attempts a JSON parse and falls back to
/// the raw string when the stored bytes are not valid JSON.
pub(crate) fn deserialize_value(raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => Value::String(raw),
    }
}

/// Namespaced, asynchronous key-value store with TTL and secondary-set
/// indexes.
///
/// All operations take logical keys. Implementations must be `Send + Sync`
/// for use behind `Arc<dyn CacheProvider>`.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// The namespace prefixed onto every physical key.
    fn namespace(&self) -> &str;

    /// Default TTL in seconds, applied when an operation receives no TTL.
    fn default_ttl(&self) -> u64;

    /// Stores `value` under `key` with the given (or default) TTL.
    ///
    /// For each `(name, value)` pair in `indexes`, adds the logical key to
    /// the index set and refreshes that set's TTL to the same value.
    /// Returns `false` on backend failure.
    async fn set(&self, key: &str, value: &Value, ttl: Option<u64>, indexes: &[(&str, &str)])
        -> bool;

    /// Retrieves and deserializes the value at `key`.
    ///
    /// Returns `None` when the key is missing, expired, or the backend
    /// failed. Stored bytes that are not valid JSON come back as
    /// [`Value::String`].
    async fn get(&self, key: &str) -> Option<Value>;

    /// Retrieves the raw stored string at `key` without deserializing.
    async fn get_raw(&self, key: &str) -> Option<String>;

    /// Removes `key` and removes it from each supplied index set.
    ///
    /// Returns `true` iff the primary key existed.
    async fn delete(&self, key: &str, indexes: &[(&str, &str)]) -> bool;

    /// Returns `true` iff `key` exists and has not expired.
    async fn exists(&self, key: &str) -> bool;

    /// Read-modify-write of a stored JSON object: merges `patch` into the
    /// existing object and writes it back with a refreshed TTL.
    ///
    /// Returns `false` when the key is absent, the stored value is not an
    /// object, or the backend failed.
    async fn update(&self, key: &str, patch: &Map<String, Value>, ttl: Option<u64>) -> bool;

    /// Replaces the TTL of an existing key. Returns `false` when absent.
    async fn set_ttl(&self, key: &str, ttl: u64) -> bool;

    /// Remaining TTL of `key` in seconds.
    ///
    /// `None` when the key is absent; `Some(-1)` when the key has no
    /// expiration.
    async fn get_ttl(&self, key: &str) -> Option<i64>;

    /// Atomically adds `amount` to the integer at `key`, creating it at
    /// `amount` when absent (with `ttl` applied only on creation).
    ///
    /// Returns the new value, or `None` on backend failure or when the
    /// existing value is not an integer.
    async fn increment(&self, key: &str, amount: i64, ttl: Option<u64>) -> Option<i64>;

    /// Resolves an index set to its live values, skipping stale members.
    async fn get_by_index(&self, index_name: &str, index_value: &str) -> Vec<Value>;

    /// Returns the raw members of an index set (may include stale keys).
    async fn get_keys_by_index(&self, index_name: &str, index_value: &str) -> HashSet<String>;

    /// Deletes every key in this namespace, index sets included.
    ///
    /// Returns the number of keys removed.
    async fn clear_namespace(&self) -> usize;
}
