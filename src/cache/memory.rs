//! In-memory cache provider.
//!
//! [`InMemoryCache`] implements [`CacheProvider`] with a single
//! `parking_lot::Mutex` guarding both the entry map and the index-set map,
//! so multi-map mutations (entry plus its index memberships) stay coherent.
//! Expiration is lazy: every read checks the deadline and purges on the
//! spot. Namespace isolation is per-instance -- two `InMemoryCache` values
//! never see each other's keys.
//!
//! Used as the test double for the Redis provider and for single-process
//! deployments that do not need durability.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::cache::{deserialize_value, serialize_value, CacheProvider};
use crate::constants::DEFAULT_CACHE_TTL_SECS;

#[derive(Debug)]
struct Entry {
    raw: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[derive(Debug)]
struct IndexSet {
    members: HashSet<String>,
    expires_at: Option<Instant>,
}

impl IndexSet {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    indexes: HashMap<String, IndexSet>,
}

impl CacheState {
    /// Returns the live raw value for `key`, purging it if expired.
    fn live_raw(&mut self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            self.entries.remove(key);
            return None;
        }
        Some(entry.raw.clone())
    }

    /// Returns the live member set for an index, purging it if expired.
    fn live_members(&mut self, index_key: &str) -> HashSet<String> {
        let Some(set) = self.indexes.get(index_key) else {
            return HashSet::new();
        };
        if set.is_expired() {
            self.indexes.remove(index_key);
            return HashSet::new();
        }
        set.members.clone()
    }
}

fn index_key(index_name: &str, index_value: &str) -> String {
    format!("{index_name}:{index_value}")
}

fn deadline(ttl_secs: u64) -> Option<Instant> {
    Some(Instant::now() + Duration::from_secs(ttl_secs))
}

/// Thread-safe in-memory [`CacheProvider`].
///
/// # Examples
///
/// ```
/// use confirm_core::cache::{CacheProvider, InMemoryCache};
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let cache = InMemoryCache::new("confirmation");
/// assert!(cache.set("k", &json!({"a": 1}), None, &[]).await);
/// assert_eq!(cache.get("k").await, Some(json!({"a": 1})));
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryCache {
    namespace: String,
    default_ttl: u64,
    state: Mutex<CacheState>,
}

impl InMemoryCache {
    /// Creates an empty cache for the given namespace with the default TTL.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            default_ttl: DEFAULT_CACHE_TTL_SECS,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Sets the default TTL in seconds (builder pattern).
    ///
    /// # Examples
    ///
    /// ```
    /// use confirm_core::cache::InMemoryCache;
    ///
    /// let cache = InMemoryCache::new("confirmation").with_default_ttl(60);
    /// ```
    pub fn with_default_ttl(mut self, ttl_secs: u64) -> Self {
        self.default_ttl = ttl_secs;
        self
    }

    /// Number of primary entries currently stored (expired ones included
    /// until a read purges them).
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if no primary entries are stored.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

#[async_trait]
impl CacheProvider for InMemoryCache {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    async fn set(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<u64>,
        indexes: &[(&str, &str)],
    ) -> bool {
        let ttl_secs = ttl.unwrap_or(self.default_ttl);
        let mut state = self.state.lock();
        state.entries.insert(
            key.to_string(),
            Entry {
                raw: serialize_value(value),
                expires_at: deadline(ttl_secs),
            },
        );
        for (name, index_value) in indexes {
            let set = state
                .indexes
                .entry(index_key(name, index_value))
                .or_insert_with(|| IndexSet {
                    members: HashSet::new(),
                    expires_at: None,
                });
            set.members.insert(key.to_string());
            set.expires_at = deadline(ttl_secs);
        }
        tracing::debug!(
            namespace = %self.namespace,
            key,
            ttl_secs,
            "cached entry"
        );
        true
    }

    async fn get(&self, key: &str) -> Option<Value> {
        let raw = self.state.lock().live_raw(key)?;
        Some(deserialize_value(raw))
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        self.state.lock().live_raw(key)
    }

    async fn delete(&self, key: &str, indexes: &[(&str, &str)]) -> bool {
        let mut state = self.state.lock();
        let existed = match state.entries.remove(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        };
        for (name, index_value) in indexes {
            if let Some(set) = state.indexes.get_mut(&index_key(name, index_value)) {
                set.members.remove(key);
            }
        }
        existed
    }

    async fn exists(&self, key: &str) -> bool {
        self.state.lock().live_raw(key).is_some()
    }

    async fn update(&self, key: &str, patch: &Map<String, Value>, ttl: Option<u64>) -> bool {
        let mut state = self.state.lock();
        let Some(raw) = state.live_raw(key) else {
            tracing::warn!(namespace = %self.namespace, key, "update on missing key");
            return false;
        };
        let Value::Object(mut existing) = deserialize_value(raw) else {
            tracing::warn!(namespace = %self.namespace, key, "update on non-object value");
            return false;
        };
        for (field, value) in patch {
            existing.insert(field.clone(), value.clone());
        }
        let ttl_secs = ttl.unwrap_or(self.default_ttl);
        state.entries.insert(
            key.to_string(),
            Entry {
                raw: serialize_value(&Value::Object(existing)),
                expires_at: deadline(ttl_secs),
            },
        );
        true
    }

    async fn set_ttl(&self, key: &str, ttl: u64) -> bool {
        let mut state = self.state.lock();
        if state.live_raw(key).is_none() {
            return false;
        }
        if let Some(entry) = state.entries.get_mut(key) {
            entry.expires_at = deadline(ttl);
            return true;
        }
        false
    }

    async fn get_ttl(&self, key: &str) -> Option<i64> {
        let mut state = self.state.lock();
        state.live_raw(key)?;
        let entry = state.entries.get(key)?;
        match entry.expires_at {
            None => Some(-1),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                Some(remaining.as_secs() as i64)
            },
        }
    }

    async fn increment(&self, key: &str, amount: i64, ttl: Option<u64>) -> Option<i64> {
        let mut state = self.state.lock();
        match state.live_raw(key) {
            Some(raw) => {
                let Ok(current) = raw.parse::<i64>() else {
                    tracing::warn!(
                        namespace = %self.namespace,
                        key,
                        "increment on non-integer value"
                    );
                    return None;
                };
                let next = current + amount;
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.raw = next.to_string();
                }
                Some(next)
            },
            None => {
                // New counters only get an expiry when the caller asks for
                // one, matching INCRBY-then-EXPIRE semantics.
                state.entries.insert(
                    key.to_string(),
                    Entry {
                        raw: amount.to_string(),
                        expires_at: ttl.and_then(deadline),
                    },
                );
                Some(amount)
            },
        }
    }

    async fn get_by_index(&self, index_name: &str, index_value: &str) -> Vec<Value> {
        let mut state = self.state.lock();
        let composite = index_key(index_name, index_value);
        let members = state.live_members(&composite);

        let mut values = Vec::with_capacity(members.len());
        let mut stale = Vec::new();
        for member in &members {
            match state.live_raw(member) {
                Some(raw) => values.push(deserialize_value(raw)),
                None => stale.push(member.clone()),
            }
        }
        if !stale.is_empty() {
            if let Some(set) = state.indexes.get_mut(&composite) {
                for member in &stale {
                    set.members.remove(member);
                }
            }
            tracing::debug!(
                namespace = %self.namespace,
                index = %composite,
                removed = stale.len(),
                "purged stale index members"
            );
        }
        values
    }

    async fn get_keys_by_index(&self, index_name: &str, index_value: &str) -> HashSet<String> {
        self.state
            .lock()
            .live_members(&index_key(index_name, index_value))
    }

    async fn clear_namespace(&self) -> usize {
        let mut state = self.state.lock();
        // Count matches the Redis provider: primary keys plus index sets.
        let removed = state.entries.len() + state.indexes.len();
        state.entries.clear();
        state.indexes.clear();
        tracing::warn!(
            namespace = %self.namespace,
            removed,
            "cleared cache namespace"
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> InMemoryCache {
        InMemoryCache::new("confirmation")
    }

    // ---- set / get ----

    #[tokio::test]
    async fn set_then_get_round_trips_objects() {
        let cache = cache();
        assert!(cache.set("k", &json!({"a": 1, "b": [2, 3]}), None, &[]).await);
        assert_eq!(cache.get("k").await, Some(json!({"a": 1, "b": [2, 3]})));
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        assert_eq!(cache().get("nope").await, None);
    }

    #[tokio::test]
    async fn strings_are_stored_raw_and_survive_round_trip() {
        let cache = cache();
        cache.set("k", &json!("plain text"), None, &[]).await;
        assert_eq!(cache.get_raw("k").await.as_deref(), Some("plain text"));
        assert_eq!(cache.get("k").await, Some(json!("plain text")));
    }

    #[tokio::test]
    async fn get_raw_skips_deserialization() {
        let cache = cache();
        cache.set("k", &json!({"a": 1}), None, &[]).await;
        assert_eq!(cache.get_raw("k").await.as_deref(), Some(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn zero_ttl_entry_is_expired_on_read() {
        let cache = cache();
        cache.set("k", &json!(1), Some(0), &[]).await;
        assert_eq!(cache.get("k").await, None);
        // Lazy purge actually removed the entry.
        assert!(cache.is_empty());
    }

    // ---- delete / exists ----

    #[tokio::test]
    async fn delete_existing_returns_true() {
        let cache = cache();
        cache.set("k", &json!(1), None, &[]).await;
        assert!(cache.delete("k", &[]).await);
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn delete_missing_returns_false() {
        assert!(!cache().delete("nope", &[]).await);
    }

    #[tokio::test]
    async fn delete_removes_key_from_supplied_indexes() {
        let cache = cache();
        cache
            .set("k", &json!(1), None, &[("user_actions", "alice")])
            .await;
        cache.delete("k", &[("user_actions", "alice")]).await;
        assert!(cache.get_keys_by_index("user_actions", "alice").await.is_empty());
    }

    #[tokio::test]
    async fn exists_reflects_liveness() {
        let cache = cache();
        cache.set("k", &json!(1), None, &[]).await;
        assert!(cache.exists("k").await);
        cache.set("gone", &json!(1), Some(0), &[]).await;
        assert!(!cache.exists("gone").await);
    }

    // ---- update ----

    #[tokio::test]
    async fn update_merges_fields_into_object() {
        let cache = cache();
        cache.set("k", &json!({"a": 1, "b": 2}), None, &[]).await;
        let mut patch = Map::new();
        patch.insert("b".to_string(), json!(20));
        patch.insert("c".to_string(), json!(30));
        assert!(cache.update("k", &patch, None).await);
        assert_eq!(cache.get("k").await, Some(json!({"a": 1, "b": 20, "c": 30})));
    }

    #[tokio::test]
    async fn update_missing_key_returns_false() {
        assert!(!cache().update("nope", &Map::new(), None).await);
    }

    #[tokio::test]
    async fn update_non_object_returns_false() {
        let cache = cache();
        cache.set("k", &json!([1, 2, 3]), None, &[]).await;
        assert!(!cache.update("k", &Map::new(), None).await);
        // Original value untouched.
        assert_eq!(cache.get("k").await, Some(json!([1, 2, 3])));
    }

    // ---- TTL accessors ----

    #[tokio::test]
    async fn get_ttl_reports_remaining_seconds() {
        let cache = cache();
        cache.set("k", &json!(1), Some(120), &[]).await;
        let ttl = cache.get_ttl("k").await.unwrap();
        assert!((115..=120).contains(&ttl), "unexpected ttl: {ttl}");
    }

    #[tokio::test]
    async fn get_ttl_missing_key_returns_none() {
        assert_eq!(cache().get_ttl("nope").await, None);
    }

    #[tokio::test]
    async fn get_ttl_without_expiry_returns_minus_one() {
        let cache = cache();
        // Counters created without a TTL have no expiry.
        cache.increment("counter", 1, None).await;
        assert_eq!(cache.get_ttl("counter").await, Some(-1));
    }

    #[tokio::test]
    async fn set_ttl_refreshes_deadline() {
        let cache = cache();
        cache.set("k", &json!(1), Some(5), &[]).await;
        assert!(cache.set_ttl("k", 300).await);
        let ttl = cache.get_ttl("k").await.unwrap();
        assert!(ttl > 200, "unexpected ttl: {ttl}");
    }

    #[tokio::test]
    async fn set_ttl_missing_key_returns_false() {
        assert!(!cache().set_ttl("nope", 60).await);
    }

    // ---- increment ----

    #[tokio::test]
    async fn increment_creates_and_accumulates() {
        let cache = cache();
        assert_eq!(cache.increment("c", 1, None).await, Some(1));
        assert_eq!(cache.increment("c", 1, None).await, Some(2));
        assert_eq!(cache.increment("c", 5, None).await, Some(7));
    }

    #[tokio::test]
    async fn increment_applies_ttl_only_on_creation() {
        let cache = cache();
        cache.increment("c", 1, Some(100)).await;
        let first = cache.get_ttl("c").await.unwrap();
        assert!(first > 0);
        cache.increment("c", 1, Some(5000)).await;
        let second = cache.get_ttl("c").await.unwrap();
        assert!(second <= first, "ttl was refreshed on existing counter");
    }

    #[tokio::test]
    async fn increment_non_integer_returns_none() {
        let cache = cache();
        cache.set("k", &json!("text"), None, &[]).await;
        assert_eq!(cache.increment("k", 1, None).await, None);
    }

    // ---- secondary indexes ----

    #[tokio::test]
    async fn get_by_index_returns_live_values() {
        let cache = cache();
        cache
            .set("a1", &json!({"id": "a1"}), None, &[("user_actions", "alice")])
            .await;
        cache
            .set("a2", &json!({"id": "a2"}), None, &[("user_actions", "alice")])
            .await;
        cache
            .set("b1", &json!({"id": "b1"}), None, &[("user_actions", "bob")])
            .await;

        let values = cache.get_by_index("user_actions", "alice").await;
        assert_eq!(values.len(), 2);
        let ids: HashSet<&str> = values
            .iter()
            .map(|v| v["id"].as_str().unwrap())
            .collect();
        assert!(ids.contains("a1") && ids.contains("a2"));
    }

    #[tokio::test]
    async fn get_by_index_skips_and_purges_stale_members() {
        let cache = cache();
        cache
            .set("live", &json!({"id": "live"}), None, &[("user_actions", "alice")])
            .await;
        cache
            .set("dead", &json!({"id": "dead"}), Some(0), &[("user_actions", "alice")])
            .await;

        let values = cache.get_by_index("user_actions", "alice").await;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["id"], "live");

        // The stale member was removed from the set.
        let keys = cache.get_keys_by_index("user_actions", "alice").await;
        assert!(keys.contains("live"));
        assert!(!keys.contains("dead"));
    }

    #[tokio::test]
    async fn get_by_index_unknown_index_is_empty() {
        assert!(cache().get_by_index("user_actions", "nobody").await.is_empty());
    }

    #[tokio::test]
    async fn get_keys_by_index_returns_members() {
        let cache = cache();
        cache
            .set("k1", &json!(1), None, &[("user_actions", "alice")])
            .await;
        let keys = cache.get_keys_by_index("user_actions", "alice").await;
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("k1"));
    }

    #[tokio::test]
    async fn index_set_ttl_is_refreshed_on_each_addition() {
        let cache = cache();
        cache
            .set("k1", &json!(1), Some(0), &[("user_actions", "alice")])
            .await;
        // The set inherited the zero TTL and is gone...
        assert!(cache.get_keys_by_index("user_actions", "alice").await.is_empty());
        // ...but a later addition recreates it with a fresh TTL.
        cache
            .set("k2", &json!(2), Some(60), &[("user_actions", "alice")])
            .await;
        let keys = cache.get_keys_by_index("user_actions", "alice").await;
        assert!(keys.contains("k2"));
    }

    // ---- clear_namespace ----

    #[tokio::test]
    async fn clear_namespace_removes_everything() {
        let cache = cache();
        cache
            .set("k1", &json!(1), None, &[("user_actions", "alice")])
            .await;
        cache.set("k2", &json!(2), None, &[]).await;

        let removed = cache.clear_namespace().await;
        // k1, k2, and the user_actions:alice index set.
        assert_eq!(removed, 3);
        assert!(cache.is_empty());
        assert!(cache.get_keys_by_index("user_actions", "alice").await.is_empty());
    }

    #[tokio::test]
    async fn namespaces_are_isolated_per_instance() {
        let a = InMemoryCache::new("confirmation");
        let b = InMemoryCache::new("sessions");
        a.set("k", &json!(1), None, &[]).await;
        assert_eq!(b.get("k").await, None);
    }
}
