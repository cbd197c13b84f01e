//! Redis cache provider.
//!
//! [`RedisCache`] implements [`CacheProvider`] over a lazily-established
//! [`MultiplexedConnection`]. The connection is created on first use and
//! cloned per operation (clones share one TCP connection).
//!
//! # Wire Commands
//!
//! | Operation          | Commands                                   |
//! |--------------------|--------------------------------------------|
//! | `set`              | `SETEX`, `SADD` + `EXPIRE` per index       |
//! | `get` / `get_raw`  | `GET`                                      |
//! | `delete`           | `DEL`, `SREM` per index                    |
//! | `exists`           | `EXISTS`                                   |
//! | `set_ttl`/`get_ttl`| `EXPIRE` / `TTL`                           |
//! | `increment`        | `INCRBY` (+ `EXPIRE` on creation)          |
//! | index reads        | `SMEMBERS`, `GET` per member, `SREM` stale |
//! | `clear_namespace`  | `SCAN MATCH {namespace}:* COUNT 100`, `DEL`|
//!
//! Operations are individually atomic; there are no Lua scripts and no
//! transactions. The gaps between commands are tolerated by design: index
//! sets may go stale, and readers filter accordingly.
//!
//! # Failure Semantics
//!
//! Backend faults never escape: each operation logs the fault at WARN with
//! the operation name and key, then returns its documented default.

use std::collections::HashSet;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, RedisError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::cache::{deserialize_value, make_index_key, make_key, serialize_value, CacheProvider};
use crate::constants::DEFAULT_CACHE_TTL_SECS;

/// Redis-backed [`CacheProvider`].
///
/// # Examples
///
/// ```rust,no_run
/// use confirm_core::cache::RedisCache;
///
/// # fn example() {
/// let cache = RedisCache::new("redis://127.0.0.1:6379", "confirmation")
///     .unwrap()
///     .with_default_ttl(600);
/// # }
/// ```
#[derive(Debug)]
pub struct RedisCache {
    client: Option<Client>,
    conn: OnceCell<MultiplexedConnection>,
    namespace: String,
    default_ttl: u64,
}

impl RedisCache {
    /// Creates a provider for the given Redis URL and namespace.
    ///
    /// The URL format is `redis://[:<password>@]<host>:<port>[/<db>]`. The
    /// URL is validated here; the connection itself is established lazily
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RedisError`] when the URL cannot be parsed.
    pub fn new(url: &str, namespace: impl Into<String>) -> Result<Self, RedisError> {
        Ok(Self {
            client: Some(Client::open(url)?),
            conn: OnceCell::new(),
            namespace: namespace.into(),
            default_ttl: DEFAULT_CACHE_TTL_SECS,
        })
    }

    /// Creates a provider around an already-established connection.
    ///
    /// Useful when the embedding service manages connection lifecycle.
    pub fn with_connection(conn: MultiplexedConnection, namespace: impl Into<String>) -> Self {
        Self {
            client: None,
            conn: OnceCell::from(conn),
            namespace: namespace.into(),
            default_ttl: DEFAULT_CACHE_TTL_SECS,
        }
    }

    /// Sets the default TTL in seconds (builder pattern).
    pub fn with_default_ttl(mut self, ttl_secs: u64) -> Self {
        self.default_ttl = ttl_secs;
        self
    }

    /// Returns a clone of the multiplexed connection, establishing it on
    /// first use.
    async fn connection(&self) -> Result<MultiplexedConnection, RedisError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                // The cell is pre-filled by with_connection, so this
                // initializer only runs for URL-constructed providers.
                match self.client.as_ref() {
                    Some(client) => client.get_multiplexed_async_connection().await,
                    None => Err(RedisError::from((
                        ::redis::ErrorKind::ClientError,
                        "no redis client configured",
                    ))),
                }
            })
            .await?;
        Ok(conn.clone())
    }

    fn key(&self, key: &str) -> String {
        make_key(&self.namespace, key)
    }

    fn index(&self, index_name: &str, index_value: &str) -> String {
        make_index_key(&self.namespace, index_name, index_value)
    }

    fn warn(&self, operation: &str, key: &str, err: &RedisError) {
        tracing::warn!(
            namespace = %self.namespace,
            operation,
            key,
            error = %err,
            "redis cache operation failed"
        );
    }

    // ---- Fallible inner operations ----

    async fn try_set(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<u64>,
        indexes: &[(&str, &str)],
    ) -> Result<(), RedisError> {
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.unwrap_or(self.default_ttl);
        conn.set_ex::<_, _, ()>(self.key(key), serialize_value(value), ttl_secs)
            .await?;
        for (name, index_value) in indexes {
            let index_key = self.index(name, index_value);
            conn.sadd::<_, _, ()>(&index_key, key).await?;
            conn.expire::<_, ()>(&index_key, ttl_secs as i64).await?;
        }
        Ok(())
    }

    async fn try_get_raw(&self, key: &str) -> Result<Option<String>, RedisError> {
        let mut conn = self.connection().await?;
        conn.get(self.key(key)).await
    }

    async fn try_delete(&self, key: &str, indexes: &[(&str, &str)]) -> Result<bool, RedisError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(self.key(key)).await?;
        for (name, index_value) in indexes {
            conn.srem::<_, _, ()>(self.index(name, index_value), key)
                .await?;
        }
        Ok(removed > 0)
    }

    async fn try_exists(&self, key: &str) -> Result<bool, RedisError> {
        let mut conn = self.connection().await?;
        conn.exists(self.key(key)).await
    }

    async fn try_set_ttl(&self, key: &str, ttl: u64) -> Result<bool, RedisError> {
        let mut conn = self.connection().await?;
        conn.expire(self.key(key), ttl as i64).await
    }

    async fn try_get_ttl(&self, key: &str) -> Result<i64, RedisError> {
        let mut conn = self.connection().await?;
        conn.ttl(self.key(key)).await
    }

    async fn try_increment(
        &self,
        key: &str,
        amount: i64,
        ttl: Option<u64>,
    ) -> Result<i64, RedisError> {
        let mut conn = self.connection().await?;
        let physical = self.key(key);
        let next: i64 = conn.incr(&physical, amount).await?;
        // First increment created the key; apply the TTL if one was asked for.
        if next == amount {
            if let Some(ttl_secs) = ttl {
                conn.expire::<_, ()>(&physical, ttl_secs as i64).await?;
            }
        }
        Ok(next)
    }

    async fn try_members(&self, index_key: &str) -> Result<Vec<String>, RedisError> {
        let mut conn = self.connection().await?;
        conn.smembers(index_key).await
    }

    async fn try_scan_namespace(&self) -> Result<Vec<String>, RedisError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", self.namespace);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheProvider for RedisCache {
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
        match self.try_set(key, value, ttl, indexes).await {
            Ok(()) => true,
            Err(err) => {
                self.warn("set", key, &err);
                false
            },
        }
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.get_raw(key).await.map(deserialize_value)
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        match self.try_get_raw(key).await {
            Ok(raw) => raw,
            Err(err) => {
                self.warn("get", key, &err);
                None
            },
        }
    }

    async fn delete(&self, key: &str, indexes: &[(&str, &str)]) -> bool {
        match self.try_delete(key, indexes).await {
            Ok(removed) => removed,
            Err(err) => {
                self.warn("delete", key, &err);
                false
            },
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.try_exists(key).await {
            Ok(exists) => exists,
            Err(err) => {
                self.warn("exists", key, &err);
                false
            },
        }
    }

    async fn update(&self, key: &str, patch: &Map<String, Value>, ttl: Option<u64>) -> bool {
        let Some(existing) = self.get(key).await else {
            tracing::warn!(namespace = %self.namespace, key, "update on missing key");
            return false;
        };
        let Value::Object(mut merged) = existing else {
            tracing::warn!(namespace = %self.namespace, key, "update on non-object value");
            return false;
        };
        for (field, value) in patch {
            merged.insert(field.clone(), value.clone());
        }
        self.set(key, &Value::Object(merged), ttl, &[]).await
    }

    async fn set_ttl(&self, key: &str, ttl: u64) -> bool {
        match self.try_set_ttl(key, ttl).await {
            Ok(applied) => applied,
            Err(err) => {
                self.warn("set_ttl", key, &err);
                false
            },
        }
    }

    async fn get_ttl(&self, key: &str) -> Option<i64> {
        match self.try_get_ttl(key).await {
            // -2: key does not exist; -1: key has no expiration.
            Ok(-2) => None,
            Ok(ttl) => Some(ttl),
            Err(err) => {
                self.warn("get_ttl", key, &err);
                None
            },
        }
    }

    async fn increment(&self, key: &str, amount: i64, ttl: Option<u64>) -> Option<i64> {
        match self.try_increment(key, amount, ttl).await {
            Ok(next) => Some(next),
            Err(err) => {
                self.warn("increment", key, &err);
                None
            },
        }
    }

    async fn get_by_index(&self, index_name: &str, index_value: &str) -> Vec<Value> {
        let index_key = self.index(index_name, index_value);
        let members = match self.try_members(&index_key).await {
            Ok(members) => members,
            Err(err) => {
                self.warn("get_by_index", &index_key, &err);
                return Vec::new();
            },
        };

        let mut values = Vec::with_capacity(members.len());
        let mut stale = Vec::new();
        for member in members {
            match self.get_raw(&member).await {
                Some(raw) => values.push(deserialize_value(raw)),
                None => stale.push(member),
            }
        }

        // Lazy cleanup of members whose primary keys already expired.
        if !stale.is_empty() {
            if let Ok(mut conn) = self.connection().await {
                let _: Result<(), RedisError> = conn.srem(&index_key, &stale).await;
            }
        }

        values
    }

    async fn get_keys_by_index(&self, index_name: &str, index_value: &str) -> HashSet<String> {
        let index_key = self.index(index_name, index_value);
        match self.try_members(&index_key).await {
            Ok(members) => members.into_iter().collect(),
            Err(err) => {
                self.warn("get_keys_by_index", &index_key, &err);
                HashSet::new()
            },
        }
    }

    async fn clear_namespace(&self) -> usize {
        let keys = match self.try_scan_namespace().await {
            Ok(keys) => keys,
            Err(err) => {
                self.warn("clear_namespace", &self.namespace, &err);
                return 0;
            },
        };
        if keys.is_empty() {
            return 0;
        }
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(err) => {
                self.warn("clear_namespace", &self.namespace, &err);
                return 0;
            },
        };
        let deleted: i64 = match conn.del(keys).await {
            Ok(deleted) => deleted,
            Err(err) => {
                self.warn("clear_namespace", &self.namespace, &err);
                return 0;
            },
        };
        tracing::warn!(
            namespace = %self.namespace,
            deleted,
            "cleared cache namespace"
        );
        deleted as usize
    }
}
