use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};

use tally_state::error::StateError;
use tally_state::key::{KeyKind, StateKey};
use tally_state::store::{CasResult, StateStore, Versioned};

use crate::config::RedisConfig;
use crate::key_render::{render_key, scan_pattern, strip_prefix};
use crate::scripts;

fn ttl_millis(ttl: Option<Duration>) -> i64 {
    ttl.map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn backend(e: &redis::RedisError) -> StateError {
    if e.is_timeout() {
        StateError::Backend(format!("timeout: {e}"))
    } else if e.is_connection_dropped() || e.is_io_error() {
        StateError::Connection(e.to_string())
    } else {
        StateError::Backend(e.to_string())
    }
}

/// Redis-backed implementation of [`StateStore`].
///
/// Uses a `deadpool-redis` connection pool and Lua scripts for atomicity.
pub struct RedisStateStore {
    pool: Pool,
    prefix: String,
}

impl RedisStateStore {
    /// Create a new `RedisStateStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StateError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StateError::Connection(e.to_string()))?
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    fn redis_key(&self, key: &StateKey) -> String {
        render_key(&self.prefix, key)
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool
            .get()
            .await
            .map_err(|e| StateError::Connection(e.to_string()))
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let created: i64 = Script::new(scripts::CHECK_AND_SET)
            .key(self.redis_key(key))
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        Ok(created == 1)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let mut conn = self.conn().await?;
        conn.hget(self.redis_key(key), "v")
            .await
            .map_err(|e| backend(&e))
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        let mut conn = self.conn().await?;
        let (value, version): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(self.redis_key(key))
            .arg("v")
            .arg("ver")
            .query_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        Ok(value.map(|value| Versioned {
            value,
            version: version.unwrap_or(1),
        }))
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let mut conn = self.conn().await?;
        let _version: i64 = Script::new(scripts::SET_VERSIONED)
            .key(self.redis_key(key))
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = conn
            .del(self.redis_key(key))
            .await
            .map_err(|e| backend(&e))?;
        Ok(deleted > 0)
    }

    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError> {
        let mut conn = self.conn().await?;
        Script::new(scripts::INCREMENT)
            .key(self.redis_key(key))
            .arg(delta)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        let mut conn = self.conn().await?;
        let result: Vec<redis::Value> = Script::new(scripts::COMPARE_AND_SWAP)
            .key(self.redis_key(key))
            .arg(expected_version)
            .arg(new_value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| backend(&e))?;

        // Success: [1, new_version]
        // Conflict: [0, current_version, current_value | nil]
        let status = match result.first() {
            Some(redis::Value::Int(n)) => *n,
            _ => return Err(StateError::Backend("unexpected CAS script response".into())),
        };
        if status == 1 {
            return Ok(CasResult::Ok);
        }

        let current_version = match result.get(1) {
            Some(redis::Value::Int(n)) => u64::try_from(*n).unwrap_or(0),
            _ => 0,
        };
        let current_value = match result.get(2) {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        };
        Ok(CasResult::Conflict {
            current_value,
            current_version,
        })
    }

    async fn scan_keys(
        &self,
        namespace: &str,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        let pattern = scan_pattern(&self.prefix, namespace, tenant, &kind, prefix);
        let mut conn = self.conn().await?;
        let mut results = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| backend(&e))?;

            for key in keys {
                // The record may expire between SCAN and HGET.
                let value: Option<String> =
                    conn.hget(&key, "v").await.map_err(|e| backend(&e))?;
                if let Some(value) = value {
                    results.push((strip_prefix(&self.prefix, &key).to_owned(), value));
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(results)
    }
}
