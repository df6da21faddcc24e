//! Redis cache implementation.
//!
//! Expirations are sent with millisecond precision (`SET ... PX`,
//! `PEXPIRE`). Counters, lists and sorted sets map onto the native Redis
//! commands.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use cachehelper_core::cache::{prefix_key, CacheBackend, CacheKind, Result};
use cachehelper_core::config::RedisConfig;

use super::connection::{normalize_connection_string, RedisConnections};
use super::error::map_redis_error;

/// Redis cache backend using a shared connection manager.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    system_key: String,
}

impl RedisCache {
    /// Creates a Redis cache from configuration.
    ///
    /// The connection comes from `connections`, so caches built from the same
    /// connection string and database share one multiplexed connection.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` for an invalid configuration and
    /// `CacheError::ConnectionFailed` if the connection cannot be established.
    pub async fn connect(config: &RedisConfig, connections: &RedisConnections) -> Result<Self> {
        config.validate()?;
        let url = normalize_connection_string(&config.connection_string, config.db_number)?;
        let conn = connections.get_or_connect(&url).await?;
        tracing::info!(
            db = config.db_number,
            system_key = %config.system_key,
            "Redis cache ready"
        );
        Ok(Self::from_connection(conn, config.system_key.clone()))
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: ConnectionManager, system_key: impl Into<String>) -> Self {
        Self {
            conn,
            system_key: system_key.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        prefix_key(&self.system_key, key)
    }
}

/// Converts a duration to whole milliseconds, never less than one.
fn expiry_millis(expiry: Duration) -> u64 {
    u64::try_from(expiry.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Redis
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let result: Option<String> = conn.get(self.key(key)).await.map_err(map_redis_error)?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<Duration>) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = self.key(key);

        match expiry {
            Some(duration) => {
                let () = redis::cmd("SET")
                    .arg(&key)
                    .arg(value)
                    .arg("PX")
                    .arg(expiry_millis(duration))
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_error)?;
            }
            None => {
                conn.set::<_, _, ()>(&key, value)
                    .await
                    .map_err(map_redis_error)?;
            }
        }

        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(self.key(key)).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.key(key)).await.map_err(map_redis_error)?;
        Ok(exists)
    }

    async fn update_expiry(&self, key: &str, expiry: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(self.key(key))
            .arg(expiry_millis(expiry))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(updated == 1)
    }

    async fn increase(&self, key: &str, by: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.incr(self.key(key), by).await.map_err(map_redis_error)
    }

    async fn decrease(&self, key: &str, by: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.decr(self.key(key), by).await.map_err(map_redis_error)
    }

    async fn list_right_push(&self, key: &str, value: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.rpush(self.key(key), value)
            .await
            .map_err(map_redis_error)
    }

    async fn list_right_pop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.rpop(self.key(key), None).await.map_err(map_redis_error)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(self.key(key), 0, -1)
            .await
            .map_err(map_redis_error)
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.lrem(self.key(key), 0, value)
            .await
            .map_err(map_redis_error)
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = conn
            .zadd(self.key(key), member, score)
            .await
            .map_err(map_redis_error)?;
        Ok(added > 0)
    }

    async fn sorted_set_range_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        conn.zrange_withscores(self.key(key), start, stop)
            .await
            .map_err(map_redis_error)
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .zrem(self.key(key), member)
            .await
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }
}
