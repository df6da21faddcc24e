//! Memcached cache implementation.
//!
//! A failed delete is double-checked with a read: when the key turns out to
//! be absent the delete counts as a success.

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cachehelper_core::cache::{CacheBackend, CacheError, CacheKind, Result};
use cachehelper_core::config::MemcachedConfig;

use super::client::{client_url, MemcachedClient};
use super::error::map_memcache_error;

/// Longest expiration Memcached treats as relative (30 days).
const MAX_RELATIVE_EXPIRATION: u64 = 60 * 60 * 24 * 30;

/// Attempts for a counter update racing with other clients.
const COUNTER_ATTEMPTS: usize = 2;

/// Memcached cache backend.
#[derive(Clone)]
pub struct MemcachedCache {
    client: Arc<dyn MemcachedClient>,
}

impl MemcachedCache {
    /// Connects to the configured server.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` when the configuration is invalid
    /// or the host does not resolve, and `CacheError::ConnectionFailed` when
    /// the server cannot be reached.
    pub async fn connect(config: &MemcachedConfig) -> Result<Self> {
        config.validate()?;
        let url = client_url(config)?;
        let host = config.ip.trim().to_string();
        let port = config.port_number()?;

        let client = tokio::task::spawn_blocking(move || {
            let resolved = (host.as_str(), port)
                .to_socket_addrs()
                .map(|mut addrs| addrs.next().is_some())
                .unwrap_or(false);
            if !resolved {
                return Err(CacheError::Configuration(format!(
                    "unable to resolve memcached host '{host}:{port}'"
                )));
            }
            memcache::Client::connect(url.as_str()).map_err(map_memcache_error)
        })
        .await
        .map_err(join_error)??;

        tracing::info!(
            ip = %config.ip,
            port = %config.port,
            protocol = ?config.protocol,
            auth = config.open_auth,
            "Memcached cache ready"
        );
        Ok(Self::from_client(Arc::new(client)))
    }

    /// Wraps an existing client.
    pub fn from_client(client: Arc<dyn MemcachedClient>) -> Self {
        Self { client }
    }

    /// Runs a blocking client call on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MemcachedClient) -> Result<T> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || op(client.as_ref()))
            .await
            .map_err(join_error)?
    }

    /// Applies a signed delta to a counter, creating it when missing.
    async fn adjust(&self, key: &str, delta: i64) -> Result<i64> {
        let key = key.to_string();
        let amount = delta.unsigned_abs();
        let value = self
            .run(move |client| {
                // A missing counter starts from the delta, floored at zero.
                let initial = if delta >= 0 { amount } else { 0 };
                for _ in 0..COUNTER_ATTEMPTS {
                    if client.add(&key, &initial.to_string(), 0)? {
                        return Ok(initial);
                    }
                    let updated = if delta >= 0 {
                        client.increment(&key, amount)?
                    } else {
                        client.decrement(&key, amount)?
                    };
                    if let Some(value) = updated {
                        return Ok(value);
                    }
                }
                Err(CacheError::OperationFailed(format!(
                    "counter '{key}' kept disappearing during update"
                )))
            })
            .await?;

        i64::try_from(value).map_err(|_| {
            CacheError::OperationFailed(format!("counter value {value} does not fit in i64"))
        })
    }
}

fn join_error(err: tokio::task::JoinError) -> CacheError {
    CacheError::OperationFailed(format!("memcached task failed: {err}"))
}

/// Converts an optional duration to a Memcached expiration.
///
/// `None` means never expire. Durations are rounded up to whole seconds, at
/// least one. Anything past 30 days is sent as an absolute Unix timestamp.
pub(crate) fn expiration(expiry: Option<Duration>, now: DateTime<Utc>) -> u32 {
    let Some(expiry) = expiry else {
        return 0;
    };

    let mut seconds = expiry.as_secs();
    if expiry.subsec_nanos() > 0 {
        seconds = seconds.saturating_add(1);
    }
    let seconds = seconds.max(1);

    if seconds <= MAX_RELATIVE_EXPIRATION {
        return seconds as u32;
    }

    let now = u64::try_from(now.timestamp()).unwrap_or(0);
    u32::try_from(now.saturating_add(seconds)).unwrap_or(u32::MAX)
}

#[async_trait]
impl CacheBackend for MemcachedCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Memcached
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.run(move |client| client.get(&key)).await
    }

    async fn set(&self, key: &str, value: &str, expiry: Option<Duration>) -> Result<bool> {
        let key = key.to_string();
        let value = value.to_string();
        let expiration = expiration(expiry, Utc::now());
        self.run(move |client| client.set(&key, &value, expiration))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |client| {
            if client.delete(&key)? {
                return Ok(true);
            }
            let absent = client.get(&key)?.is_none();
            if absent {
                tracing::debug!(key = %key, "Memcached delete reported failure but key is absent");
            }
            Ok(absent)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |client| Ok(client.get(&key)?.is_some()))
            .await
    }

    async fn update_expiry(&self, key: &str, expiry: Duration) -> Result<bool> {
        let key = key.to_string();
        let expiration = expiration(Some(expiry), Utc::now());
        self.run(move |client| client.touch(&key, expiration))
            .await
    }

    async fn increase(&self, key: &str, by: i64) -> Result<i64> {
        self.adjust(key, by).await
    }

    async fn decrease(&self, key: &str, by: i64) -> Result<i64> {
        self.adjust(key, by.checked_neg().unwrap_or(i64::MAX)).await
    }
}
