//! In-memory cache implementation with LRU eviction.
//!
//! Values are kept in their encoded text form, the same form the remote
//! backends store, so reads through `get_string` are normalized JSON on
//! every backend.
//!
//! Expired entries are removed lazily, when an operation touches them.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;
use tokio::time::Instant;

use cachehelper_core::cache::{CacheBackend, CacheError, CacheKind, Result};
use cachehelper_core::config::InProcessConfig;

/// A single cache entry with optional expiration.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    /// Creates a new cache entry with optional TTL.
    fn new(value: String, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.and_then(deadline);
        Self { value, expires_at }
    }

    /// Returns true if this entry has expired.
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// Absolute deadline for a TTL. A TTL past the clock's range never expires.
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

/// In-memory cache implementation with LRU eviction.
///
/// Thread-safe cache using `Arc<RwLock<LruCache>>` for concurrent access.
/// Uses LRU eviction to limit memory usage when `max_entries` is reached.
///
/// Counters and list operations are not available on this backend.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    store: Arc<RwLock<LruCache<String, CacheEntry>>>,
}

impl MemoryCache {
    /// Creates a new in-memory cache with LRU eviction.
    ///
    /// # Arguments
    ///
    /// * `max_entries` - Maximum number of entries before LRU eviction kicks in.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` if `max_entries` is 0.
    pub fn new(max_entries: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_entries).ok_or_else(|| {
            CacheError::Configuration("in-process max_entries must be greater than zero".into())
        })?;
        Ok(Self {
            store: Arc::new(RwLock::new(LruCache::new(capacity))),
        })
    }

    pub fn from_config(config: &InProcessConfig) -> Result<Self> {
        config.validate()?;
        let cache = Self::new(config.max_entries)?;
        tracing::info!(max_entries = config.max_entries, "In-process cache ready");
        Ok(cache)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn kind(&self) -> CacheKind {
        CacheKind::InProcess
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut store = self.store.write().await;

        match store.get(key) {
            Some(entry) if entry.is_expired() => {
                store.pop(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let mut store = self.store.write().await;
        store.put(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut store = self.store.write().await;
        Ok(store.pop(key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let store = self.store.read().await;
        Ok(store.peek(key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn update_expiry(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut store = self.store.write().await;

        match store.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = deadline(ttl);
                Ok(true)
            }
            Some(_) => {
                store.pop(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
