//! Cache backend implementations.
//!
//! Concrete implementations of [`cachehelper_core::cache::CacheBackend`].
//! The in-process store is always built; the remote backends are selected
//! at compile time via feature flags.
//!
//! # Feature Flags
//!
//! - `redis` (default): Redis cache using the redis crate
//! - `memcached` (default): Memcached cache using the memcache crate

pub mod memory;

#[cfg(feature = "memcached")]
pub mod memcached;

#[cfg(feature = "redis")]
pub mod redis_impl;

pub use memory::MemoryCache;

#[cfg(feature = "memcached")]
pub use memcached::MemcachedCache;

#[cfg(feature = "redis")]
pub use redis_impl::{RedisCache, RedisConnections};
