//! One caching API over three stores: an in-process LRU store, Memcached and
//! Redis.
//!
//! Pick the default backend through [`CacheConfig`], override it per call
//! with [`CacheHelper::using`], and read values back as any serde type.
//! [`helper::blocking`] offers the same operations without async.

pub mod cache;
pub mod helper;

pub use cachehelper_core::cache::{
    decode_value, encode_value, prefix_key, CacheBackend, CacheError, CacheKind, Result,
};
pub use cachehelper_core::config::{
    CacheConfig, InProcessConfig, MemcachedConfig, MemcachedCredentials, MemcachedProtocol,
    RedisConfig,
};
pub use helper::{CacheHandle, CacheHelper, CacheHelperBuilder};
