//! Memcached error mapping to CacheError.

use cachehelper_core::cache::CacheError;
use memcache::MemcacheError;

/// Maps Memcached errors to CacheError.
pub fn map_memcache_error(err: MemcacheError) -> CacheError {
    match err {
        MemcacheError::IOError(_) | MemcacheError::PoolError(_) => {
            CacheError::ConnectionFailed(err.to_string())
        }
        MemcacheError::BadURL(_) => CacheError::Configuration(err.to_string()),
        _ => CacheError::OperationFailed(err.to_string()),
    }
}
