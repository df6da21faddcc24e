//! Redis error mapping to CacheError.

use cachehelper_core::cache::CacheError;
use redis::ErrorKind;

/// Maps Redis errors to CacheError.
///
/// Transport failures become `ConnectionFailed`, a rejected client setup
/// becomes `Configuration`, and everything the server answered with is an
/// `OperationFailed`.
pub fn map_redis_error(err: redis::RedisError) -> CacheError {
    if err.is_connection_refusal()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_io_error()
    {
        CacheError::ConnectionFailed(err.to_string())
    } else if err.kind() == ErrorKind::InvalidClientConfig {
        CacheError::Configuration(err.to_string())
    } else {
        CacheError::OperationFailed(err.to_string())
    }
}
