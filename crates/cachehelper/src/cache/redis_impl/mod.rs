//! Redis cache backend.
//!
//! Every key is prefixed with the configured system key before it reaches
//! the store. Connections are multiplexed and shared per connection URL
//! through [`RedisConnections`].

mod cache;
mod connection;
mod error;

pub use cache::RedisCache;
pub use connection::{normalize_connection_string, RedisConnections};
