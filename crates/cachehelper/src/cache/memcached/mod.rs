//! Memcached cache backend.
//!
//! The `memcache` client is blocking, so every call runs on Tokio's blocking
//! pool. The client sits behind the [`MemcachedClient`] trait.

mod cache;
mod client;
mod error;

pub use cache::MemcachedCache;
pub use client::{client_url, MemcachedClient};
