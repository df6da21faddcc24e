//! In-process cache backend.
//!
//! Keeps entries in this process, bounded by an LRU capacity, with
//! per-entry absolute expiry.

mod cache;

pub use cache::MemoryCache;
