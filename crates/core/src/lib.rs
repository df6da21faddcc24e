//! Core types for cachehelper.
//!
//! Everything in this crate is free of I/O: backend kinds, configuration,
//! the error taxonomy, value serialization and the [`cache::CacheBackend`]
//! trait that every concrete store implements.

pub mod cache;
pub mod config;
