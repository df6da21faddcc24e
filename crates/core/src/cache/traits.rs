use std::time::Duration;

use async_trait::async_trait;

use super::{CacheError, CacheKind, Result};

/// The uniform contract every cache backend implements.
///
/// Backends deal in stored text only. Turning typed values into text and
/// back is the caller's job (see [`super::encode_value`] and
/// [`super::decode_value`]), which keeps this trait object-safe.
///
/// Operations a backend cannot perform default to
/// [`CacheError::Unsupported`]. Batch operations default to a sequential
/// loop over the singular operation, in input order, with no atomicity
/// across keys.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Which backend kind this is.
    fn kind(&self) -> CacheKind;

    /// Reads the stored text for a key. `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores text under a key, optionally expiring after `expiry`.
    async fn set(&self, key: &str, value: &str, expiry: Option<Duration>) -> Result<bool>;

    /// Removes a key. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Returns whether the key currently has a value.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Re-arms the expiry of a live key to `now + expiry`.
    ///
    /// A missing key is left alone and reported as `false`.
    async fn update_expiry(&self, key: &str, expiry: Duration) -> Result<bool>;

    /// Atomically adds `by` to a numeric value, returning the new value.
    async fn increase(&self, _key: &str, _by: i64) -> Result<i64> {
        Err(CacheError::unsupported(self.kind(), "increase"))
    }

    /// Atomically subtracts `by` from a numeric value, returning the new value.
    async fn decrease(&self, _key: &str, _by: i64) -> Result<i64> {
        Err(CacheError::unsupported(self.kind(), "decrease"))
    }

    /// Appends to a list, returning its new length.
    async fn list_right_push(&self, _key: &str, _value: &str) -> Result<i64> {
        Err(CacheError::unsupported(self.kind(), "list_right_push"))
    }

    /// Removes and returns the last element of a list.
    async fn list_right_pop(&self, _key: &str) -> Result<Option<String>> {
        Err(CacheError::unsupported(self.kind(), "list_right_pop"))
    }

    /// Returns the whole list.
    async fn list_range(&self, _key: &str) -> Result<Vec<String>> {
        Err(CacheError::unsupported(self.kind(), "list_range"))
    }

    /// Removes every occurrence of `value`, returning how many were removed.
    async fn list_remove(&self, _key: &str, _value: &str) -> Result<i64> {
        Err(CacheError::unsupported(self.kind(), "list_remove"))
    }

    /// Adds a member with a score. Returns `true` if the member is new.
    async fn sorted_set_add(&self, _key: &str, _member: &str, _score: f64) -> Result<bool> {
        Err(CacheError::unsupported(self.kind(), "sorted_set_add"))
    }

    /// Returns members between two ranks (inclusive, negative counts from
    /// the end) together with their scores, lowest score first.
    async fn sorted_set_range_with_scores(
        &self,
        _key: &str,
        _start: isize,
        _stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        Err(CacheError::unsupported(
            self.kind(),
            "sorted_set_range_with_scores",
        ))
    }

    /// Removes a member. Returns `true` if it was present.
    async fn sorted_set_remove(&self, _key: &str, _member: &str) -> Result<bool> {
        Err(CacheError::unsupported(self.kind(), "sorted_set_remove"))
    }

    /// Stores every entry, returning the keys that failed to store.
    async fn set_many(
        &self,
        entries: &[(String, String)],
        expiry: Option<Duration>,
    ) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for (key, value) in entries {
            if !self.set(key, value, expiry).await? {
                failed.push(key.clone());
            }
        }
        report_failed(self.kind(), "set_many", &failed);
        Ok(failed)
    }

    /// Reads every key. The result has one entry per requested key.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push((key.clone(), self.get(key).await?));
        }
        Ok(values)
    }

    /// Removes every key, returning the keys that failed to delete.
    async fn delete_many(&self, keys: &[String]) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if !self.delete(key).await? {
                failed.push(key.clone());
            }
        }
        report_failed(self.kind(), "delete_many", &failed);
        Ok(failed)
    }

    /// Re-arms the expiry of every key, returning the keys that failed.
    async fn update_expiry_many(&self, keys: &[String], expiry: Duration) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if !self.update_expiry(key, expiry).await? {
                failed.push(key.clone());
            }
        }
        report_failed(self.kind(), "update_expiry_many", &failed);
        Ok(failed)
    }
}

fn report_failed(backend: CacheKind, operation: &'static str, failed: &[String]) {
    if !failed.is_empty() {
        tracing::warn!(
            %backend,
            operation,
            failed = failed.len(),
            keys = ?failed,
            "Batch cache operation left keys unchanged"
        );
    }
}
