//! Blocking version of the facade.
//!
//! Every call drives the async operation to completion on a private
//! current-thread runtime, so results match the async facade exactly.
//! Called from a worker of a multi-threaded runtime, the call moves into
//! `block_in_place`. A current-thread runtime cannot be blocked, so calls
//! made from one fail with `CacheError::Configuration`.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use cachehelper_core::cache::{CacheError, CacheKind, Result};
use cachehelper_core::config::CacheConfig;

use super::{CacheHandle as AsyncHandle, CacheHelper as AsyncHelper, CacheHelperBuilder};

/// Blocking counterpart of [`super::CacheHelper`].
pub struct CacheHelper {
    runtime: Option<Runtime>,
    helper: AsyncHelper,
}

impl CacheHelper {
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::from_builder(AsyncHelper::builder(config))
    }

    /// Builds the helper from a configured builder.
    ///
    /// Adapters are created on this helper's runtime, so the builder should
    /// not carry a Redis registry used by another runtime.
    pub fn from_builder(builder: CacheHelperBuilder) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CacheError::Configuration(format!("failed to start cache runtime: {e}")))?;
        Ok(Self {
            runtime: Some(runtime),
            helper: builder.build()?,
        })
    }

    pub fn default_backend(&self) -> CacheKind {
        self.helper.default_backend()
    }

    pub fn set_default_backend(&self, kind: CacheKind) {
        self.helper.set_default_backend(kind);
    }

    pub fn resolve(&self, requested: Option<CacheKind>) -> CacheKind {
        self.helper.resolve(requested)
    }

    pub fn initialize(&self, kind: CacheKind) -> Result<()> {
        self.block_on(self.helper.initialize(kind))
    }

    pub fn cache(&self) -> CacheHandle<'_> {
        self.on(None)
    }

    pub fn using(&self, kind: CacheKind) -> CacheHandle<'_> {
        self.on(Some(kind))
    }

    pub fn on(&self, requested: Option<CacheKind>) -> CacheHandle<'_> {
        CacheHandle {
            owner: self,
            handle: self.helper.on(requested),
        }
    }

    fn block_on<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(runtime) = &self.runtime else {
            return Err(CacheError::Configuration("cache runtime has shut down".into()));
        };
        match Handle::try_current() {
            Err(_) => runtime.block_on(future),
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| runtime.block_on(future))
            }
            Ok(_) => Err(CacheError::Configuration(
                "blocking cache calls are not allowed on a current-thread async runtime".into(),
            )),
        }
    }
}

impl Drop for CacheHelper {
    fn drop(&mut self) {
        // Allowed inside an async context, unlike dropping the runtime.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Blocking counterpart of [`super::CacheHandle`].
pub struct CacheHandle<'a> {
    owner: &'a CacheHelper,
    handle: AsyncHandle,
}

impl CacheHandle<'_> {
    pub fn kind(&self) -> CacheKind {
        self.handle.kind()
    }

    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expiry: Option<Duration>,
    ) -> Result<bool> {
        self.owner.block_on(self.handle.set(key, value, expiry))
    }

    pub fn set_many<I, K, T>(&self, entries: I, expiry: Option<Duration>) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        self.owner.block_on(self.handle.set_many(entries, expiry))
    }

    pub fn get<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        self.owner.block_on(self.handle.get(key))
    }

    pub fn get_many<T, I, K>(&self, keys: I) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned + Default,
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.owner.block_on(self.handle.get_many(keys))
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.owner.block_on(self.handle.get_string(key))
    }

    pub fn get_string_many<I, K>(&self, keys: I) -> Result<HashMap<String, Option<String>>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.owner.block_on(self.handle.get_string_many(keys))
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.owner.block_on(self.handle.delete(key))
    }

    pub fn delete_many<I, K>(&self, keys: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.owner.block_on(self.handle.delete_many(keys))
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        self.owner.block_on(self.handle.exists(key))
    }

    pub fn update_expiry(&self, key: &str, expiry: Duration) -> Result<bool> {
        self.owner.block_on(self.handle.update_expiry(key, expiry))
    }

    pub fn update_expiry_many<I, K>(&self, keys: I, expiry: Duration) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.owner.block_on(self.handle.update_expiry_many(keys, expiry))
    }

    pub fn increase(&self, key: &str, by: i64) -> Result<i64> {
        self.owner.block_on(self.handle.increase(key, by))
    }

    pub fn decrease(&self, key: &str, by: i64) -> Result<i64> {
        self.owner.block_on(self.handle.decrease(key, by))
    }

    pub fn list_right_push<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<i64> {
        self.owner.block_on(self.handle.list_right_push(key, value))
    }

    pub fn list_right_pop<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        self.owner.block_on(self.handle.list_right_pop(key))
    }

    pub fn list_right_pop_string(&self, key: &str) -> Result<Option<String>> {
        self.owner.block_on(self.handle.list_right_pop_string(key))
    }

    pub fn list_range<T: DeserializeOwned + Default>(&self, key: &str) -> Result<Vec<T>> {
        self.owner.block_on(self.handle.list_range(key))
    }

    pub fn list_range_string(&self, key: &str) -> Result<Vec<String>> {
        self.owner.block_on(self.handle.list_range_string(key))
    }

    pub fn list_remove<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<i64> {
        self.owner.block_on(self.handle.list_remove(key, value))
    }

    pub fn sorted_set_add<T: Serialize + ?Sized>(
        &self,
        key: &str,
        member: &T,
        score: f64,
    ) -> Result<bool> {
        self.owner.block_on(self.handle.sorted_set_add(key, member, score))
    }

    pub fn sorted_set_range_with_scores<T: DeserializeOwned + Default>(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(T, f64)>> {
        self.owner.block_on(self.handle.sorted_set_range_with_scores(key, start, stop))
    }

    pub fn sorted_set_remove<T: Serialize + ?Sized>(&self, key: &str, member: &T) -> Result<bool> {
        self.owner.block_on(self.handle.sorted_set_remove(key, member))
    }
}
