//! The dispatch facade.
//!
//! [`CacheHelper`] resolves which backend a call goes to (an explicit kind
//! wins over the process default) and hands out the adapter for it. Adapters
//! are built lazily, once per kind, and live as long as the helper.
//!
//! ```no_run
//! use std::time::Duration;
//! use cachehelper::{CacheConfig, CacheHelper, CacheKind};
//!
//! # async fn demo() -> cachehelper::Result<()> {
//! let helper = CacheHelper::new(CacheConfig::from_env()?)?;
//!
//! helper.cache().set("greeting", "hello", Some(Duration::from_secs(60))).await?;
//! let greeting: String = helper.cache().get("greeting").await?;
//!
//! // One call against Redis, whatever the default is.
//! let hits = helper.using(CacheKind::Redis).increase("hits", 1).await?;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
mod handle;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::OnceCell;

use cachehelper_core::cache::{resolve, CacheBackend, CacheError, CacheKind, Result};
use cachehelper_core::config::CacheConfig;

use crate::cache::MemoryCache;
#[cfg(feature = "memcached")]
use crate::cache::MemcachedCache;
#[cfg(feature = "redis")]
use crate::cache::{RedisCache, RedisConnections};

pub use handle::CacheHandle;

type Adapter = Arc<dyn CacheBackend>;

/// Resolves backends and owns one adapter per backend kind.
///
/// Cloning is cheap and clones share adapters and the default backend.
#[derive(Clone)]
pub struct CacheHelper {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    default_backend: RwLock<CacheKind>,
    #[cfg(feature = "redis")]
    connections: RedisConnections,
    in_process: OnceCell<Adapter>,
    memcached: OnceCell<Adapter>,
    redis: OnceCell<Adapter>,
}

impl CacheHelper {
    /// Creates a helper from configuration. No connection is opened yet.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` when the configuration is invalid
    /// or the default backend has no configuration.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: CacheConfig) -> CacheHelperBuilder {
        CacheHelperBuilder::new(config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// The backend used by calls that do not name one.
    pub fn default_backend(&self) -> CacheKind {
        *self
            .inner
            .default_backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the process default for all subsequent calls.
    pub fn set_default_backend(&self, kind: CacheKind) {
        *self
            .inner
            .default_backend
            .write()
            .unwrap_or_else(PoisonError::into_inner) = kind;
        tracing::info!(backend = %kind, "Default cache backend changed");
    }

    /// The backend a call would use.
    pub fn resolve(&self, requested: Option<CacheKind>) -> CacheKind {
        resolve(requested, self.default_backend())
    }

    /// Builds the adapter for `kind` now instead of on first use.
    pub async fn initialize(&self, kind: CacheKind) -> Result<()> {
        self.backend(Some(kind)).await.map(|_| ())
    }

    /// Returns the adapter for a call, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotConfigured` when the resolved backend has no
    /// configuration, or the construction error of the adapter.
    pub async fn backend(&self, requested: Option<CacheKind>) -> Result<Adapter> {
        let kind = self.resolve(requested);
        let adapter = self
            .inner
            .cell(kind)
            .get_or_try_init(|| self.construct(kind))
            .await?;
        Ok(Arc::clone(adapter))
    }

    /// Operations against the default backend.
    pub fn cache(&self) -> CacheHandle {
        self.on(None)
    }

    /// Operations against a specific backend.
    pub fn using(&self, kind: CacheKind) -> CacheHandle {
        self.on(Some(kind))
    }

    /// Operations against `requested`, or the default when `None`.
    pub fn on(&self, requested: Option<CacheKind>) -> CacheHandle {
        CacheHandle::new(self.clone(), requested)
    }

    async fn construct(&self, kind: CacheKind) -> Result<Adapter> {
        let config = &self.inner.config;
        match kind {
            CacheKind::InProcess => Ok(Arc::new(MemoryCache::from_config(&config.in_process)?)),
            CacheKind::Memcached => {
                let memcached = config
                    .memcached
                    .as_ref()
                    .ok_or(CacheError::NotConfigured(kind))?;
                #[cfg(feature = "memcached")]
                {
                    Ok(Arc::new(MemcachedCache::connect(memcached).await?))
                }
                #[cfg(not(feature = "memcached"))]
                {
                    let _ = memcached;
                    Err(not_compiled(kind))
                }
            }
            CacheKind::Redis => {
                let redis = config
                    .redis
                    .as_ref()
                    .ok_or(CacheError::NotConfigured(kind))?;
                #[cfg(feature = "redis")]
                {
                    Ok(Arc::new(
                        RedisCache::connect(redis, &self.inner.connections).await?,
                    ))
                }
                #[cfg(not(feature = "redis"))]
                {
                    let _ = redis;
                    Err(not_compiled(kind))
                }
            }
        }
    }
}

#[cfg(not(all(feature = "redis", feature = "memcached")))]
fn not_compiled(kind: CacheKind) -> CacheError {
    CacheError::Configuration(format!("{kind} support is not compiled in"))
}

impl Inner {
    fn cell(&self, kind: CacheKind) -> &OnceCell<Adapter> {
        match kind {
            CacheKind::InProcess => &self.in_process,
            CacheKind::Memcached => &self.memcached,
            CacheKind::Redis => &self.redis,
        }
    }
}

/// Builder for [`CacheHelper`].
pub struct CacheHelperBuilder {
    config: CacheConfig,
    injected: HashMap<CacheKind, Adapter>,
    #[cfg(feature = "redis")]
    connections: Option<RedisConnections>,
}

impl CacheHelperBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            injected: HashMap::new(),
            #[cfg(feature = "redis")]
            connections: None,
        }
    }

    /// Uses `backend` for `kind` instead of building one from configuration.
    pub fn with_backend(mut self, kind: CacheKind, backend: Arc<dyn CacheBackend>) -> Self {
        self.injected.insert(kind, backend);
        self
    }

    /// Shares a Redis connection registry with other helpers.
    #[cfg(feature = "redis")]
    pub fn with_redis_connections(mut self, connections: RedisConnections) -> Self {
        self.connections = Some(connections);
        self
    }

    pub fn build(self) -> Result<CacheHelper> {
        let config = self.config;
        config.validate_sections()?;

        let default_backend = config.default_backend;
        if !config.is_configured(default_backend) && !self.injected.contains_key(&default_backend)
        {
            return Err(CacheError::Configuration(format!(
                "default backend '{default_backend}' has no configuration"
            )));
        }

        let inner = Inner {
            default_backend: RwLock::new(default_backend),
            #[cfg(feature = "redis")]
            connections: self.connections.unwrap_or_default(),
            in_process: OnceCell::new(),
            memcached: OnceCell::new(),
            redis: OnceCell::new(),
            config,
        };
        for (kind, backend) in self.injected {
            // Cells are fresh, so this cannot fail.
            let _ = inner.cell(kind).set(backend);
        }

        Ok(CacheHelper {
            inner: Arc::new(inner),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBackend;
    use super::*;

    fn helper_with_fake(fake: FakeBackend) -> (CacheHelper, Arc<FakeBackend>) {
        let fake = Arc::new(fake);
        let helper = CacheHelper::builder(CacheConfig::default())
            .with_backend(CacheKind::Redis, fake.clone())
            .build()
            .unwrap();
        (helper, fake)
    }

    #[test]
    fn test_default_backend_is_in_process() {
        let helper = CacheHelper::new(CacheConfig::default()).unwrap();
        assert_eq!(helper.default_backend(), CacheKind::InProcess);
        assert_eq!(helper.resolve(None), CacheKind::InProcess);
        assert_eq!(helper.resolve(Some(CacheKind::Redis)), CacheKind::Redis);
    }

    #[test]
    fn test_set_default_backend_changes_resolution() {
        let (helper, _fake) = helper_with_fake(FakeBackend::default());

        helper.set_default_backend(CacheKind::Redis);
        assert_eq!(helper.resolve(None), CacheKind::Redis);
        assert_eq!(
            helper.resolve(Some(CacheKind::InProcess)),
            CacheKind::InProcess
        );

        // Clones share the default
        let clone = helper.clone();
        clone.set_default_backend(CacheKind::Memcached);
        assert_eq!(helper.default_backend(), CacheKind::Memcached);
    }

    #[test]
    fn test_build_rejects_unconfigured_default() {
        let config = CacheConfig {
            default_backend: CacheKind::Redis,
            ..CacheConfig::default()
        };
        assert!(matches!(
            CacheHelper::new(config.clone()),
            Err(CacheError::Configuration(_))
        ));

        // An injected adapter counts as configured
        let helper = CacheHelper::builder(config)
            .with_backend(CacheKind::Redis, Arc::new(FakeBackend::default()))
            .build()
            .unwrap();
        assert_eq!(helper.default_backend(), CacheKind::Redis);
    }

    #[tokio::test]
    async fn test_unconfigured_backend_is_named_error() {
        let helper = CacheHelper::new(CacheConfig::default()).unwrap();

        let err = helper
            .using(CacheKind::Memcached)
            .get::<String>("k")
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::NotConfigured(CacheKind::Memcached));

        assert_eq!(
            helper.initialize(CacheKind::Redis).await.unwrap_err(),
            CacheError::NotConfigured(CacheKind::Redis)
        );
        assert!(helper.initialize(CacheKind::InProcess).await.is_ok());
    }

    #[tokio::test]
    async fn test_adapter_is_built_once() {
        let helper = CacheHelper::new(CacheConfig::default()).unwrap();

        let first = helper.backend(None).await.unwrap();
        let second = helper.clone().backend(Some(CacheKind::InProcess)).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_builds_one_adapter() {
        let helper = CacheHelper::new(CacheConfig::default()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let helper = helper.clone();
                tokio::spawn(async move { helper.backend(None).await.unwrap() })
            })
            .collect();

        let mut adapters = Vec::new();
        for handle in handles {
            adapters.push(handle.await.unwrap());
        }
        assert!(adapters.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_explicit_backend_overrides_default() {
        let (helper, fake) = helper_with_fake(FakeBackend::default());

        assert!(helper
            .using(CacheKind::Redis)
            .set("k", "remote", None)
            .await
            .unwrap());

        assert!(fake.values.lock().unwrap().contains_key("k"));
        assert!(!helper.cache().exists("k").await.unwrap());

        helper.set_default_backend(CacheKind::Redis);
        assert!(helper.cache().exists("k").await.unwrap());
        assert!(!helper
            .using(CacheKind::InProcess)
            .exists("k")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_handle_resolves_at_call_time() {
        let (helper, fake) = helper_with_fake(FakeBackend::default());
        let handle = helper.cache();

        helper.set_default_backend(CacheKind::Redis);
        handle.set("late", &1, None).await.unwrap();

        assert!(fake.values.lock().unwrap().contains_key("late"));
        assert_eq!(handle.kind(), CacheKind::Redis);
    }
}
