//! Typed cache operations bound to a backend choice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use cachehelper_core::cache::{
    decode_scored, decode_value, decode_values, encode_value, CacheBackend, CacheKind, Result,
};

use super::CacheHelper;

/// Typed operations against one backend choice.
///
/// The backend is resolved on every call, so a handle for the default
/// backend follows later [`CacheHelper::set_default_backend`] calls.
///
/// Values are stored as JSON text, except values that serialize to a JSON
/// string, which are stored verbatim. Reads of missing keys return
/// `T::default()`.
#[derive(Clone)]
pub struct CacheHandle {
    helper: CacheHelper,
    requested: Option<CacheKind>,
}

fn owned_keys<I, K>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = K>,
    K: Into<String>,
{
    keys.into_iter().map(Into::into).collect()
}

impl CacheHandle {
    pub(super) fn new(helper: CacheHelper, requested: Option<CacheKind>) -> Self {
        Self { helper, requested }
    }

    /// The backend the next call would use.
    pub fn kind(&self) -> CacheKind {
        self.helper.resolve(self.requested)
    }

    async fn backend(&self) -> Result<Arc<dyn CacheBackend>> {
        self.helper.backend(self.requested).await
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expiry: Option<Duration>,
    ) -> Result<bool> {
        let text = encode_value(value)?;
        self.backend().await?.set(key, &text, expiry).await
    }

    /// Sets every entry in order and returns the keys that failed.
    ///
    /// Nothing is written if any value fails to serialize.
    pub async fn set_many<I, K, T>(&self, entries: I, expiry: Option<Duration>) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        let encoded = entries
            .into_iter()
            .map(|(key, value)| Ok((key.into(), encode_value(&value)?)))
            .collect::<Result<Vec<_>>>()?;
        self.backend().await?.set_many(&encoded, expiry).await
    }

    pub async fn get<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let raw = self.backend().await?.get(key).await?;
        decode_value(raw.as_deref())
    }

    /// Reads every key. Misses map to `T::default()`.
    pub async fn get_many<T, I, K>(&self, keys: I) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned + Default,
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = owned_keys(keys);
        let raw = self.backend().await?.get_many(&keys).await?;
        raw.into_iter()
            .map(|(key, value)| Ok((key, decode_value(value.as_deref())?)))
            .collect()
    }

    /// The stored text, without decoding.
    pub async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.backend().await?.get(key).await
    }

    pub async fn get_string_many<I, K>(&self, keys: I) -> Result<HashMap<String, Option<String>>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = owned_keys(keys);
        let raw = self.backend().await?.get_many(&keys).await?;
        Ok(raw.into_iter().collect())
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend().await?.delete(key).await
    }

    /// Deletes every key and returns the ones that failed.
    pub async fn delete_many<I, K>(&self, keys: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = owned_keys(keys);
        self.backend().await?.delete_many(&keys).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend().await?.exists(key).await
    }

    /// Re-arms the expiry of a live key. `false` for a missing key.
    pub async fn update_expiry(&self, key: &str, expiry: Duration) -> Result<bool> {
        self.backend().await?.update_expiry(key, expiry).await
    }

    pub async fn update_expiry_many<I, K>(&self, keys: I, expiry: Duration) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = owned_keys(keys);
        self.backend().await?.update_expiry_many(&keys, expiry).await
    }

    pub async fn increase(&self, key: &str, by: i64) -> Result<i64> {
        self.backend().await?.increase(key, by).await
    }

    pub async fn decrease(&self, key: &str, by: i64) -> Result<i64> {
        self.backend().await?.decrease(key, by).await
    }

    pub async fn list_right_push<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<i64> {
        let text = encode_value(value)?;
        self.backend().await?.list_right_push(key, &text).await
    }

    /// Pops the last element. An empty list yields `T::default()`.
    pub async fn list_right_pop<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let raw = self.backend().await?.list_right_pop(key).await?;
        decode_value(raw.as_deref())
    }

    pub async fn list_right_pop_string(&self, key: &str) -> Result<Option<String>> {
        self.backend().await?.list_right_pop(key).await
    }

    pub async fn list_range<T: DeserializeOwned + Default>(&self, key: &str) -> Result<Vec<T>> {
        let raw = self.backend().await?.list_range(key).await?;
        decode_values(&raw)
    }

    pub async fn list_range_string(&self, key: &str) -> Result<Vec<String>> {
        self.backend().await?.list_range(key).await
    }

    /// Removes every occurrence of `value`, returning how many were removed.
    pub async fn list_remove<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<i64> {
        let text = encode_value(value)?;
        self.backend().await?.list_remove(key, &text).await
    }

    pub async fn sorted_set_add<T: Serialize + ?Sized>(
        &self,
        key: &str,
        member: &T,
        score: f64,
    ) -> Result<bool> {
        let text = encode_value(member)?;
        self.backend().await?.sorted_set_add(key, &text, score).await
    }

    /// Members ranked `start..=stop` by ascending score, each with its score.
    pub async fn sorted_set_range_with_scores<T: DeserializeOwned + Default>(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(T, f64)>> {
        let raw = self
            .backend()
            .await?
            .sorted_set_range_with_scores(key, start, stop)
            .await?;
        decode_scored(raw)
    }

    pub async fn sorted_set_remove<T: Serialize + ?Sized>(&self, key: &str, member: &T) -> Result<bool> {
        let text = encode_value(member)?;
        self.backend().await?.sorted_set_remove(key, &text).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::FakeBackend;
    use super::*;
    use cachehelper_core::cache::CacheError;
    use cachehelper_core::config::CacheConfig;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Person {
        id: u32,
        name: String,
    }

    fn rose() -> Person {
        Person {
            id: 1,
            name: "rose".to_string(),
        }
    }

    fn in_process() -> CacheHelper {
        CacheHelper::new(CacheConfig::default()).unwrap()
    }

    fn with_fake(fake: FakeBackend) -> (CacheHelper, Arc<FakeBackend>) {
        let fake = Arc::new(fake);
        let helper = CacheHelper::builder(CacheConfig::default())
            .with_backend(CacheKind::Redis, fake.clone())
            .build()
            .unwrap();
        (helper, fake)
    }

    #[tokio::test]
    async fn test_missing_key_reads_as_default() {
        let cache = in_process().cache();

        assert!(!cache.exists("nobody").await.unwrap());
        assert_eq!(cache.get::<Person>("nobody").await.unwrap(), Person::default());
        assert_eq!(cache.get::<i64>("nobody").await.unwrap(), 0);
        assert_eq!(cache.get::<String>("nobody").await.unwrap(), "");
        assert_eq!(cache.get_string("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_struct_roundtrip() {
        let cache = in_process().cache();

        assert!(cache
            .set("p1", &rose(), Some(Duration::from_secs(86_400)))
            .await
            .unwrap());
        assert_eq!(cache.get::<Person>("p1").await.unwrap(), rose());
        assert_eq!(
            cache.get_string("p1").await.unwrap(),
            Some(r#"{"id":1,"name":"rose"}"#.to_string())
        );

        assert!(cache.delete("p1").await.unwrap());
        assert!(!cache.exists("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_string_roundtrip_without_quotes() {
        let cache = in_process().cache();

        cache.set("greeting", "say \"hi\"", None).await.unwrap();

        assert_eq!(
            cache.get_string("greeting").await.unwrap(),
            Some("say \"hi\"".to_string())
        );
        assert_eq!(cache.get::<String>("greeting").await.unwrap(), "say \"hi\"");
    }

    #[tokio::test]
    async fn test_decode_failure_is_serialization_error() {
        let cache = in_process().cache();

        cache.set("word", "not a number", None).await.unwrap();
        assert!(matches!(
            cache.get::<i64>("word").await,
            Err(CacheError::Serialization(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let cache = in_process().cache();

        cache
            .set("ticket", &42, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(cache.exists("ticket").await.unwrap());

        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(!cache.exists("ticket").await.unwrap());
        assert_eq!(cache.get::<i32>("ticket").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_many_partial_failure() {
        let (helper, _fake) = with_fake(FakeBackend::rejecting(&["b"]));
        let cache = helper.using(CacheKind::Redis);

        let failed = cache
            .set_many([("a", rose()), ("b", rose())], None)
            .await
            .unwrap();

        assert_eq!(failed, vec!["b".to_string()]);
        assert_eq!(cache.get::<Person>("a").await.unwrap(), rose());
        assert_eq!(cache.get::<Person>("b").await.unwrap(), Person::default());
    }

    #[tokio::test]
    async fn test_get_many_returns_every_key() {
        let cache = in_process().cache();

        cache.set("one", &1, None).await.unwrap();
        cache.set("three", &3, None).await.unwrap();

        let values: HashMap<String, i32> = cache.get_many(["one", "two", "three"]).await.unwrap();

        assert_eq!(values.len(), 3);
        assert_eq!(values["one"], 1);
        assert_eq!(values["two"], 0);
        assert_eq!(values["three"], 3);

        let strings = cache.get_string_many(["one", "two"]).await.unwrap();
        assert_eq!(strings["one"], Some("1".to_string()));
        assert_eq!(strings["two"], None);
    }

    #[tokio::test]
    async fn test_delete_many_and_update_expiry_many_report_failures() {
        let cache = in_process().cache();

        cache.set("a", &1, None).await.unwrap();
        cache.set("b", &2, None).await.unwrap();

        let failed = cache
            .update_expiry_many(["a", "missing"], Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(failed, vec!["missing".to_string()]);

        let failed = cache.delete_many(["a", "b", "gone"]).await.unwrap();
        assert_eq!(failed, vec!["gone".to_string()]);
        assert!(!cache.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_process_counters_are_unsupported() {
        let cache = in_process().cache();

        assert_eq!(
            cache.increase("hits", 1).await.unwrap_err(),
            CacheError::Unsupported {
                backend: CacheKind::InProcess,
                operation: "increase",
            }
        );
        assert!(cache.list_right_push("queue", &rose()).await.is_err());
    }

    #[tokio::test]
    async fn test_counters_on_remote_backend() {
        let (helper, _fake) = with_fake(FakeBackend::default());
        let cache = helper.using(CacheKind::Redis);

        assert_eq!(cache.increase("hits", 1).await.unwrap(), 1);
        assert_eq!(cache.increase("hits", 4).await.unwrap(), 5);
        assert_eq!(cache.decrease("hits", 2).await.unwrap(), 3);
        assert_eq!(cache.get::<i64>("hits").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_typed_lists() {
        let (helper, _fake) = with_fake(FakeBackend::default());
        let cache = helper.using(CacheKind::Redis);
        let amy = Person {
            id: 2,
            name: "amy".to_string(),
        };

        assert_eq!(cache.list_right_push("people", &rose()).await.unwrap(), 1);
        assert_eq!(cache.list_right_push("people", &amy).await.unwrap(), 2);

        assert_eq!(
            cache.list_range::<Person>("people").await.unwrap(),
            vec![rose(), amy.clone()]
        );
        assert_eq!(cache.list_remove("people", &rose()).await.unwrap(), 1);
        assert_eq!(cache.list_right_pop::<Person>("people").await.unwrap(), amy);

        // Empty list pops the default
        assert_eq!(
            cache.list_right_pop::<Person>("people").await.unwrap(),
            Person::default()
        );
        assert_eq!(cache.list_right_pop_string("people").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sorted_set_scores_travel_beside_values() {
        let (helper, _fake) = with_fake(FakeBackend::default());
        let cache = helper.using(CacheKind::Redis);

        assert!(cache.sorted_set_add("board", &rose(), 9.5).await.unwrap());
        assert!(cache.sorted_set_add("board", "plain", 1.0).await.unwrap());

        let plain: Vec<(String, f64)> = cache
            .sorted_set_range_with_scores("board", 0, 0)
            .await
            .unwrap()
            .into_iter()
            .take(1)
            .collect();
        assert_eq!(plain, vec![("plain".to_string(), 1.0)]);

        assert!(cache.sorted_set_remove("board", "plain").await.unwrap());
        let people: Vec<(Person, f64)> = cache
            .sorted_set_range_with_scores("board", 0, -1)
            .await
            .unwrap();
        assert_eq!(people, vec![(rose(), 9.5)]);
    }

    /// The full Redis scenario against a live server.
    #[tokio::test]
    async fn test_redis_person_scenario() {
        let connection_string =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "localhost:6379".to_string());
        let config = CacheConfig::redis(cachehelper_core::config::RedisConfig::new(
            connection_string,
        ));
        let helper = CacheHelper::new(config).unwrap();
        if helper.initialize(CacheKind::Redis).await.is_err() {
            eprintln!("Skipping test: Redis not available");
            return;
        }
        let cache = helper.cache();
        let key = format!("p1:{}", uuid::Uuid::new_v4());

        assert!(cache
            .set(&key, &rose(), Some(Duration::from_secs(24 * 60 * 60)))
            .await
            .unwrap());
        assert_eq!(cache.get::<Person>(&key).await.unwrap(), rose());
        assert!(cache.delete(&key).await.unwrap());
        assert!(!cache.exists(&key).await.unwrap());
    }
}
