//! Backend configuration.
//!
//! A [`CacheConfig`] is built once at startup, either through serde or from
//! environment variables, and handed to the facade. Only the sections of the
//! backends in use need to be present.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cache::{CacheError, CacheKind, Result};

/// Default capacity of the in-process store.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default Memcached port.
pub const DEFAULT_MEMCACHED_PORT: &str = "11211";

/// Configuration for every backend plus the process default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend used when a call does not name one.
    #[serde(alias = "defaultBackend", alias = "defaultCacheType")]
    pub default_backend: CacheKind,
    /// In-process store settings. Always available.
    #[serde(alias = "inProcess")]
    pub in_process: InProcessConfig,
    /// Redis settings, if Redis is used.
    pub redis: Option<RedisConfig>,
    /// Memcached settings, if Memcached is used.
    pub memcached: Option<MemcachedConfig>,
}

/// In-process store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InProcessConfig {
    /// Maximum number of entries before least-recently-used ones are evicted.
    #[serde(alias = "maxEntries")]
    pub max_entries: usize,
}

impl Default for InProcessConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Redis settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Either a `redis://` URL or a `host:port[,option=value...]` string.
    #[serde(alias = "connectionString")]
    pub connection_string: String,
    /// Database index, overrides any database named in the connection string.
    #[serde(default, alias = "dbNumber", deserialize_with = "null_as_default")]
    pub db_number: u32,
    /// Prefix applied to every key sent to Redis.
    #[serde(default, alias = "systemKey", deserialize_with = "null_as_default")]
    pub system_key: String,
}

/// Memcached wire protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemcachedProtocol {
    #[default]
    Binary,
    #[serde(alias = "ascii")]
    Text,
}

/// Memcached settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemcachedConfig {
    /// Host name or address.
    pub ip: String,
    /// Port, as text.
    pub port: String,
    #[serde(default)]
    pub protocol: MemcachedProtocol,
    /// Whether SASL authentication is enabled.
    #[serde(default, alias = "openAuth")]
    pub open_auth: bool,
    /// Authentication parameters: `userName`, `password` and `zone`.
    #[serde(default, alias = "authPara", deserialize_with = "null_as_default")]
    pub auth_para: HashMap<String, Value>,
}

/// Credentials extracted from [`MemcachedConfig::auth_para`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcachedCredentials {
    pub user_name: String,
    pub password: String,
    pub zone: String,
}

impl CacheConfig {
    /// Configuration with only the in-process store.
    pub fn in_process() -> Self {
        Self::default()
    }

    /// Configuration that defaults to Redis.
    pub fn redis(redis: RedisConfig) -> Self {
        Self {
            default_backend: CacheKind::Redis,
            redis: Some(redis),
            ..Self::default()
        }
    }

    /// Configuration that defaults to Memcached.
    pub fn memcached(memcached: MemcachedConfig) -> Self {
        Self {
            default_backend: CacheKind::Memcached,
            memcached: Some(memcached),
            ..Self::default()
        }
    }

    /// Returns whether a backend kind has the configuration it needs.
    pub fn is_configured(&self, kind: CacheKind) -> bool {
        match kind {
            CacheKind::InProcess => true,
            CacheKind::Memcached => self.memcached.is_some(),
            CacheKind::Redis => self.redis.is_some(),
        }
    }

    /// Checks every present section, and that the default backend is configured.
    pub fn validate(&self) -> Result<()> {
        if !self.is_configured(self.default_backend) {
            return Err(CacheError::Configuration(format!(
                "default backend '{}' has no configuration",
                self.default_backend
            )));
        }
        self.validate_sections()
    }

    /// Checks every present section.
    pub fn validate_sections(&self) -> Result<()> {
        self.in_process.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        if let Some(memcached) = &self.memcached {
            memcached.validate()?;
        }
        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHE_BACKEND` - Default backend (default: "inprocess")
    /// - `CACHE_MAX_ENTRIES` - In-process capacity (default: 10,000)
    /// - `REDIS_CONNECTION_STRING` - Enables Redis
    /// - `REDIS_DB` - Redis database index (default: 0)
    /// - `REDIS_SYSTEM_KEY` - Redis key prefix (default: "")
    /// - `MEMCACHED_IP` - Enables Memcached
    /// - `MEMCACHED_PORT` - Memcached port (default: "11211")
    /// - `MEMCACHED_PROTOCOL` - "binary" or "text" (default: "binary")
    /// - `MEMCACHED_OPEN_AUTH` - "true" to enable authentication
    /// - `MEMCACHED_USERNAME`, `MEMCACHED_PASSWORD`, `MEMCACHED_ZONE` - Credentials
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_backend = match lookup("CACHE_BACKEND") {
            Some(value) => value.parse()?,
            None => CacheKind::default(),
        };

        let in_process = InProcessConfig {
            max_entries: parse_var(&lookup, "CACHE_MAX_ENTRIES")?.unwrap_or(DEFAULT_MAX_ENTRIES),
        };

        let redis = match lookup("REDIS_CONNECTION_STRING") {
            Some(connection_string) => Some(RedisConfig {
                connection_string,
                db_number: parse_var(&lookup, "REDIS_DB")?.unwrap_or(0),
                system_key: lookup("REDIS_SYSTEM_KEY").unwrap_or_default(),
            }),
            None => None,
        };

        let memcached = match lookup("MEMCACHED_IP") {
            Some(ip) => {
                let protocol = match lookup("MEMCACHED_PROTOCOL") {
                    Some(value) => parse_protocol(&value)?,
                    None => MemcachedProtocol::default(),
                };
                let open_auth = parse_var::<bool, _>(&lookup, "MEMCACHED_OPEN_AUTH")?.unwrap_or(false);
                let mut auth_para = HashMap::new();
                for (var, param) in [
                    ("MEMCACHED_USERNAME", "userName"),
                    ("MEMCACHED_PASSWORD", "password"),
                    ("MEMCACHED_ZONE", "zone"),
                ] {
                    if let Some(value) = lookup(var) {
                        auth_para.insert(param.to_string(), Value::String(value));
                    }
                }
                Some(MemcachedConfig {
                    ip,
                    port: lookup("MEMCACHED_PORT")
                        .unwrap_or_else(|| DEFAULT_MEMCACHED_PORT.to_string()),
                    protocol,
                    open_auth,
                    auth_para,
                })
            }
            None => None,
        };

        Ok(Self {
            default_backend,
            in_process,
            redis,
            memcached,
        })
    }
}

impl InProcessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::Configuration(
                "in-process max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl RedisConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    pub fn with_db_number(mut self, db_number: u32) -> Self {
        self.db_number = db_number;
        self
    }

    pub fn with_system_key(mut self, system_key: impl Into<String>) -> Self {
        self.system_key = system_key.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(CacheError::Configuration(
                "redis connection string is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl MemcachedConfig {
    pub fn new(ip: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn with_protocol(mut self, protocol: MemcachedProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Enables authentication with the given credentials.
    pub fn with_auth(mut self, user_name: &str, password: &str, zone: &str) -> Self {
        self.open_auth = true;
        self.auth_para = HashMap::from([
            ("userName".to_string(), Value::from(user_name)),
            ("password".to_string(), Value::from(password)),
            ("zone".to_string(), Value::from(zone)),
        ]);
        self
    }

    /// Parses the configured port.
    pub fn port_number(&self) -> Result<u16> {
        self.port.trim().parse().map_err(|_| {
            CacheError::Configuration(format!("invalid memcached port '{}'", self.port))
        })
    }

    /// Extracts credentials when authentication is enabled.
    pub fn credentials(&self) -> Result<Option<MemcachedCredentials>> {
        if !self.open_auth {
            return Ok(None);
        }
        Ok(Some(MemcachedCredentials {
            user_name: self.auth_param("userName")?,
            password: self.auth_param("password")?,
            zone: self.auth_param("zone")?,
        }))
    }

    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(CacheError::Configuration(
                "memcached ip is empty".to_string(),
            ));
        }
        self.port_number()?;
        if self.credentials()?.is_some() && self.protocol == MemcachedProtocol::Text {
            return Err(CacheError::Configuration(
                "memcached authentication requires the binary protocol".to_string(),
            ));
        }
        Ok(())
    }

    fn auth_param(&self, name: &str) -> Result<String> {
        match self.auth_para.get(name) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(_) => Err(CacheError::Configuration(format!(
                "memcached auth parameter '{name}' must be a string"
            ))),
            None => Err(CacheError::Configuration(format!(
                "memcached auth parameter '{name}' is missing"
            ))),
        }
    }
}

/// Deserialize a value, treating `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let value: Option<T> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CacheError::Configuration(format!("invalid value for {name}: '{value}'"))),
        None => Ok(None),
    }
}

fn parse_protocol(value: &str) -> Result<MemcachedProtocol> {
    match value.trim().to_ascii_lowercase().as_str() {
        "binary" => Ok(MemcachedProtocol::Binary),
        "text" | "ascii" => Ok(MemcachedProtocol::Text),
        other => Err(CacheError::Configuration(format!(
            "unknown memcached protocol '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = CacheConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.default_backend, CacheKind::InProcess);
        assert_eq!(config.in_process.max_entries, 10_000);
        assert!(config.redis.is_none());
        assert!(config.memcached.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_from_lookup() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("CACHE_BACKEND", "redis"),
            ("REDIS_CONNECTION_STRING", "localhost:6379"),
            ("REDIS_DB", "14"),
            ("REDIS_SYSTEM_KEY", "app1:"),
        ]))
        .unwrap();

        assert_eq!(config.default_backend, CacheKind::Redis);
        assert_eq!(
            config.redis,
            Some(
                RedisConfig::new("localhost:6379")
                    .with_db_number(14)
                    .with_system_key("app1:")
            )
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memcached_from_lookup() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("MEMCACHED_IP", "127.0.0.1"),
            ("MEMCACHED_OPEN_AUTH", "true"),
            ("MEMCACHED_USERNAME", "admin"),
            ("MEMCACHED_PASSWORD", "secret"),
            ("MEMCACHED_ZONE", "zone-a"),
        ]))
        .unwrap();

        let memcached = config.memcached.unwrap();
        assert_eq!(memcached.port, "11211");
        assert_eq!(memcached.protocol, MemcachedProtocol::Binary);
        assert_eq!(
            memcached.credentials().unwrap(),
            Some(MemcachedCredentials {
                user_name: "admin".to_string(),
                password: "secret".to_string(),
                zone: "zone-a".to_string(),
            })
        );
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = CacheConfig::from_lookup(lookup_from(&[
            ("REDIS_CONNECTION_STRING", "localhost:6379"),
            ("REDIS_DB", "fourteen"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));

        let err = CacheConfig::from_lookup(lookup_from(&[("CACHE_BACKEND", "disk")])).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_default_backend_must_be_configured() {
        let config = CacheConfig {
            default_backend: CacheKind::Memcached,
            ..CacheConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = CacheConfig {
            in_process: InProcessConfig { max_entries: 0 },
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memcached_port_must_parse() {
        let config = MemcachedConfig::new("127.0.0.1", "eleven");
        assert!(matches!(
            config.validate(),
            Err(CacheError::Configuration(_))
        ));
        assert_eq!(
            MemcachedConfig::new("127.0.0.1", " 11211 ")
                .port_number()
                .unwrap(),
            11211
        );
    }

    #[test]
    fn test_memcached_auth_requires_all_parameters() {
        let mut config = MemcachedConfig::new("127.0.0.1", "11211").with_auth("u", "p", "z");
        assert!(config.validate().is_ok());

        config.auth_para.remove("zone");
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            CacheError::Configuration("memcached auth parameter 'zone' is missing".to_string())
        );
    }

    #[test]
    fn test_memcached_auth_parameter_must_be_string() {
        let mut config = MemcachedConfig::new("127.0.0.1", "11211").with_auth("u", "p", "z");
        config
            .auth_para
            .insert("password".to_string(), Value::from(1234));
        assert!(config.credentials().is_err());
    }

    #[test]
    fn test_memcached_auth_requires_binary_protocol() {
        let config = MemcachedConfig::new("127.0.0.1", "11211")
            .with_protocol(MemcachedProtocol::Text)
            .with_auth("u", "p", "z");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_parameters_ignored_when_auth_disabled() {
        let config = MemcachedConfig::new("127.0.0.1", "11211");
        assert_eq!(config.credentials().unwrap(), None);
    }

    #[test]
    fn test_deserialize_camel_case_input() {
        let json = r#"{
            "defaultBackend": "redis",
            "redis": {
                "connectionString": "localhost:6379",
                "dbNumber": 14,
                "systemKey": null
            },
            "memcached": {
                "ip": "127.0.0.1",
                "port": "11211",
                "protocol": "ascii",
                "openAuth": false,
                "authPara": null
            }
        }"#;

        let config: CacheConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.default_backend, CacheKind::Redis);
        let redis = config.redis.unwrap();
        assert_eq!(redis.db_number, 14);
        assert_eq!(redis.system_key, "");
        let memcached = config.memcached.unwrap();
        assert_eq!(memcached.protocol, MemcachedProtocol::Text);
        assert!(memcached.auth_para.is_empty());
        assert_eq!(config.in_process.max_entries, DEFAULT_MAX_ENTRIES);
    }
}
