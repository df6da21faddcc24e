//! Connection-string handling and the shared connection registry.

use std::collections::HashMap;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use url::Url;

use cachehelper_core::cache::{CacheError, Result};

use super::error::map_redis_error;

const DEFAULT_PORT: u16 = 6379;

/// Turns a configured connection string into a `redis://` URL.
///
/// Accepts either a URL (`redis://` or `rediss://`) or the
/// `host:port[,option=value...]` form. Recognized options are `password`,
/// `user` and `ssl`; anything else is ignored. `db_number` always replaces
/// whatever database the string names.
///
/// # Example
///
/// ```
/// use cachehelper::cache::redis_impl::normalize_connection_string;
///
/// let url = normalize_connection_string("localhost:6379,password=secret", 2).unwrap();
/// assert_eq!(url, "redis://:secret@localhost:6379/2");
/// ```
pub fn normalize_connection_string(raw: &str, db_number: u32) -> Result<String> {
    let raw = raw.trim();
    let mut url = if raw.starts_with("redis://") || raw.starts_with("rediss://") {
        parse_url(raw)?
    } else {
        from_options(raw)?
    };
    url.set_path(&format!("/{db_number}"));
    Ok(url.to_string())
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw)
        .map_err(|e| CacheError::Configuration(format!("invalid redis url '{raw}': {e}")))
}

fn from_options(raw: &str) -> Result<Url> {
    let mut parts = raw.split(',').map(str::trim).filter(|p| !p.is_empty());
    let endpoint = parts.next().ok_or_else(|| {
        CacheError::Configuration("redis connection string is empty".to_string())
    })?;

    let mut user = None;
    let mut password = None;
    let mut ssl = false;

    for part in parts {
        let Some((name, value)) = part.split_once('=') else {
            tracing::debug!(endpoint = part, "Ignoring additional redis endpoint");
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "password" => password = Some(value.trim().to_string()),
            "user" => user = Some(value.trim().to_string()),
            "ssl" => ssl = value.trim().eq_ignore_ascii_case("true"),
            other => tracing::debug!(option = other, "Ignoring redis connection option"),
        }
    }

    let endpoint = if endpoint.contains(':') {
        endpoint.to_string()
    } else {
        format!("{endpoint}:{DEFAULT_PORT}")
    };
    let scheme = if ssl { "rediss" } else { "redis" };
    let mut url = parse_url(&format!("{scheme}://{endpoint}"))?;

    let invalid = || CacheError::Configuration(format!("redis credentials rejected for '{endpoint}'"));
    if let Some(user) = user {
        url.set_username(&user).map_err(|_| invalid())?;
    }
    if let Some(password) = password {
        url.set_password(Some(&password)).map_err(|_| invalid())?;
    }
    Ok(url)
}

/// Strips the password from a URL for logging.
fn redacted(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            // Only fails for URLs that cannot carry credentials.
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<invalid>".to_string(),
    }
}

/// Process-wide registry of multiplexed Redis connections.
///
/// One connection per distinct URL, created on first use and never torn
/// down. Clones share the same registry.
#[derive(Clone, Default)]
pub struct RedisConnections {
    connections: Arc<Mutex<HashMap<String, ConnectionManager>>>,
}

impl RedisConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection for `url`, opening it if needed.
    ///
    /// The registry lock is held while connecting, so concurrent first uses
    /// of the same URL open a single connection.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` for a malformed URL and
    /// `CacheError::ConnectionFailed` if the server cannot be reached.
    pub async fn get_or_connect(&self, url: &str) -> Result<ConnectionManager> {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.get(url) {
            return Ok(conn.clone());
        }

        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        tracing::info!(url = %redacted(url), "Opened redis connection");

        connections.insert(url.to_string(), conn.clone());
        Ok(conn)
    }

    /// Number of distinct connections opened so far.
    pub async fn count(&self) -> usize {
        self.connections.lock().await.len()
    }
}
